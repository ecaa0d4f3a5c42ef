//! HTTP handlers, one module per resource.

pub mod assets;
pub mod clips;
pub mod jobs;
pub mod render;
