//! Background tasks owned by the API process.

pub mod autosave;

pub use autosave::AutosaveQueue;
