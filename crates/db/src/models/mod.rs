//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Query/update DTOs where the API layer needs them

pub mod asset;
pub mod clip;
pub mod render_job;
pub mod status;
