//! Shared primitive type aliases.

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Frame indices are 0-based and always relative to the source video.
pub type FrameIndex = i32;
