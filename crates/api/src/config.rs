//! Server configuration loaded from environment variables.

use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Root directory of the content-addressed store and render spool.
    pub storage_root: PathBuf,
    /// Maximum concurrent encoder subprocesses (default: `2`).
    pub encoder_slots: usize,
    /// Fixed frame rate every multi-clip render is normalized to.
    pub render_target_fps: f64,
    /// Quiet period before a clip's pending transform save is flushed.
    pub autosave_debounce_ms: u64,
    /// Advisory stall window surfaced to clients: a caller observing no
    /// progress for this long may treat a job as suspected-stalled. The
    /// server itself never times a render out.
    pub stall_window_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `STORAGE_ROOT`         | `./data`                   |
    /// | `ENCODER_SLOTS`        | `2`                        |
    /// | `RENDER_TARGET_FPS`    | `30`                       |
    /// | `AUTOSAVE_DEBOUNCE_MS` | `750`                      |
    /// | `STALL_WINDOW_SECS`    | `120`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let storage_root = PathBuf::from(
            std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./data".into()),
        );

        let encoder_slots: usize = std::env::var("ENCODER_SLOTS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("ENCODER_SLOTS must be a valid usize");

        let render_target_fps: f64 = std::env::var("RENDER_TARGET_FPS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RENDER_TARGET_FPS must be a valid f64");

        let autosave_debounce_ms: u64 = std::env::var("AUTOSAVE_DEBOUNCE_MS")
            .unwrap_or_else(|_| "750".into())
            .parse()
            .expect("AUTOSAVE_DEBOUNCE_MS must be a valid u64");

        let stall_window_secs: u64 = std::env::var("STALL_WINDOW_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("STALL_WINDOW_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            storage_root,
            encoder_slots,
            render_target_fps,
            autosave_debounce_ms,
            stall_window_secs,
        }
    }
}
