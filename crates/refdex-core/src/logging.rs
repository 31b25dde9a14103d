//! Tracing subscriber setup.
//!
//! Verbosity maps to a level for refdex crates: 0 warn, 1 info, 2 debug,
//! 3 and above trace (dependencies included). `RUST_LOG` wins when set.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

const CRATES: [&str; 5] = ["refdex_core", "refdex_text", "refdex_embed", "refdex_vector", "refdex_service"];

/// Filter directives for a verbosity count.
pub fn filter_for(verbosity: u8) -> String {
    match verbosity {
        0 => "warn".to_string(),
        1 | 2 => {
            let level = if verbosity == 1 { "info" } else { "debug" };
            let mut directives = vec!["warn".to_string()];
            directives.extend(CRATES.iter().map(|c| format!("{c}={level}")));
            directives.join(",")
        }
        _ => "trace".to_string(),
    }
}

/// Installs the global subscriber. Output goes to stderr unless a log file
/// is given directly or through `REFDEX_LOG_FILE`.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity)));
    let target: Option<PathBuf> = log_file
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("REFDEX_LOG_FILE").map(PathBuf::from));

    let installed = match target {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.map_err(|e| Error::Operation(format!("failed to install log subscriber: {e}")))
}
