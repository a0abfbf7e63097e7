// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing subscriber setup for the `colony` binary.

use crate::error::RuntimeError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Install the global subscriber. Filter comes from `RUST_LOG` (default
/// `info`). With `log_file` set, output goes to that file through a
/// non-blocking writer whose guard must live as long as the process;
/// otherwise it goes to stderr.
pub fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, RuntimeError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| RuntimeError::Logging(e.to_string()))?;
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| RuntimeError::Logging(format!("{}: {e}", dir.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| RuntimeError::Logging(format!("not a file path: {}", path.display())))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| RuntimeError::Logging(e.to_string()))?;

    Ok(Some(guard))
}
