// SPDX-License-Identifier: AGPL-3.0

//! Logging and diagnostic utilities.
//!
//! Recoverable conditions met while analysing traces are reported here as warnings
//! tagged with an [`ErrorCode`]; they never propagate as errors.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing_subscriber::EnvFilter;

/// Warnings base URL
pub const WARNINGS_BASE_URL: &str = "https://github.com/evmcov/evmcov/wiki/warnings";

/// Error codes for warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnresolvedContract,
    UnsupportedCreate,
    SelfDestruct,
    TruncatedTrace,
    UnmappedRevert,
    MissingSource,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::UnresolvedContract => "unresolved-contract",
            ErrorCode::UnsupportedCreate => "unsupported-create",
            ErrorCode::SelfDestruct => "selfdestruct",
            ErrorCode::TruncatedTrace => "truncated-trace",
            ErrorCode::UnmappedRevert => "unmapped-revert",
            ErrorCode::MissingSource => "missing-source",
        }
    }

    pub fn url(&self) -> String {
        format!("{}#{}", WARNINGS_BASE_URL, self.code())
    }
}

/// Messages already emitted without `allow_duplicate`
static UNIQUE_MESSAGES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// True once `message` has been emitted without `allow_duplicate`
pub fn is_logged(message: &str) -> bool {
    UNIQUE_MESSAGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(message)
}

/// Returns true the first time a message is seen
fn mark_logged(message: &str) -> bool {
    UNIQUE_MESSAGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(message.to_string())
}

/// Log a debug message
pub fn debug(text: &str) {
    tracing::debug!("{}", text);
}

/// Log an info message
pub fn info(text: &str) {
    tracing::info!("{}", text);
}

/// Log a warning message
pub fn warn(text: &str, allow_duplicate: bool) {
    if allow_duplicate || mark_logged(text) {
        tracing::warn!("{}", text);
    }
}

/// Log a warning at most once
pub fn warn_unique(text: &str) {
    warn(text, false);
}

/// Log a warning with an error code
pub fn warn_code(error_code: ErrorCode, msg: &str, allow_duplicate: bool) {
    if allow_duplicate || mark_logged(msg) {
        tracing::warn!(code = error_code.code(), "{}\n(see {})", msg, error_code.url());
    }
}

/// Clear all logged messages
pub fn clear_logged_messages() {
    UNIQUE_MESSAGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Install a stderr subscriber. `RUST_LOG` wins over the verbosity count.
///
/// Does nothing when a global subscriber is already installed (e.g. by the embedding
/// application or another test).
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
