//! Exit codes for the CLI

use monopub_core::error::{GitError, MonopubError};

/// Success
pub const SUCCESS: u8 = 0;

/// General error
pub const ERROR: u8 = 1;

/// Configuration error
pub const CONFIG_ERROR: u8 = 2;

/// Git error
pub const GIT_ERROR: u8 = 3;

/// One or more packages failed to publish
pub const PUBLISH_FAILED: u8 = 6;

/// Exit code for an error that ended the command
pub fn for_error(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<GitError>().is_some() {
        return GIT_ERROR;
    }
    match err.downcast_ref::<MonopubError>() {
        Some(MonopubError::Config(_)) => CONFIG_ERROR,
        Some(MonopubError::Git(_)) => GIT_ERROR,
        _ => ERROR,
    }
}
