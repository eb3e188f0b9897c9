//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output, with a hint where one helps.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::PlatformAuthFailed(_) => format!(
            "{}\nSet platform.access_token or TRIGGERATOR_ACCESS_TOKEN, or use --offline <dir>",
            e
        ),
        ApiError::PlatformTimeout { .. } => format!(
            "{}\nIncrease platform.max_wait_ms or retry later",
            e
        ),
        _ => e.to_string(),
    }
}
