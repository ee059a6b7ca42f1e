//! Utility functions for the model lifecycle service

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Formats a duration into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs == 0 {
        let millis = duration.subsec_millis();
        if millis == 0 {
            return format!("{}us", duration.subsec_micros());
        }
        return format!("{}ms", millis);
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut result = String::new();
    if hours > 0 {
        result.push_str(&format!("{}h ", hours));
    }
    if minutes > 0 || !result.is_empty() {
        result.push_str(&format!("{}m ", minutes));
    }
    result.push_str(&format!("{}s", seconds));
    result
}

/// Executes a future with a timeout
///
/// Elapsed deadlines surface as [`Error::Timeout`] naming the operation.
pub async fn execute_with_timeout<T, F>(
    future: F,
    duration: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "Operation '{}' timed out after {}",
            operation_name,
            format_duration(duration)
        ))),
    }
}

/// Generates a fresh model identifier
pub fn generate_model_id() -> String {
    format!("model-{}", Uuid::new_v4().simple())
}

/// Checks that a caller-supplied identifier is usable as a registry key and
/// as a file stem
pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", kind)));
    }
    if id.len() > 128 {
        return Err(Error::InvalidArgument(format!("{} is longer than 128 characters", kind)));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) || id.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "{} '{}' may only contain letters, digits, '-', '_' and '.'",
            kind, id
        )));
    }
    Ok(())
}

/// Returns the number of CPU cores available
pub fn get_num_cpus() -> usize {
    num_cpus::get()
}
