// Installation error taxonomy
//
// Validation errors (bad connection string, filesystem permissions) abort before
// any persistent state is touched. Provisioning errors unwind to the top-level
// handler which performs cleanup and converts the cause chain into a single
// user-facing message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    /// An installation attempt is already in flight for this deployment.
    #[error("Installation is already running.")]
    AlreadyRunning,

    /// The raw connection string could not be parsed.
    #[error("Connection string has the wrong format.")]
    ConnectionStringFormat,

    /// Structured connection fields are incomplete.
    #[error("Missing required connection details: {0}.")]
    ConnectionFieldsIncomplete(String),

    /// Request-level validation failure (admin credentials, collation, callback URL).
    #[error("{0}")]
    InvalidRequest(String),
}

/// Compose the single user-facing error string for a failed provisioning run:
/// the outer message plus the innermost cause, so the poller sees both what
/// failed and why, without the intermediate wrapping layers.
pub fn compose_error_message(err: &anyhow::Error) -> String {
    let outer = err.to_string();
    match err.chain().last() {
        Some(root) => {
            let root = root.to_string();
            if root == outer {
                outer
            } else {
                format!("{} {}", outer, root)
            }
        }
        None => outer,
    }
}
