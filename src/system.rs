//! System checks

use thiserror::Error;

/// A state-changing command was run without root privileges
#[derive(Error, Debug)]
#[error("Root privileges required to {action}. Please run with sudo or as root.")]
pub struct PrivilegeError {
    pub action: &'static str,
}

/// Check if running as root
pub fn is_root() -> bool {
    users::get_effective_uid() == 0
}

/// Fail unless running as root
pub fn require_root(action: &'static str) -> Result<(), PrivilegeError> {
    if is_root() {
        Ok(())
    } else {
        tracing::debug!(uid = users::get_effective_uid(), action, "Refusing unprivileged change");
        Err(PrivilegeError { action })
    }
}
