use std::fmt;

/// Error kinds the monitor distinguishes.
///
/// Only `PermissionDenied` is fatal: it prevents the loop from ever starting.
/// `CatalogFetchFailed` is recovered with the built-in class list and
/// `CycleFailed` aborts a single cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// Camera access was refused.
    PermissionDenied(String),
    /// `/classes` could not be fetched or parsed.
    CatalogFetchFailed(String),
    /// Transport, parse or service-reported failure during one cycle.
    CycleFailed(String),
}

impl MonitorError {
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::PermissionDenied(_) => "permission_denied",
            MonitorError::CatalogFetchFailed(_) => "catalog_fetch_failed",
            MonitorError::CycleFailed(_) => "cycle_failed",
        }
    }

    /// Returns true when `err` (or any error in its chain) is a permission denial.
    pub fn is_permission_denied(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<MonitorError>(),
                Some(MonitorError::PermissionDenied(_))
            )
        })
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            MonitorError::PermissionDenied(m)
            | MonitorError::CatalogFetchFailed(m)
            | MonitorError::CycleFailed(m) => m,
        };
        write!(f, "{}: {}", self.code(), message)
    }
}

impl std::error::Error for MonitorError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn permission_denied_is_found_through_context() {
        let err: anyhow::Result<()> =
            Err(MonitorError::PermissionDenied("camera refused".into()).into());
        let err = err.context("open camera").unwrap_err();
        assert!(MonitorError::is_permission_denied(&err));

        let other = anyhow::Error::new(MonitorError::CycleFailed("timeout".into()));
        assert!(!MonitorError::is_permission_denied(&other));
    }
}
