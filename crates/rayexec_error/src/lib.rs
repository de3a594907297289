//! Shared error type used across the workspace.
//!
//! Kept intentionally small: a single error struct with an optional source
//! and a couple of `?`-friendly extension traits, rather than a hierarchy of
//! error enums. Downstream crates attach context with [`ResultExt::context`]
//! as errors bubble up instead of matching on variants.

use std::fmt;

mod ext;

pub use ext::{OptionExt, ResultExt};

/// Result alias used throughout the workspace.
pub type Result<T, E = RayexecError> = std::result::Result<T, E>;

/// The workspace's error type.
///
/// Fatal invariant violations (programmer errors, contract misuse) are never
/// represented by this type, those `panic!`. `RayexecError` is reserved for
/// conditions a caller can reasonably observe and react to, such as resource
/// exhaustion or a malformed request.
pub struct RayexecError {
    msg: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RayexecError {
    pub fn new(msg: impl Into<String>) -> Self {
        RayexecError {
            msg: msg.into(),
            source: None,
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RayexecError {
            msg: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for RayexecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RayexecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RayexecError({})", self.msg)?;
        if let Some(source) = &self.source {
            write!(f, "\ncaused by: {source:?}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RayexecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Construct a [`RayexecError`] with a formatted message, analogous to
/// `anyhow!`.
#[macro_export]
macro_rules! rayexec_error {
    ($($arg:tt)*) => {
        $crate::RayexecError::new(format!($($arg)*))
    };
}

/// Shorthand for `return Err(rayexec_error!(...))`.
#[macro_export]
macro_rules! rayexec_bail {
    ($($arg:tt)*) => {
        return Err($crate::rayexec_error!($($arg)*))
    };
}
