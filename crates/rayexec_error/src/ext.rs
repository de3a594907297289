use crate::{RayexecError, Result};

/// Adds `.context(...)` to any `Result<T, E>` where `E` is a standard error,
/// converting it into `Result<T, RayexecError>`.
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| RayexecError::with_source(msg.into(), e))
    }
}

/// Adds `.required(field_name)` to `Option<T>`, turning `None` into a
/// descriptive `RayexecError`. Most useful when decoding a sparsely-populated
/// struct (e.g. a protobuf message) where a field is expected to be present.
pub trait OptionExt<T> {
    fn required(self, field: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, field: &'static str) -> Result<T> {
        self.ok_or_else(|| RayexecError::new(format!("missing required field: {field}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_some() {
        let v: Option<i32> = Some(4);
        assert_eq!(v.required("x").unwrap(), 4);
    }

    #[test]
    fn required_none() {
        let v: Option<i32> = None;
        let err = v.required("x").unwrap_err();
        assert_eq!(err.msg(), "missing required field: x");
    }
}
