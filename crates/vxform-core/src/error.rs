//! Error types for VxForm.

use thiserror::Error;

/// Main error type for transform pipeline operations.
///
/// Every failure is reported synchronously; a failed frame aborts only that
/// frame's processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VxError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Graph build failure: {0}")]
    GraphBuild(String),

    #[error("Graph runtime failure: {0}")]
    GraphRuntime(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl VxError {
    /// Short category name, stable across messages.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::AllocationFailure(_) => "AllocationFailure",
            Self::GraphBuild(_) => "GraphBuildFailure",
            Self::GraphRuntime(_) => "GraphRuntimeFailure",
            Self::InvalidParameter(_) => "InvalidParameter",
        }
    }
}

/// Result type alias for VxForm operations.
pub type Result<T> = std::result::Result<T, VxError>;

/// Retrievable last-error slot.
///
/// Holds the message of the most recent failure. A later success does not
/// clear it; hosts poll it after a call reported failure.
#[derive(Debug, Default, Clone)]
pub struct LastError {
    message: Option<String>,
}

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the error (if any) carried by `result` and hand it back unchanged.
    pub fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    pub fn record(&mut self, error: &VxError) {
        self.message = Some(error.to_string());
    }

    /// The last error message, or an empty string if nothing failed yet.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    pub fn is_set(&self) -> bool {
        self.message.is_some()
    }

    pub fn clear(&mut self) {
        self.message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_category_text() {
        let e = VxError::UnsupportedFormat("Rgba/U32".into());
        assert_eq!(e.to_string(), "Unsupported format: Rgba/U32");
        assert_eq!(e.category(), "UnsupportedFormat");
    }

    #[test]
    fn last_error_survives_success() {
        let mut last = LastError::new();
        assert_eq!(last.message(), "");

        let failed: Result<()> = Err(VxError::InvalidParameter("zero width".into()));
        assert!(last.track(failed).is_err());
        assert_eq!(last.message(), "Invalid parameter: zero width");

        let ok: Result<u32> = Ok(7);
        assert_eq!(last.track(ok).unwrap(), 7);
        assert!(last.is_set());
        assert_eq!(last.message(), "Invalid parameter: zero width");
    }
}
