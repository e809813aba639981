use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    /// Id or version issuance ran out of sequence budget. Not retryable.
    #[error("capacity exhausted: {message}")]
    Capacity { message: String },
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("pre-store hook '{hook}' aborted the write: {message}")]
    HookAborted { hook: String, message: String },
    #[error("commit id {cursor} exceeds current max {max_commit_id}")]
    CursorOutOfRange { cursor: i64, max_commit_id: i64 },
}

impl FolioError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn hook_aborted(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookAborted {
            hook: hook.into(),
            message: message.into(),
        }
    }

    pub fn cursor_out_of_range(cursor: i64, max_commit_id: i64) -> Self {
        Self::CursorOutOfRange {
            cursor,
            max_commit_id,
        }
    }

    /// Client-side failures (4xx at a transport boundary) as opposed to
    /// storage or capacity failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Conflict { .. }
                | Self::HookAborted { .. }
                | Self::CursorOutOfRange { .. }
        )
    }
}

pub type FolioResult<T> = Result<T, FolioError>;

impl From<sea_orm::DbErr> for FolioError {
    fn from(value: sea_orm::DbErr) -> Self {
        FolioError::storage(value.to_string())
    }
}

impl From<serde_json::Error> for FolioError {
    fn from(value: serde_json::Error) -> Self {
        FolioError::invalid(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::FolioError;

    #[test]
    fn helper_constructors_set_variants() {
        let err = FolioError::storage("disk");
        assert!(matches!(err, FolioError::Storage { .. }));
        let err = FolioError::invalid("bad");
        assert!(matches!(err, FolioError::Validation { .. }));
        let err = FolioError::conflict("stale");
        assert!(matches!(err, FolioError::Conflict { .. }));
        let err = FolioError::capacity("sequence");
        assert!(matches!(err, FolioError::Capacity { .. }));
        let err = FolioError::configuration("base time");
        assert!(matches!(err, FolioError::Configuration { .. }));
        let err = FolioError::hook_aborted("wordcount", "no body");
        assert!(matches!(err, FolioError::HookAborted { .. }));
        let err = FolioError::cursor_out_of_range(11, 10);
        assert!(matches!(
            err,
            FolioError::CursorOutOfRange {
                cursor: 11,
                max_commit_id: 10
            }
        ));
    }

    #[test]
    fn client_errors_are_distinguished_from_failures() {
        assert!(FolioError::cursor_out_of_range(2, 1).is_client_error());
        assert!(FolioError::hook_aborted("h", "veto").is_client_error());
        assert!(!FolioError::storage("io").is_client_error());
        assert!(!FolioError::capacity("exhausted").is_client_error());
    }
}
