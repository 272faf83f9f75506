use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Medication not found: {0}")]
    NotFound(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// 복약 등록 입력 검증 실패
///
/// 메시지는 그대로 사용자에게 표시됩니다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all required fields")]
    MissingRequiredField,

    #[error("Please set at least one time for reminders")]
    MissingTimes,

    #[error("As-needed medications cannot have reminder times")]
    TimesForAsNeeded,

    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_passes_through() {
        let err: AppError = ValidationError::MissingTimes.into();
        assert_eq!(err.to_string(), "Please set at least one time for reminders");
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = AppError::NotFound("med_1".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Medication not found: med_1\"");
    }
}
