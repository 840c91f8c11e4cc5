use serde::{Deserialize, Serialize};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure reported by one of the external build/store calls.
///
/// None of these are fatal: the editor turns them into a dismissible notice
/// and leaves its session state as it was before the request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<image::ImageError> for ServiceError {
    fn from(err: image::ImageError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(ServiceError::transport("x").to_string().starts_with("transport error:"));
        assert!(ServiceError::validation("x").to_string().starts_with("validation error:"));
        assert!(ServiceError::not_found("x").to_string().starts_with("not found:"));
    }

    #[test]
    fn serializes_as_tagged_object() {
        let json = serde_json::to_string(&ServiceError::transport("timeout")).unwrap();
        assert_eq!(json, r#"{"kind":"transport","message":"timeout"}"#);
        let back: ServiceError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServiceError::transport("timeout"));
    }
}
