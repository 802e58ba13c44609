use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("user id `{value}` is not a lowercase hex identifier")]
    InvalidUserId { value: String },
}

impl DomainError {
    pub fn invalid_user_id(value: impl Into<String>) -> Self {
        Self::InvalidUserId {
            value: value.into(),
        }
    }
}
