use tallybook_core::CoreError;
use tallybook_engine::EngineError;
use thiserror::Error;

/// A failed request, carrying the protocol status code it renders as.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(422, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match err {
            // a shapeless filter is a malformed request, not a data problem
            CoreError::EmptyRuleSet => 400,
            _ => 422,
        };
        Self::new(code, err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(core) => core.into(),
            other => {
                let code = match &other {
                    EngineError::Storage(_) => 500,
                    EngineError::NotFound { .. }
                    | EngineError::EventNotFound(_)
                    | EngineError::UserNotFound(_) => 404,
                    EngineError::InvalidCredentials | EngineError::NotLoggedIn => 401,
                    EngineError::PermissionDenied { .. }
                    | EngineError::CurrentUserProtected(_) => 403,
                    _ => 422,
                };
                Self::new(code, other.to_string())
            }
        }
    }
}
