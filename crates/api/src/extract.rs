//! Request extractors

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldErrors};

/// Request bodies that check their own field constraints after deserializing
pub trait Validate {
    fn validate(&self) -> Result<(), FieldErrors>;
}

/// JSON body that has been deserialized and validated
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            tracing::debug!(error = %rejection.body_text(), "Rejected request body");
            ApiError::InvalidBody(rejection_errors(&rejection))
        })?;

        value.validate()?;
        Ok(Self(value))
    }
}

/// Field errors for a body that failed to parse.
///
/// Type errors carry the serde path (`prompt: invalid type: ...`), which is
/// recorded under that field. The full rejection text is always a form error.
fn rejection_errors(rejection: &JsonRejection) -> FieldErrors {
    let text = rejection.body_text();
    let mut errors = FieldErrors::new();

    if let JsonRejection::JsonDataError(_) = rejection {
        if let Some((field, message)) = field_error(&text) {
            errors.add(field, message);
        }
    }
    errors.add_form(text);
    errors
}

/// Split `"<prefix>: <path>: <message>"` into path and message
fn field_error(text: &str) -> Option<(&str, &str)> {
    let (_, detail) = text.split_once(": ")?;
    let (path, message) = detail.split_once(": ")?;
    let is_path = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    is_path.then_some((path, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_from_serde_path() {
        assert_eq!(
            field_error(
                "Failed to deserialize the JSON body into the target type: prompt: invalid type: integer `5`, expected a string at line 1 column 12"
            ),
            Some((
                "prompt",
                "invalid type: integer `5`, expected a string at line 1 column 12"
            ))
        );
        assert_eq!(
            field_error("Failed to deserialize the JSON body into the target type: message.content: invalid type: null"),
            Some(("message.content", "invalid type: null"))
        );
    }

    #[test]
    fn test_field_error_without_path() {
        assert_eq!(
            field_error("Failed to deserialize the JSON body into the target type: invalid type: integer `5`, expected struct ChatRequest"),
            None
        );
        assert_eq!(field_error("Failed to parse the request body as JSON"), None);
    }
}
