use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{dto::validation::validate_user_id, error::AppError};

/// Header carrying the caller's opaque user identifier.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the `X-User-Id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Err(AppError::Unauthorized(format!(
                "missing `{USER_ID_HEADER}` header"
            )));
        };
        let id = value
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("`{USER_ID_HEADER}` is not valid text")))?;
        validate_user_id(id).map_err(|err| AppError::BadRequest(err.to_string()))?;
        Ok(UserId(id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<UserId, AppError> {
        let (mut parts, _) = request.into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn header_is_required() {
        let err = extract(Request::new(())).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn header_is_validated() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "has space")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::BadRequest(_))));

        let request = Request::builder()
            .header(USER_ID_HEADER, "alice")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), UserId("alice".into()));
    }
}
