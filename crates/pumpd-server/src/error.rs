use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pumpd_core::{CoreError, ErrorKind};

/// Unified error type for HTTP responses.
///
/// Core rejections already carry a human-readable reason, so the body is
/// always `{"error": "..."}` and only the status code needs mapping.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<CoreError>() {
            Some(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::PolicyDenied => StatusCode::CONFLICT,
                ErrorKind::DeviceUnavailable => StatusCode::BAD_GATEWAY,
                ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = AppError(CoreError::NonPositiveDuration.into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn policy_denied_maps_to_409() {
        let err = AppError(CoreError::Latched { reason: None }.into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn device_unavailable_maps_to_502() {
        let err = AppError(CoreError::DeviceTimeout.into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn persistence_maps_to_500() {
        let err = AppError(CoreError::Io(std::io::Error::other("disk full")).into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_errors_map_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_carries_the_reason() {
        let err = AppError(CoreError::WrongSecret.into());
        let response = err.into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
