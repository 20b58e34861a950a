use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use panel_core::PanelError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(PanelError::InvalidInput(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        let Some(e) = self.0.downcast_ref::<PanelError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            PanelError::ServerNotFound(_) | PanelError::EmptyInventory => StatusCode::NOT_FOUND,
            PanelError::InvalidService(_) | PanelError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PanelError::SectionNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PanelError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PanelError::AnsibleNotFound => StatusCode::SERVICE_UNAVAILABLE,
            PanelError::Transport(_) => StatusCode::BAD_GATEWAY,
            PanelError::Io(_) | PanelError::Yaml(_) | PanelError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {:#}", self.0);
        }
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

    fn status_of(err: PanelError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn server_not_found_maps_to_404() {
        assert_eq!(status_of(PanelError::ServerNotFound("10.0.0.9".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(PanelError::EmptyInventory), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_input_maps_to_400() {
        assert_eq!(status_of(PanelError::InvalidService("a b".into())), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::bad_request("host is required").into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_section_maps_to_422() {
        assert_eq!(
            status_of(PanelError::SectionNotFound("[runner-hosts]".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn remote_failures_map_to_gateway_codes() {
        let timeout = PanelError::Timeout {
            command: "systemctl start x".into(),
            timeout: std::time::Duration::from_secs(10),
        };
        assert_eq!(status_of(timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_of(PanelError::Transport("unreachable".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(PanelError::AnsibleNotFound), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn other_errors_map_to_500() {
        let io_err = std::io::Error::other("disk full");
        assert_eq!(status_of(PanelError::Io(io_err)), StatusCode::INTERNAL_SERVER_ERROR);
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError(PanelError::ServerNotFound("10.0.0.9".into()).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
