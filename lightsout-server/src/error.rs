use crate::views::Page;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use lightsout::CatalogError;
use thiserror::Error;

/// Request-level failure. Missing documents render the error page as a 404;
/// everything else is a 500.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("blocking task failed: {0}")]
    Blocking(String),
}

impl ServerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServerError::Catalog(e) if e.is_not_found())
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if self.is_not_found() {
            self.to_string()
        } else {
            log::error!("Internal error: {self}");
            "Internal server error".to_string()
        };
        Page::new("error", "Error")
            .with("message", message)
            .with("status", status.as_u16())
            .render_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightsout::EntityKind;

    #[test]
    fn test_catalog_errors_convert_and_map_status() {
        let missing: ServerError = CatalogError::not_found(EntityKind::Genre, "g1").into();
        assert!(missing.is_not_found());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let blocking = ServerError::Blocking("pool closed".into());
        assert_eq!(blocking.to_string(), "blocking task failed: pool closed");
        assert_eq!(blocking.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let dyn_err: &dyn std::error::Error = &blocking;
        assert!(dyn_err.source().is_none());
    }
}
