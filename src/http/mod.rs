//! HTTP Adapters
//!
//! `reqwest` implementations of the external contracts against a JSON backend and a payment
//! gateway. Amounts on the wire are major units and converted to minor units on the way in.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::{products::CatalogError, services::ServiceError};

pub mod backend;
pub mod gateway;

pub use backend::RestBackend;
pub use gateway::HttpPaymentGateway;

/// Errors that can occur when talking to an HTTP service.
#[derive(Debug, Error)]
pub enum HttpError {
    /// An HTTP transport or serialization error occurred.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned a non-2xx response.
    #[error("request failed with status {status}: {message}")]
    Status {
        /// Response status code.
        status: u16,

        /// Error message extracted from the body.
        message: String,
    },

    /// The base URL cannot have path segments appended.
    #[error("base url cannot be a base: {0}")]
    InvalidBaseUrl(Url),

    /// The body parsed but made no sense.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<HttpError> for ServiceError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Status { status, message } => Self::Status { status, message },
            HttpError::Http(error) if error.is_decode() => {
                Self::UnexpectedResponse(error.to_string())
            }
            HttpError::Http(error) => Self::Network(error.to_string()),
            other @ (HttpError::InvalidBaseUrl(_) | HttpError::UnexpectedResponse(_)) => {
                Self::UnexpectedResponse(other.to_string())
            }
        }
    }
}

impl From<HttpError> for CatalogError {
    fn from(error: HttpError) -> Self {
        Self::Unavailable(error.to_string())
    }
}

/// `base` with `segments` appended, each one percent-encoded.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, HttpError> {
    let mut url = base.clone();

    url.path_segments_mut()
        .map_err(|()| HttpError::InvalidBaseUrl(base.clone()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Decode a successful JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, HttpError> {
    let response = ensure_success(response).await?;

    Ok(response.json().await?)
}

/// Decode a JSON body, mapping 404 to `None`.
pub(crate) async fn read_optional_json<T: DeserializeOwned>(
    response: Response,
) -> Result<Option<T>, HttpError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    read_json(response).await.map(Some)
}

/// Turn a non-2xx response into [`HttpError::Status`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response, HttpError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();

    Err(HttpError::Status {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// Pull the human message out of an error body such as `{"error": "..."}`, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["error", "message", "detail"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
    });

    from_json.unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() -> TestResult {
        let base = Url::parse("https://api.example/v1/")?;

        let url = endpoint(&base, &["coupons", "SAVE 10"])?;

        assert_eq!(url.as_str(), "https://api.example/v1/coupons/SAVE%2010");

        Ok(())
    }

    #[test]
    fn endpoint_rejects_opaque_base() -> TestResult {
        let base = Url::parse("mailto:shop@example.com")?;

        assert!(matches!(
            endpoint(&base, &["products"]),
            Err(HttpError::InvalidBaseUrl(_))
        ));

        Ok(())
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(r#"{"error": "insufficient stock"}"#),
            "insufficient stock"
        );
        assert_eq!(
            error_message(r#"{"message": "Too many requests"}"#),
            "Too many requests"
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn status_errors_keep_their_code() {
        let error = ServiceError::from(HttpError::Status {
            status: 503,
            message: "unavailable".to_string(),
        });

        assert_eq!(
            error,
            ServiceError::Status {
                status: 503,
                message: "unavailable".to_string(),
            }
        );
    }
}
