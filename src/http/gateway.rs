//! Payment Gateway

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    http::{HttpError, endpoint, read_json},
    services::{
        AntiForgeryHeaders, AntiForgeryTokens, PaymentMethod, PaymentSession,
        PaymentSessionEndpoint, PaymentSessionRequest, ServiceError,
    },
};

const DEFAULT_TOKEN_HEADER: &str = "x-csrf-token";

/// Payment gateway creating hosted sessions, guarded by anti-forgery tokens it issues itself.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    base: Url,
    http: Client,
    token: Arc<Mutex<Option<IssuedToken>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct IssuedToken {
    token: String,
    #[serde(default = "default_token_header")]
    header: String,
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    url: Url,
}

impl HttpPaymentGateway {
    /// Client for the gateway at `base`.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            base,
            http: Client::new(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    fn cached_token(&self) -> Result<Option<IssuedToken>, ServiceError> {
        self.token
            .lock()
            .map(|token| token.clone())
            .map_err(|_poison| ServiceError::UnexpectedResponse("token cache poisoned".to_string()))
    }

    fn store_token(&self, token: Option<IssuedToken>) -> Result<(), ServiceError> {
        let mut slot = self.token.lock().map_err(|_poison| {
            ServiceError::UnexpectedResponse("token cache poisoned".to_string())
        })?;

        *slot = token;

        Ok(())
    }

    async fn issue_token(&self) -> Result<IssuedToken, ServiceError> {
        let url = endpoint(&self.base, &["csrf-token"])?;

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;
        let token: IssuedToken = read_json(response).await?;

        if token.token.is_empty() {
            return Err(HttpError::UnexpectedResponse("empty anti-forgery token".to_string()).into());
        }

        Ok(token)
    }
}

#[async_trait]
impl AntiForgeryTokens for HttpPaymentGateway {
    async fn get_headers(&self) -> Result<AntiForgeryHeaders, ServiceError> {
        let token = match self.cached_token()? {
            Some(token) => token,
            None => {
                let token = self.issue_token().await?;
                self.store_token(Some(token.clone()))?;

                token
            }
        };

        Ok(AntiForgeryHeaders::from([(token.header, token.token)]))
    }

    #[instrument(name = "http.gateway.regenerate_token", skip(self), err)]
    async fn regenerate(&self) -> Result<(), ServiceError> {
        self.store_token(None)?;

        let token = self.issue_token().await?;

        debug!("anti-forgery token regenerated");

        self.store_token(Some(token))
    }
}

#[async_trait]
impl PaymentSessionEndpoint for HttpPaymentGateway {
    #[instrument(name = "http.gateway.create_session", skip(self, headers, request), fields(lines = request.items.len()), err)]
    async fn create_session(
        &self,
        method: PaymentMethod,
        headers: &AntiForgeryHeaders,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let url = endpoint(&self.base, &["payments", method.as_str(), "sessions"])?;

        let mut builder = self.http.post(url).json(request);

        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(HttpError::from)?;
        let session: SessionResponse = read_json(response).await?;

        Ok(PaymentSession { url: session.url })
    }
}
