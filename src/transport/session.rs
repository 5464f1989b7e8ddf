use std::sync::Arc;

use reqwest::header::AUTHORIZATION;

use crate::auth::TokenProvider;
use crate::transport::http::{HttpRequest, HttpResponse, Transport, check_status};
use crate::utils::error::Result;

/// Default REST API version sent on entity management calls.
pub const DEFAULT_API_VERSION: &str = "2014-01";

/// An authenticated HTTP session against one broker namespace.
///
/// Every request goes out with whatever credential the [`TokenProvider`]
/// currently holds; the header is read under the provider's lock so a
/// request never observes a half-renewed token.
pub struct BusSession {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenProvider>,
    api_version: String,
}

impl BusSession {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            transport,
            tokens,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Sends `request` with the current authorization header and classifies
    /// the response status. `address` names the target in error values.
    pub async fn execute(&self, request: HttpRequest, address: &str) -> Result<HttpResponse> {
        let authorization = self.tokens.authorization().await;
        let request = request.header(AUTHORIZATION.as_str(), authorization);
        let response = self.transport.execute(request).await?;
        check_status(response, address)
    }
}
