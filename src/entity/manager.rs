use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::entity::description::EntityDescription;
use crate::transport::{BusSession, HttpRequest, Method, timeout_secs, with_query};
use crate::utils::error::{BusError, Result};

pub const DEFAULT_ENTITY_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENTITY_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

/// Creates, reads and deletes queues, topics, subscriptions and rules.
///
/// `create` and `delete` are idempotent: an entity that already exists (409)
/// or is already gone (404) is logged and reported as success. Every other
/// failure, including 401, is returned to the caller.
#[derive(Clone)]
pub struct EntityManager {
    session: Arc<BusSession>,
}

impl EntityManager {
    pub fn new(session: Arc<BusSession>) -> Self {
        Self { session }
    }

    pub async fn create(
        &self,
        address: &str,
        description: &EntityDescription,
        timeout: Duration,
    ) -> Result<()> {
        let request = HttpRequest::new(Method::PUT, self.entity_url(address, timeout))
            .header(CONTENT_TYPE.as_str(), ENTITY_CONTENT_TYPE)
            .body(description.body().clone());

        match self.session.execute(request, address).await {
            Ok(_) => {
                info!(address, "entity created");
                Ok(())
            }
            Err(BusError::Conflict { .. }) => {
                warn!(address, "entity already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the entity's description document as sent by the broker.
    pub async fn get(&self, address: &str, timeout: Duration) -> Result<Bytes> {
        let request = HttpRequest::new(Method::GET, self.entity_url(address, timeout));
        let response = self.session.execute(request, address).await?;
        Ok(response.body)
    }

    pub async fn delete(&self, address: &str, timeout: Duration) -> Result<()> {
        let request = HttpRequest::new(Method::DELETE, self.entity_url(address, timeout));

        match self.session.execute(request, address).await {
            Ok(_) => {
                info!(address, "entity deleted");
                Ok(())
            }
            Err(BusError::NotFound { .. }) => {
                warn!(address, "entity not found");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn entity_url(&self, address: &str, timeout: Duration) -> String {
        with_query(
            address,
            &[
                ("timeout", timeout_secs(timeout).to_string()),
                ("api-version", self.session.api_version().to_string()),
            ],
        )
    }
}
