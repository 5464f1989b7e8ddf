//! The `entity` module manages broker-side named entities: queues, topics,
//! subscriptions and filter rules.

pub mod address;
pub mod description;
pub mod manager;

pub use address::{DEFAULT_RULE_NAME, EntityAddress};
pub use description::EntityDescription;
pub use manager::{DEFAULT_ENTITY_TIMEOUT, EntityManager};
