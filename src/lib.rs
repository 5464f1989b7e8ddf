//! # busrest
//!
//! `busrest` is a client for message brokers that speak the Service Bus REST
//! dialect: queues, topics and subscriptions driven by plain HTTP verbs, with
//! broker-managed message fields carried in a JSON header.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `auth`: Shared access signatures, legacy WRAP tokens and their renewal.
//! - `client`: Sending, receiving and settling messages under peek-lock.
//! - `config`: Layered settings from a config file and `BUSREST_*` environment variables.
//! - `entity`: Idempotent create/get/delete of queues, topics, subscriptions and rules.
//! - `message`: The message model and its header codec.
//! - `retry`: Bounded retry and the long-running receive loop.
//! - `transport`: The HTTP seam and the authenticated session on top of it.
//! - `utils`: Shared utilities, such as error handling and logging.

pub mod auth;
pub mod client;
pub mod config;
pub mod entity;
pub mod message;
pub mod retry;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
