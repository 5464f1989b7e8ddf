//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `busrest` crate.
//!
//! This module centralizes reusable components, such as the crate-wide error
//! type, logging setup and shutdown signalling, to promote code consistency and reduce duplication.

pub mod error;
pub mod logging;
pub mod shutdown;
