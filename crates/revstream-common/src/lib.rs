//! Revstream Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Revstream project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Revstream
//! workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing initialization
//! - **Types**: Shared domain enums (platforms, storage providers)
//!
//! # Example
//!
//! ```no_run
//! use revstream_common::types::Platform;
//!
//! let platform: Platform = "agoda".parse().unwrap();
//! assert_eq!(platform.as_str(), "agoda");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
