//! # Domain Layer
//!
//! Core models, pure services, and the engine error taxonomy.
//! This layer is independent of storage, parsers, and transports.

pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::*;
