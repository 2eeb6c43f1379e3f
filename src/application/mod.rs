//! # Application Layer
//!
//! Ports (interfaces) and use cases orchestrating domain and connector code.

pub mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;
