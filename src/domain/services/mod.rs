pub mod ignore_filter;
pub mod query_builder;
pub mod snippet;

pub use ignore_filter::*;
pub use query_builder::*;
pub use snippet::*;
