mod embedding_provider;
mod plugin;
mod reranker;
mod vector_store;

pub use embedding_provider::*;
pub use plugin::*;
pub use reranker::*;
pub use vector_store::*;
