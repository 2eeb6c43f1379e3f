mod tfidf;

pub use tfidf::*;
