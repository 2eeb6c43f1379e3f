//! Local statistical reranker: TF-IDF cosine between the query and each
//! candidate document, no network, bounded score cache.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use tracing::debug;

use crate::application::{Reranker, RerankCandidate};
use crate::domain::{EngineError, SearchHit};

const CACHE_CAPACITY: usize = 1024;

pub struct TfidfReranker {
    /// Scores keyed by (query hash, result path). Misses are computed
    /// outside the lock; only lookups and inserts hold it.
    cache: Mutex<LruCache<(u64, String), f32>>,
}

impl TfidfReranker {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"),
            )),
        }
    }
}

impl Default for TfidfReranker {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f32> {
    let mut tf: HashMap<&str, f32> = HashMap::new();
    for token in tokens {
        *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    tf
}

fn query_hash(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl Reranker for TfidfReranker {
    fn name(&self) -> &str {
        "tfidf-cosine"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
    ) -> Result<Vec<SearchHit>, EngineError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let qhash = query_hash(query);

        // Cache lookups first, holding the lock only for the probe.
        let mut cached: Vec<Option<f32>> = Vec::with_capacity(candidates.len());
        {
            let mut cache = self.cache.lock().expect("reranker cache poisoned");
            for candidate in &candidates {
                cached.push(cache.get(&(qhash, candidate.hit.file.clone())).copied());
            }
        }

        // Document frequencies over the candidate pool.
        let docs: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(&c.document)).collect();
        let n_docs = docs.len() as f32;
        let mut df: HashMap<&str, f32> = HashMap::new();
        for doc in &docs {
            let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0.0) += 1.0;
            }
        }
        let idf = |term: &&str| -> f32 {
            let d = df.get(*term).copied().unwrap_or(0.0);
            (1.0 + n_docs / (1.0 + d)).ln()
        };

        let query_tokens = tokenize(query);
        let query_tf = term_frequencies(&query_tokens);
        let query_weights: HashMap<&str, f32> = query_tf
            .iter()
            .map(|(term, tf)| (*term, tf * idf(term)))
            .collect();
        let query_norm: f32 = query_weights.values().map(|w| w * w).sum::<f32>().sqrt();

        let mut fresh: Vec<(String, f32)> = Vec::new();
        let mut scored: Vec<SearchHit> = Vec::with_capacity(candidates.len());
        for ((candidate, doc_tokens), cached_score) in
            candidates.into_iter().zip(&docs).zip(cached)
        {
            let score = match cached_score {
                Some(score) => score,
                None => {
                    let doc_tf = term_frequencies(doc_tokens);
                    let mut dot = 0.0f32;
                    let mut doc_norm = 0.0f32;
                    for (term, tf) in &doc_tf {
                        let weight = tf * idf(term);
                        doc_norm += weight * weight;
                        if let Some(qw) = query_weights.get(term) {
                            dot += weight * qw;
                        }
                    }
                    let doc_norm = doc_norm.sqrt();
                    let score = if doc_norm == 0.0 || query_norm == 0.0 {
                        0.0
                    } else {
                        dot / (doc_norm * query_norm)
                    };
                    fresh.push((candidate.hit.file.clone(), score));
                    score
                }
            };

            let mut hit = candidate.hit;
            hit.rerank_score = Some(score);
            scored.push(hit);
        }

        if !fresh.is_empty() {
            let mut cache = self.cache.lock().expect("reranker cache poisoned");
            for (path, score) in fresh {
                cache.put((qhash, path), score);
            }
        }

        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!("Reranked {} candidates", scored.len());
        Ok(scored)
    }
}
