//! Knowledge Base
//!
//! Information Hiding:
//! - Where rows come from is hidden behind `KnowledgeSource`
//! - Caching and refresh coordination live in `cache`
//! - Relevance scoring lives in `ranker`

pub mod cache;
pub mod ranker;
pub mod sheets;

use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use cache::KnowledgeCache;
pub use ranker::{FallbackPolicy, Ranker};
pub use sheets::SheetsSource;

/// One flattened record of the knowledge table. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeRow(String);

impl KnowledgeRow {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KnowledgeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pull-based supplier of the whole knowledge table.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<KnowledgeRow>, FetchError>;
}
