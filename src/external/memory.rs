//! `MemoryStore`: the graph/vector memory collaborator. Persisting an index
//! or implementing a graph database is explicitly out of scope; only the
//! trait and an in-memory test double live here.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::error::SchedulerError;
use crate::util::clock::now_ms;

/// A single semantic-retrieval match.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Retrieved text.
    pub text: String,
    /// Similarity score, higher is more relevant.
    pub score: f32,
}

/// Consumed interface to the memory subsystem. The router is a pure
/// producer with respect to memory: it calls `add_session_memory` and never
/// reads memory mid-stream.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one memory record for a session.
    async fn add_session_memory(
        &self,
        session_id: &str,
        text: &str,
        kind: &str,
        metadata: Option<Value>,
    ) -> Result<(), SchedulerError>;

    /// Retrieve the `k` most relevant records for `query`.
    async fn semantic_retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>, SchedulerError>;

    /// Record a relation between two entities.
    async fn link_entities(&self, src: &str, dst: &str, rel: &str) -> Result<(), SchedulerError>;
}

#[derive(Debug, Clone)]
struct Record {
    session_id: String,
    text: String,
    kind: String,
    #[allow(dead_code)]
    metadata: Option<Value>,
    created_at_ms: u128,
}

/// Deterministic in-process memory store used by tests.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: Mutex<Vec<Record>>,
    links: Mutex<Vec<(String, String, String)>>,
}

impl InMemoryMemoryStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of a given `kind` recorded for `session_id`.
    #[must_use]
    pub fn count_kind(&self, session_id: &str, kind: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.session_id == session_id && r.kind == kind)
            .count()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn add_session_memory(
        &self,
        session_id: &str,
        text: &str,
        kind: &str,
        metadata: Option<Value>,
    ) -> Result<(), SchedulerError> {
        self.records.lock().push(Record {
            session_id: session_id.to_owned(),
            text: text.to_owned(),
            kind: kind.to_owned(),
            metadata,
            created_at_ms: now_ms(),
        });
        Ok(())
    }

    async fn semantic_retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>, SchedulerError> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Hit> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.text.to_lowercase().contains(&needle))
            .map(|r| Hit {
                text: r.text.clone(),
                score: 1.0,
            })
            .collect();
        hits.truncate(k);
        Ok(hits)
    }

    async fn link_entities(&self, src: &str, dst: &str, rel: &str) -> Result<(), SchedulerError> {
        self.links
            .lock()
            .push((src.to_owned(), dst.to_owned(), rel.to_owned()));
        Ok(())
    }
}
