//! `RemoteNode`: a remote worker advertising a set of labels it can execute.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::util::clock::now_ms;

/// A remote HTTP executor the dispatcher can route work to.
pub struct RemoteNode {
    /// Human-readable node name.
    pub name: String,
    /// Base URL the wire protocol is relative to (no trailing slash).
    pub base_url: String,
    /// Capability labels this node advertises.
    pub labels: HashSet<String>,
    /// Bearer token sent with every request, if configured.
    pub auth_token: Option<String>,
    /// Positive weight; higher weight is preferred among equally-loaded nodes.
    pub weight: u32,
    outstanding: AtomicU32,
    last_ok_ms: AtomicU64,
}

impl RemoteNode {
    /// Build a node with zero in-flight requests and no prior success.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        labels: HashSet<String>,
        auth_token: Option<String>,
        weight: u32,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            labels,
            auth_token,
            weight: weight.max(1),
            outstanding: AtomicU32::new(0),
            last_ok_ms: AtomicU64::new(0),
        }
    }

    /// Current count of outstanding remote submissions.
    #[must_use]
    pub fn inflight(&self) -> u32 {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Wall-clock time (ms since epoch) of the node's most recent
    /// successful submission, or 0 if it has never succeeded.
    #[must_use]
    pub fn last_ok(&self) -> u64 {
        self.last_ok_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn begin_submission(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_submission(&self, succeeded: bool) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if succeeded {
            #[allow(clippy::cast_possible_truncation)]
            self.last_ok_ms.store(now_ms() as u64, Ordering::Release);
        }
    }

    /// The sort key used by least-loaded routing: ascending `inflight`,
    /// then descending `weight`, then descending `last_ok`.
    pub(crate) fn load_key(&self) -> (u32, std::cmp::Reverse<u32>, std::cmp::Reverse<u64>) {
        (self.inflight(), std::cmp::Reverse(self.weight), std::cmp::Reverse(self.last_ok()))
    }
}
