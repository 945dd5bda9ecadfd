//! Monotonic request tokens for discarding out-of-order async results.
//!
//! Issue a token before each request on a logical stream; when the answer
//! arrives, apply it only if its token is still the latest one issued.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Plain-data sequence, meant to live inside a reducer's model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSeq {
    latest: u64,
}

impl RequestSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest != 0 && token.0 == self.latest
    }

    pub fn latest(&self) -> Option<RequestToken> {
        (self.latest != 0).then_some(RequestToken(self.latest))
    }
}

/// Sequence shared with spawned tasks that check their token on completion.
#[derive(Debug, Clone, Default)]
pub struct SharedRequestSeq {
    latest: Arc<AtomicU64>,
}

impl SharedRequestSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::Acquire) == token.0
    }

    /// Runs `apply` only when `token` is still the latest; stale results are dropped.
    pub fn apply_if_current<T>(&self, token: RequestToken, apply: impl FnOnce() -> T) -> Option<T> {
        if self.is_current(token) {
            Some(apply())
        } else {
            tracing::trace!(token = token.0, "discarding stale result");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/staleness_tests.rs"]
mod tests;
