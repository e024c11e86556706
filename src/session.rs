//! Per-request stream bookkeeping.

use crate::types::events::Snippet;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// State carried across one relayed request: which attempt is live, whether
/// output has been forwarded, and the retrieval provenance to stamp onto the
/// terminal event.
#[derive(Debug)]
pub struct StreamSession {
    pub request_id: String,
    started: Instant,
    provider_index: usize,
    first_token_at: Option<Instant>,
    token_count: u64,
    snippets: Option<Vec<Snippet>>,
    terminal_sent: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            provider_index: 0,
            first_token_at: None,
            token_count: 0,
            snippets: None,
            terminal_sent: false,
        }
    }

    pub fn attach_snippets(&mut self, snippets: Vec<Snippet>) {
        if !snippets.is_empty() {
            self.snippets = Some(snippets);
        }
    }

    pub fn snippets(&self) -> Option<&[Snippet]> {
        self.snippets.as_deref()
    }

    pub fn take_snippets(&mut self) -> Option<Vec<Snippet>> {
        self.snippets.take()
    }

    pub fn advance_provider(&mut self, index: usize) {
        self.provider_index = index;
    }

    pub fn provider_index(&self) -> usize {
        self.provider_index
    }

    /// A non-primary attempt producing output means the session fell back.
    pub fn fallback_used(&self) -> bool {
        self.provider_index > 0
    }

    /// Record one forwarded token. Returns true for the first token of the
    /// session, which is the commit point after which no provider switch is
    /// allowed.
    pub fn mark_token(&mut self) -> bool {
        self.token_count += 1;
        if self.first_token_at.is_none() {
            self.first_token_at = Some(Instant::now());
            return true;
        }
        false
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn has_output(&self) -> bool {
        self.token_count > 0
    }

    pub fn first_token_latency(&self) -> Option<Duration> {
        self.first_token_at.map(|t| t.duration_since(self.started))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Marks the terminal event as sent. Returns false if one was already
    /// sent, in which case the caller must drop the event.
    pub fn mark_terminal(&mut self) -> bool {
        if self.terminal_sent {
            return false;
        }
        self.terminal_sent = true;
        true
    }

    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_is_the_commit_point() {
        let mut s = StreamSession::new();
        assert!(!s.has_output());
        assert!(s.mark_token());
        assert!(!s.mark_token());
        assert_eq!(s.token_count(), 2);
        assert!(s.first_token_latency().is_some());
    }

    #[test]
    fn terminal_is_sent_at_most_once() {
        let mut s = StreamSession::new();
        assert!(s.mark_terminal());
        assert!(!s.mark_terminal());
        assert!(s.terminal_sent());
    }

    #[test]
    fn fallback_reflects_provider_index() {
        let mut s = StreamSession::new();
        assert!(!s.fallback_used());
        s.advance_provider(1);
        assert!(s.fallback_used());
    }

    #[test]
    fn empty_snippet_list_is_not_provenance() {
        let mut s = StreamSession::new();
        s.attach_snippets(Vec::new());
        assert!(s.snippets().is_none());
    }
}
