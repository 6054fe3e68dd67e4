//! Duplicate-request rejection window.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use islet_core::ExecuteRequest;

/// Entries above this count trigger an opportunistic sweep.
const SWEEP_THRESHOLD: usize = 4096;

/// Remembers recently seen requests (by code + input) and flags repeats
/// inside the window.
#[derive(Debug)]
pub struct DedupeWindow {
    seen: DashMap<u64, Instant>,
    window: Duration,
}

impl DedupeWindow {
    /// A window of the given length.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    fn fingerprint(request: &ExecuteRequest) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.code.hash(&mut hasher);
        request.entry.hash(&mut hasher);
        if let Some(input) = &request.input {
            input.to_string().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Record the request; true when an identical one was already seen
    /// inside the window.
    pub fn is_duplicate(&self, request: &ExecuteRequest) -> bool {
        let key = Self::fingerprint(request);
        let now = Instant::now();

        if self.seen.len() > SWEEP_THRESHOLD {
            let window = self.window;
            self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < window);
        }

        if let Some(seen_at) = self.seen.get(&key)
            && now.duration_since(*seen_at) < self.window
        {
            return true;
        }
        self.seen.insert(key, now);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeats_inside_the_window_are_flagged() {
        let window = DedupeWindow::new(Duration::from_secs(60));
        let request = ExecuteRequest::new("fn default() { 1 }").with_input(json!(5));
        assert!(!window.is_duplicate(&request));
        assert!(window.is_duplicate(&request));
    }

    #[test]
    fn different_inputs_are_distinct() {
        let window = DedupeWindow::new(Duration::from_secs(60));
        let a = ExecuteRequest::new("fn default(x) { x }").with_input(json!(1));
        let b = ExecuteRequest::new("fn default(x) { x }").with_input(json!(2));
        assert!(!window.is_duplicate(&a));
        assert!(!window.is_duplicate(&b));
    }

    #[test]
    fn expired_entries_are_not_duplicates() {
        let window = DedupeWindow::new(Duration::from_millis(10));
        let request = ExecuteRequest::new("fn default() { 1 }");
        assert!(!window.is_duplicate(&request));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!window.is_duplicate(&request));
    }
}
