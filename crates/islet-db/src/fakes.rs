//! In-memory fakes for the connector seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::connector::{Connector, DbClient};
use crate::error::{DbError, DbResult};

/// A fake connection that records queries and close calls.
#[derive(Debug)]
pub struct FakeClient {
    url: String,
    closes: Arc<AtomicUsize>,
    queries: Mutex<Vec<String>>,
    fail_queries: bool,
}

impl FakeClient {
    /// Statements issued against this client so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DbClient for FakeClient {
    async fn query(&self, statement: &str, params: Value) -> DbResult<Value> {
        if self.fail_queries {
            return Err(DbError::Query("forced query failure".into()));
        }
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.to_string());
        Ok(json!([{ "url": self.url, "statement": statement, "params": params }]))
    }

    async fn close(&self) -> DbResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A fake connector with per-URL close counters and failure switches.
#[derive(Debug, Default)]
pub struct FakeConnector {
    connects: AtomicUsize,
    closes: Mutex<HashMap<String, Arc<AtomicUsize>>>,
    fail_connects: bool,
    fail_queries: bool,
}

impl FakeConnector {
    /// A connector that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose `connect` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_connects: true,
            ..Self::default()
        }
    }

    /// A connector whose clients fail every query.
    #[must_use]
    pub fn with_failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Self::default()
        }
    }

    /// Total successful connects.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Close calls observed for `url` across all clients handed out.
    #[must_use]
    pub fn close_count_for(&self, url: &str) -> usize {
        self.closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> DbResult<Arc<dyn DbClient>> {
        if self.fail_connects {
            return Err(DbError::Connect(format!("refused: {url}")));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let closes = Arc::clone(
            self.closes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(url.to_string())
                .or_default(),
        );
        Ok(Arc::new(FakeClient {
            url: url.to_string(),
            closes,
            queries: Mutex::new(Vec::new()),
            fail_queries: self.fail_queries,
        }))
    }
}
