#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use sqlpilot_lib::ai::{CompletionBackend, CompletionRequest};
use sqlpilot_lib::db::{ColumnDef, ConnectionConfig, Connector, DbSession, RawResult};
use sqlpilot_lib::{AssistantError, Result, VendorError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PASSWORD: &str = "pw";

#[derive(Default)]
struct Inner {
    responses: Mutex<HashMap<String, RawResult>>,
    executed: Mutex<Vec<String>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-process database answering statements from a table of canned results.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    inner: Arc<Inner>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, sql: &str, result: RawResult) {
        self.inner
            .responses
            .lock()
            .unwrap()
            .insert(sql.to_string(), result);
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Most statements ever running at the same time on this database.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeDatabase {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DbSession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if config.password != PASSWORD {
            return Err(AssistantError::Authentication(VendorError::new(
                "28P01",
                format!("password authentication failed for user \"{}\"", config.user),
            )));
        }
        Ok(Box::new(FakeSession {
            inner: Arc::clone(&self.inner),
            open: true,
        }))
    }
}

struct FakeSession {
    inner: Arc<Inner>,
    open: bool,
}

#[async_trait]
impl DbSession for FakeSession {
    async fn run(&mut self, sql: &str) -> Result<RawResult> {
        assert!(self.open, "statement sent on a closed session");
        let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(running, Ordering::SeqCst);
        // Let other tasks run while this statement is "on the wire".
        tokio::task::yield_now().await;
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.inner.executed.lock().unwrap().push(sql.to_string());
        let found = self.inner.responses.lock().unwrap().get(sql).cloned();
        found.ok_or_else(|| {
            AssistantError::Execution(VendorError::new(
                "42P01",
                format!("relation does not exist for statement: {}", sql),
            ))
        })
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> RawResult {
    RawResult {
        columns: Some(columns.iter().map(|c| ColumnDef::new(*c, "text")).collect()),
        rows,
    }
}

/// Completion backend that replays canned replies in order.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AssistantError::Backend(message)),
            None => Err(AssistantError::Backend("no scripted reply left".into())),
        }
    }
}
