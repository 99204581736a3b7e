//! Shared fixtures: a scripted login server and pre-keyed account state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use coffer_core::disklet::MemoryDisklet;
use coffer_core::server::LoginFetch;
use coffer_core::{LoginContext, LoginError, ServerMethod};

/// One request as the fake server saw it.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub method: ServerMethod,
    pub path: String,
    pub body: Value,
}

/// A [`LoginFetch`] that replays scripted replies and records every
/// request.
#[derive(Default)]
pub struct FakeServer {
    replies: Mutex<VecDeque<Result<Value, LoginError>>>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_success(&self, results: Value) {
        self.replies.lock().unwrap().push_back(Ok(results));
    }

    pub fn push_error(&self, error: LoginError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginFetch for FakeServer {
    async fn fetch(
        &self,
        method: ServerMethod,
        path: &str,
        body: &Value,
        _timeout: Option<Duration>,
    ) -> Result<Value, LoginError> {
        self.requests.lock().unwrap().push(SeenRequest {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LoginError::Network("no scripted reply".into())))
    }
}

/// A context wired to a fake server and in-memory storage, rooted at the
/// given app id.
pub fn test_context(server: Arc<FakeServer>, app_id: &str) -> LoginContext {
    LoginContext::with_parts(
        server,
        Arc::new(MemoryDisklet::new()),
        app_id.to_string(),
        Some("integration test device".to_string()),
    )
}
