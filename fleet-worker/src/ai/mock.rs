//! Scripted completion backend for tests.

use crate::ai::{AiError, CompletionClient, CompletionRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(AiError),
    Panic(&'static str),
    /// Never resolves; used to exercise deadlines and cancellation.
    Hang,
}

/// Replays a fixed script of replies and records every request it receives.
/// Once the script runs out the last entry is repeated.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Scripted::Reply(r.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self) -> Scripted {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        match script.pop_front() {
            Some(entry) => {
                *last = Some(entry.clone());
                entry
            }
            None => last
                .clone()
                .unwrap_or_else(|| Scripted::Fail(AiError::Request("script exhausted".into()))),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request);
        match self.next() {
            Scripted::Reply(text) => Ok(text),
            Scripted::Fail(err) => Err(err),
            Scripted::Panic(msg) => panic!("{}", msg),
            Scripted::Hang => std::future::pending().await,
        }
    }
}
