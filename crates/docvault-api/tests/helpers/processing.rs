//! Scripted stand-in for the external processing service.

use async_trait::async_trait;
use docvault_worker::{ProcessingError, ProcessingService};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Answers `ingest` from a script of results, then accepts everything.
/// Every call is recorded in order.
#[derive(Default)]
pub struct ScriptedProcessing {
    script: Mutex<VecDeque<Result<(), ProcessingError>>>,
    calls: Mutex<Vec<Uuid>>,
}

impl ScriptedProcessing {
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Queue the result for the next unanswered call.
    pub fn push(&self, result: Result<(), ProcessingError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessingService for ScriptedProcessing {
    async fn ingest(&self, file_id: Uuid) -> Result<(), ProcessingError> {
        self.calls.lock().unwrap().push(file_id);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
