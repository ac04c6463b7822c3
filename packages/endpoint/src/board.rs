//! In-memory Host Task API.
//!
//! The board holds one entry per task:
//!
//! ```text
//! create -> Pending --claim--> Claimed --report--> Completed | Failed
//! ```
//!
//! A task is claimed at most once and its result is written exactly once.
//! The package is released when the task is claimed; the whole entry goes
//! away with [`TaskBoard::take_result`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use silo_agent::{AgentError, TaskApi};
use silo_core::{FunctionPackage, PackageError, PackageParts, TaskId, TaskOutcome};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("task {task_id} not found")]
    NotFound { task_id: TaskId },

    #[error("task {task_id} has not been claimed")]
    NotClaimed { task_id: TaskId },

    #[error("task {task_id} already has a result")]
    AlreadyReported { task_id: TaskId },

    #[error("invalid result payload: {0}")]
    Payload(#[from] PackageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

/// Bookkeeping for one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct Entry {
    record: TaskRecord,
    /// Released on claim.
    parts: Option<PackageParts>,
    result: watch::Sender<Option<TaskOutcome>>,
}

#[derive(Default)]
pub struct TaskBoard {
    tasks: Mutex<HashMap<TaskId, Entry>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package as a new pending task.
    pub fn create(&self, package: &FunctionPackage) -> TaskId {
        let id = TaskId::generate();
        let (result, _) = watch::channel(None);
        let entry = Entry {
            record: TaskRecord {
                id: id.clone(),
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                claimed_at: None,
                finished_at: None,
            },
            parts: Some(package.to_parts()),
            result,
        };
        self.tasks.lock().insert(id.clone(), entry);
        debug!(task_id = %id, "task created");
        id
    }

    /// Hand the task package to an agent. A task can only be claimed once;
    /// later claims see it as not found.
    pub fn claim(&self, task_id: &TaskId) -> Result<PackageParts, BoardError> {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(task_id) {
            Some(entry) if entry.record.status == TaskStatus::Pending => {
                if let Some(parts) = entry.parts.take() {
                    entry.record.status = TaskStatus::Claimed;
                    entry.record.claimed_at = Some(Utc::now());
                    return Ok(parts);
                }
            }
            _ => {}
        }
        Err(BoardError::NotFound {
            task_id: task_id.clone(),
        })
    }

    /// Record the outcome of a claimed task.
    pub fn report(&self, task_id: &TaskId, outcome: TaskOutcome) -> Result<(), BoardError> {
        let mut tasks = self.tasks.lock();
        let entry = tasks.get_mut(task_id).ok_or_else(|| BoardError::NotFound {
            task_id: task_id.clone(),
        })?;

        match entry.record.status {
            TaskStatus::Pending => {
                return Err(BoardError::NotClaimed {
                    task_id: task_id.clone(),
                })
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                warn!(task_id = %task_id, "duplicate result rejected");
                return Err(BoardError::AlreadyReported {
                    task_id: task_id.clone(),
                });
            }
            TaskStatus::Claimed => {}
        }

        entry.record.status = if outcome.is_output() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        entry.record.finished_at = Some(Utc::now());
        entry.result.send_replace(Some(outcome));
        debug!(task_id = %task_id, status = ?entry.record.status, "result recorded");
        Ok(())
    }

    /// [`report`](TaskBoard::report) from a posted Host Task API body.
    pub fn report_body(&self, task_id: &TaskId, body: &[u8]) -> Result<(), BoardError> {
        let outcome = TaskOutcome::from_body(body)?;
        self.report(task_id, outcome)
    }

    pub fn result(&self, task_id: &TaskId) -> Option<TaskOutcome> {
        self.tasks
            .lock()
            .get(task_id)
            .and_then(|entry| entry.result.borrow().clone())
    }

    /// Forget the task and return its result, if one was reported.
    ///
    /// Anyone still waiting in [`await_result`](TaskBoard::await_result)
    /// gets `NotFound` unless the result was already written.
    pub fn take_result(&self, task_id: &TaskId) -> Option<TaskOutcome> {
        let entry = self.tasks.lock().remove(task_id)?;
        let outcome = entry.result.borrow().clone();
        debug!(task_id = %task_id, status = ?entry.record.status, "task removed");
        outcome
    }

    pub fn record(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.tasks.lock().get(task_id).map(|e| e.record.clone())
    }

    /// All task records, oldest first.
    pub fn records(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .tasks
            .lock()
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Wait until the task has a result.
    pub async fn await_result(&self, task_id: &TaskId) -> Result<TaskOutcome, BoardError> {
        let mut receiver = self
            .tasks
            .lock()
            .get(task_id)
            .map(|e| e.result.subscribe())
            .ok_or_else(|| BoardError::NotFound {
                task_id: task_id.clone(),
            })?;

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BoardError::NotFound {
                task_id: task_id.clone(),
            })?
            .clone();
        outcome.ok_or_else(|| BoardError::NotFound {
            task_id: task_id.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[async_trait]
impl TaskApi for TaskBoard {
    async fn fetch_task(&self, task_id: &TaskId) -> silo_agent::Result<PackageParts> {
        self.claim(task_id).map_err(|_| AgentError::TaskNotFound {
            task_id: task_id.clone(),
            status: 404,
        })
    }

    async fn post_result(&self, task_id: &TaskId, body: String) -> silo_agent::Result<()> {
        self.report_body(task_id, body.as_bytes())
            .map_err(|e| AgentError::host(e.to_string()))
    }
}
