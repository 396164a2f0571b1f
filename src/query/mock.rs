//! Scripted query engine for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::query::{ExecutionStatus, QueryEngine, QueryState, ResultGrid};

/// What the engine does with one submitted statement.
pub struct Script {
    statuses: VecDeque<ExecutionStatus>,
    grid: ResultGrid,
    reject: Option<String>,
}

impl Script {
    /// Report `intermediate` states in order, then SUCCEEDED with `grid`.
    pub fn succeeds(intermediate: &[QueryState], grid: ResultGrid) -> Self {
        let mut statuses: VecDeque<_> = intermediate.iter().map(|s| status(*s, None)).collect();
        statuses.push_back(status(QueryState::Succeeded, None));
        Self { statuses, grid, reject: None }
    }

    /// Report `intermediate` states in order, then `terminal` with `reason`.
    pub fn ends(intermediate: &[QueryState], terminal: QueryState, reason: Option<&str>) -> Self {
        let mut statuses: VecDeque<_> = intermediate.iter().map(|s| status(*s, None)).collect();
        statuses.push_back(status(terminal, reason));
        Self { statuses, grid: ResultGrid::default(), reject: None }
    }

    /// Report `state` forever.
    pub fn stuck(state: QueryState) -> Self {
        Self {
            statuses: VecDeque::from([status(state, None)]),
            grid: ResultGrid::default(),
            reject: None,
        }
    }

    /// Reject the statement at submission.
    pub fn rejected(message: &str) -> Self {
        Self {
            statuses: VecDeque::new(),
            grid: ResultGrid::default(),
            reject: Some(message.to_string()),
        }
    }
}

fn status(state: QueryState, reason: Option<&str>) -> ExecutionStatus {
    ExecutionStatus { state, reason: reason.map(str::to_string) }
}

struct Active {
    id: String,
    script: Script,
}

/// Plays one script per submission, in order, and logs every call.
pub struct ScriptedEngine {
    pending: Mutex<VecDeque<Script>>,
    active: Mutex<Vec<Active>>,
    submitted_sql: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            pending: Mutex::new(scripts.into()),
            active: Mutex::new(Vec::new()),
            submitted_sql: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted_sql(&self) -> Vec<String> {
        self.submitted_sql.lock().unwrap().clone()
    }

    pub fn result_fetches(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("results:")).count()
    }

    pub fn status_polls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("status:")).count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn start_execution(&self, sql: &str, _database: &str) -> Result<String> {
        let script = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("no script left for submitted statement");
        self.submitted_sql.lock().unwrap().push(sql.to_string());

        if let Some(message) = script.reject {
            return Err(AppError::Submission(message));
        }

        let mut active = self.active.lock().unwrap();
        let id = format!("exec-{}", active.len() + 1);
        active.push(Active { id: id.clone(), script });
        drop(active);

        self.log(format!("start:{id}"));
        Ok(id)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let mut active = self.active.lock().unwrap();
        let entry = active
            .iter_mut()
            .find(|a| a.id == execution_id)
            .ok_or_else(|| AppError::Engine(format!("unknown execution {execution_id}")))?;
        let statuses = &mut entry.script.statuses;
        let current = if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap()
        };
        drop(active);

        self.log(format!("status:{execution_id}:{}", current.state));
        Ok(current)
    }

    async fn get_results(&self, execution_id: &str) -> Result<ResultGrid> {
        let active = self.active.lock().unwrap();
        let entry = active
            .iter()
            .find(|a| a.id == execution_id)
            .ok_or_else(|| AppError::Engine(format!("unknown execution {execution_id}")))?;
        let grid = entry.script.grid.clone();
        drop(active);

        self.log(format!("results:{execution_id}"));
        Ok(grid)
    }
}
