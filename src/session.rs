use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::PredictError;
use crate::model::{predict_table, Classifier};
use crate::report::PredictionReport;
use crate::table::SensorTable;

#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    NoFileUploaded,
    FileUploaded {
        file_name: String,
        table: Arc<SensorTable>,
    },
    Predicted {
        file_name: String,
        table: Arc<SensorTable>,
        report: Arc<PredictionReport>,
    },
}

/// One browser's view: the current upload, its results and the last error.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
    error: Option<String>,
}

impl Session {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn table(&self) -> Option<&Arc<SensorTable>> {
        match &self.state {
            SessionState::NoFileUploaded => None,
            SessionState::FileUploaded { table, .. } | SessionState::Predicted { table, .. } => {
                Some(table)
            }
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::NoFileUploaded => None,
            SessionState::FileUploaded { file_name, .. }
            | SessionState::Predicted { file_name, .. } => Some(file_name),
        }
    }

    pub fn report(&self) -> Option<&Arc<PredictionReport>> {
        match &self.state {
            SessionState::Predicted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// A new upload replaces whatever came before, results included.
    pub fn upload(&mut self, file_name: String, table: SensorTable) {
        self.state = SessionState::FileUploaded {
            file_name,
            table: Arc::new(table),
        };
        self.error = None;
    }

    /// Failed upload: keep the previous state, show the error.
    pub fn reject_upload(&mut self, message: String) {
        self.error = Some(message);
    }

    /// Table to run inference on. With no file uploaded the error is
    /// recorded and returned.
    pub fn prediction_input(&mut self) -> Result<Arc<SensorTable>, PredictError> {
        match self.table() {
            Some(table) => Ok(table.clone()),
            None => {
                self.error = Some(PredictError::NoFile.user_message());
                Err(PredictError::NoFile)
            }
        }
    }

    /// Stores the outcome of inference over `table`. On failure the session
    /// drops back to `FileUploaded` with the error recorded. Yields `None`
    /// when a newer upload replaced `table` in the meantime; the outcome is
    /// then discarded.
    pub fn finish_prediction(
        &mut self,
        table: &Arc<SensorTable>,
        outcome: Result<PredictionReport, PredictError>,
    ) -> Option<Result<Arc<PredictionReport>, PredictError>> {
        let file_name = match (self.table(), self.file_name()) {
            (Some(current), Some(name)) if Arc::ptr_eq(current, table) => name.to_string(),
            _ => return None,
        };

        Some(match outcome {
            Ok(report) => {
                let report = Arc::new(report);
                self.state = SessionState::Predicted {
                    file_name,
                    table: table.clone(),
                    report: report.clone(),
                };
                self.error = None;
                Ok(report)
            }
            Err(e) => {
                self.state = SessionState::FileUploaded {
                    file_name,
                    table: table.clone(),
                };
                self.error = Some(e.user_message());
                Err(e)
            }
        })
    }

    /// Runs inference on the current table in one step.
    pub fn predict(&mut self, model: &dyn Classifier) -> Result<Arc<PredictionReport>, PredictError> {
        let table = self.prediction_input()?;
        let outcome = run_prediction(model, &table);
        self.finish_prediction(&table, outcome)
            .unwrap_or(Err(PredictError::NoFile))
    }
}

/// Derive, predict and build the report. Needs no session lock.
pub fn run_prediction(
    model: &dyn Classifier,
    table: &SensorTable,
) -> Result<PredictionReport, PredictError> {
    predict_table(model, table).and_then(|labels| PredictionReport::build(table, labels))
}

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 256;

struct Entry {
    session: Session,
    touched: Instant,
}

/// Sessions keyed by cookie id, in memory only. Ids are only ever minted
/// here, idle sessions expire after `ttl`, and at most `max_sessions` live
/// at once (the least recently used is evicted to make room).
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    fn sweep(sessions: &mut HashMap<Uuid, Entry>, ttl: Duration, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|_, e| now.saturating_duration_since(e.touched) <= ttl);
        before - sessions.len()
    }

    /// Drops sessions idle for longer than the ttl as of `now`.
    pub fn purge_idle(&self, now: Instant) -> usize {
        let dropped = Self::sweep(&mut self.sessions.lock(), self.ttl, now);
        if dropped > 0 {
            tracing::debug!("expired {} idle sessions", dropped);
        }
        dropped
    }

    /// Starts a session under a fresh id.
    pub fn open(&self) -> Uuid {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.ttl, now);

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    tracing::debug!("evicted session {}", id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(
            id,
            Entry {
                session: Session::default(),
                touched: now,
            },
        );
        id
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.with(*id, |_| ()).is_some()
    }

    /// Snapshot of a live session.
    pub fn get(&self, id: &Uuid) -> Option<Session> {
        self.with(*id, |s| s.clone())
    }

    /// Runs `f` against a live session. Unknown or expired ids yield `None`
    /// and create nothing.
    pub fn with<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.ttl, now);
        let entry = sessions.get_mut(&id)?;
        entry.touched = now;
        Some(f(&mut entry.session))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
