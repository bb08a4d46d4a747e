//! Session store: one uploaded report per session, held in memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::mail::SendHistory;
use crate::report::LoadedReport;

struct Session {
    report: LoadedReport,
    histories: Vec<SendHistory>,
    /// Held for the whole of a send run.
    send_lock: Arc<Mutex<()>>,
    last_access: Instant,
}

impl Session {
    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    pub async fn create(&self, report: LoadedReport) -> Uuid {
        let id = Uuid::new_v4();
        info!(
            session_id = %id,
            file = %report.file_name,
            rows = report.table.len(),
            "Session created"
        );
        let session = Session {
            report,
            histories: Vec::new(),
            send_lock: Arc::new(Mutex::new(())),
            last_access: Instant::now(),
        };
        self.sessions.write().await.insert(id, session);
        id
    }

    /// A snapshot of the session's report. Runs work on the copy so the
    /// store lock is never held across classification or SMTP.
    pub async fn report(&self, id: Uuid) -> Result<LoadedReport, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(session.report.clone())
    }

    /// Wait for any running send on this session to finish, then return
    /// the send guard with a fresh snapshot. Sends on one session run one
    /// after another, each seeing the rows marked by the previous one.
    pub async fn begin_send(
        &self,
        id: Uuid,
    ) -> Result<(OwnedMutexGuard<()>, LoadedReport), SessionError> {
        let lock = {
            let sessions = self.sessions.read().await;
            let session = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            Arc::clone(&session.send_lock)
        };
        let guard = lock.lock_owned().await;
        debug!(session_id = %id, "Send lock acquired");
        let report = self.report(id).await?;
        Ok((guard, report))
    }

    /// Store a finished send run and mark its rows as sent. Returns the
    /// number of rows marked.
    pub async fn record_send(
        &self,
        id: Uuid,
        history: SendHistory,
        today: NaiveDate,
    ) -> Result<usize, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        let marked = session.report.mark_sent(history.sent_rows(), today);
        debug!(session_id = %id, history_id = %history.id, marked, "Send recorded");
        session.histories.push(history);
        session.touch();
        Ok(marked)
    }

    pub async fn histories(&self, id: Uuid) -> Result<Vec<SendHistory>, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(session.histories.clone())
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Session closed");
        }
        removed
    }

    /// Drop sessions idle longer than the TTL. Returns how many were dropped.
    pub async fn expire_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_access.elapsed() < self.ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired, remaining = sessions.len(), "Idle sessions expired");
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Spawn a background task that expires idle sessions every minute.
pub fn spawn_sweep_task(store: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            store.expire_idle().await;
        }
    })
}
