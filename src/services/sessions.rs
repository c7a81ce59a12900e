use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ReconcileError;
use crate::gateway::Gateway;
use crate::services::reconciliation::{EngineSettings, ReconciliationEngine};
use crate::validation::validate_identifier;

pub const DEFAULT_MAX_SESSIONS: usize = 64;

struct Session {
    engine: Arc<ReconciliationEngine>,
    last_used: AtomicU64,
}

/// One reconciliation engine per store, created on first use and dropped on close.
/// Once `max_sessions` stores are open, opening another evicts the least recently used.
#[derive(Clone)]
pub struct SessionRegistry {
    gateway: Arc<dyn Gateway>,
    settings: EngineSettings,
    max_sessions: usize,
    clock: Arc<AtomicU64>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn Gateway>, settings: EngineSettings) -> Self {
        Self::with_capacity(gateway, settings, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(
        gateway: Arc<dyn Gateway>,
        settings: EngineSettings,
        max_sessions: usize,
    ) -> Self {
        Self {
            gateway,
            settings,
            max_sessions: max_sessions.max(1),
            clock: Arc::new(AtomicU64::new(0)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the store's engine, creating and loading it if needed.
    /// A store whose first load fails is not registered.
    pub async fn open(&self, store_id: &str) -> Result<Arc<ReconciliationEngine>, ReconcileError> {
        validate_identifier("store_id", store_id)?;

        if let Some(session) = self.sessions.read().await.get(store_id) {
            session.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(session.engine.clone());
        }

        let engine = Arc::new(ReconciliationEngine::new(
            store_id,
            self.gateway.clone(),
            self.settings,
        ));
        engine.reload().await?;

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(store_id) {
            session.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(session.engine.clone());
        }

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    tracing::info!(
                        "Evicted least recently used session for store {} ({} open)",
                        id,
                        self.max_sessions
                    );
                }
                None => break,
            }
        }

        sessions.insert(
            store_id.to_string(),
            Session {
                engine: engine.clone(),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        tracing::info!("Opened reconciliation session for store {}", store_id);
        Ok(engine)
    }

    pub async fn get(&self, store_id: &str) -> Option<Arc<ReconciliationEngine>> {
        self.sessions
            .read()
            .await
            .get(store_id)
            .map(|session| session.engine.clone())
    }

    /// Drops the store's engine along with its snapshots and staged decision.
    pub async fn close(&self, store_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(store_id).is_some();
        if removed {
            tracing::info!("Closed reconciliation session for store {}", store_id);
        }
        removed
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
