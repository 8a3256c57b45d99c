//! Schema Catalog
//!
//! TTL-cached view of every table and column the database exposes. A cache
//! miss triggers exactly one introspection fetch no matter how many requests
//! arrive while it is in flight; every waiter gets that fetch's result.

use crate::error::{NlqError, Result};
use crate::metadata::{ColumnTriple, SchemaSnapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Introspection source yielding `(database, table, column)` rows.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch_columns(&self) -> Result<Vec<ColumnTriple>>;
}

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    loaded_at: Instant,
}

/// Outcome of the most recent refresh, tagged with its flight number.
struct Flight {
    epoch: u64,
    outcome: std::result::Result<Arc<SchemaSnapshot>, String>,
}

pub struct SchemaCatalog {
    source: Arc<dyn SchemaSource>,
    ttl: Duration,
    current: RwLock<Option<CachedSnapshot>>,
    /// Number of completed refreshes.
    epoch: AtomicU64,
    refresh: Mutex<Option<Flight>>,
}

impl SchemaCatalog {
    pub fn new(source: Arc<dyn SchemaSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            epoch: AtomicU64::new(0),
            refresh: Mutex::new(None),
        }
    }

    /// Current snapshot, refreshing it first if it is absent or expired.
    pub async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let observed = self.epoch.load(Ordering::Acquire);
        let mut flight = self.refresh.lock().await;

        // Someone else finished a refresh while we were queued: share it.
        if let Some(done) = flight.as_ref() {
            if done.epoch > observed {
                return done.outcome.clone().map_err(NlqError::CatalogFetch);
            }
        }
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let outcome = match self.source.fetch_columns().await {
            Ok(triples) => {
                let snapshot = Arc::new(SchemaSnapshot::from_triples(triples));
                info!("Schema catalog refreshed: {} tables", snapshot.len());
                self.store(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Schema catalog refresh failed: {}", e);
                Err(match e {
                    NlqError::CatalogFetch(message) => message,
                    other => other.to_string(),
                })
            }
        };

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *flight = Some(Flight {
            epoch,
            outcome: outcome.clone(),
        });

        outcome.map_err(NlqError::CatalogFetch)
    }

    /// Drop the cached snapshot; the next `snapshot()` call refetches.
    pub fn invalidate(&self) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
    }

    fn fresh(&self) -> Option<Arc<SchemaSnapshot>> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        current
            .as_ref()
            .filter(|cached| cached.loaded_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    fn store(&self, snapshot: Arc<SchemaSnapshot>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(CachedSnapshot {
            snapshot,
            loaded_at: Instant::now(),
        });
    }
}
