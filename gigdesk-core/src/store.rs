//! Flat-file record store
//!
//! Keyed collections of Users, Gigs, Orders and Disputes held in one
//! in-memory snapshot behind a single `RwLock`. Mutating operations take
//! the write lock, apply their changes, and persist synchronously before
//! returning, so no two read-modify-write sequences interleave and
//! cross-collection updates (status/escrow/wallet) commit as one step.
//!
//! Durable layout: one JSON file per collection in the data directory.
//! A missing or unreadable file loads as an empty collection.

use crate::{
    error::MarketError,
    models::{Dispute, Gig, Order, User},
    MarketResult,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const USERS_FILE: &str = "users.json";
const GIGS_FILE: &str = "gigs.json";
const ORDERS_FILE: &str = "orders.json";
const DISPUTES_FILE: &str = "disputes.json";

/// In-memory snapshot of every record collection
#[derive(Debug, Default)]
pub struct Collections {
    pub users: HashMap<Uuid, User>,
    pub gigs: HashMap<Uuid, Gig>,
    pub orders: HashMap<Uuid, Order>,
    pub disputes: HashMap<Uuid, Dispute>,
}

impl Collections {
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    pub fn require_user(&self, id: Uuid) -> MarketResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| MarketError::not_found(format!("User {id} not found")))
    }

    pub fn require_gig(&self, id: Uuid) -> MarketResult<&Gig> {
        self.gigs
            .get(&id)
            .ok_or_else(|| MarketError::not_found(format!("Gig {id} not found")))
    }

    pub fn require_order(&self, id: Uuid) -> MarketResult<&Order> {
        self.orders
            .get(&id)
            .ok_or_else(|| MarketError::not_found(format!("Order {id} not found")))
    }

    pub fn require_order_mut(&mut self, id: Uuid) -> MarketResult<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found(format!("Order {id} not found")))
    }

    pub fn require_dispute(&self, id: Uuid) -> MarketResult<&Dispute> {
        self.disputes
            .get(&id)
            .ok_or_else(|| MarketError::not_found(format!("Dispute {id} not found")))
    }
}

/// Durable record store with single-writer discipline
pub struct RecordStore {
    /// None for in-memory stores (tests); no persistence is attempted
    data_dir: Option<PathBuf>,
    inner: RwLock<Collections>,
}

impl RecordStore {
    /// Open the store, loading every collection from the data directory
    pub fn open(data_dir: impl Into<PathBuf>) -> MarketResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let collections = Collections {
            users: load_collection(&data_dir.join(USERS_FILE)),
            gigs: load_collection(&data_dir.join(GIGS_FILE)),
            orders: load_collection(&data_dir.join(ORDERS_FILE)),
            disputes: load_collection(&data_dir.join(DISPUTES_FILE)),
        };

        info!(
            users = collections.users.len(),
            gigs = collections.gigs.len(),
            orders = collections.orders.len(),
            disputes = collections.disputes.len(),
            "Loaded record store from {}",
            data_dir.display()
        );

        Ok(Self {
            data_dir: Some(data_dir),
            inner: RwLock::new(collections),
        })
    }

    /// Create a store with no backing files
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            inner: RwLock::new(Collections::default()),
        }
    }

    /// Run a read-only closure against the current snapshot
    pub async fn read<T>(&self, f: impl FnOnce(&Collections) -> T) -> T {
        let collections = self.inner.read().await;
        f(&collections)
    }

    /// Run a mutating closure under the write lock and persist on success
    ///
    /// Closures validate against the snapshot before touching it: an `Err`
    /// return must leave the collections unchanged, which keeps every
    /// operation all-or-nothing without copying the snapshot.
    pub async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Collections) -> MarketResult<T>,
    ) -> MarketResult<T> {
        let mut collections = self.inner.write().await;
        let out = f(&mut collections)?;
        self.persist(&collections)?;
        Ok(out)
    }

    /// Write every collection out, for graceful shutdown
    pub async fn flush(&self) -> MarketResult<()> {
        let collections = self.inner.read().await;
        self.persist(&collections)
    }

    fn persist(&self, collections: &Collections) -> MarketResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        store_collection(&dir.join(USERS_FILE), &collections.users)?;
        store_collection(&dir.join(GIGS_FILE), &collections.gigs)?;
        store_collection(&dir.join(ORDERS_FILE), &collections.orders)?;
        store_collection(&dir.join(DISPUTES_FILE), &collections.disputes)?;
        Ok(())
    }
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> HashMap<Uuid, T> {
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(collection) => collection,
            Err(err) => {
                warn!("Unreadable collection {}: {err}; starting empty", path.display());
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}

fn store_collection<T: Serialize>(path: &Path, collection: &HashMap<Uuid, T>) -> MarketResult<()> {
    let raw = serde_json::to_string_pretty(collection)?;
    // Write-then-rename so a crash mid-write never truncates the collection
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
