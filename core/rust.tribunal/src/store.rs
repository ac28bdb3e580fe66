use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use tribunalcore_rs::ids::{RoleId, UserId};

use crate::punishments::{CategoryClass, PunishmentCategory, PunishmentCreate, PunishmentRecord};
use crate::types::ActionError;

/// The persisted ledger document: subject id -> records in insertion
/// order. Keys serialize as strings (JSON object keys).
pub type PunishmentDoc = BTreeMap<UserId, Vec<PunishmentRecord>>;

/// Whole-document punishment store.
///
/// Every operation is a full load of the JSON document; every mutation is
/// load -> mutate -> rewrite inside one critical section, so an operator
/// action and a sweep cycle can never interleave into a lost update.
/// Network I/O must stay outside the lock; the store itself only touches
/// the local file.
pub struct PunishmentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PunishmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Read the current document. A missing file is an empty ledger; a
    /// corrupt one is logged and treated as empty until the next
    /// successful mutation rewrites it.
    async fn load(&self) -> PunishmentDoc {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PunishmentDoc::new(),
            Err(e) => {
                log::error!(
                    "Failed to read punishment store {}: {}",
                    self.path.display(),
                    e
                );
                return PunishmentDoc::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                log::error!(
                    "Punishment store {} is corrupt, treating it as empty: {}",
                    self.path.display(),
                    e
                );
                PunishmentDoc::new()
            }
        }
    }

    async fn persist(&self, doc: &PunishmentDoc) -> Result<(), ActionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(internal)?;
        }

        let bytes = serde_json::to_vec_pretty(doc).map_err(internal)?;
        tokio::fs::write(&self.path, bytes).await.map_err(internal)?;

        Ok(())
    }

    /// Durably append a record. At most one record may exist per
    /// (subject, entitlement) pair; flows pre-check to fail cheaply, the
    /// store enforces it under the lock so racing grants cannot slip a
    /// second one in.
    pub async fn grant(&self, create: PunishmentCreate) -> Result<PunishmentRecord, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        let records = doc.entry(create.subject).or_default();

        if records.iter().any(|r| r.entitlement == create.entitlement) {
            return Err(ActionError::Conflict {
                message: format!(
                    "{} already has an active '{}' punishment",
                    create.subject, create.category
                ),
            });
        }

        let record = create.into_record();
        records.push(record.clone());

        self.persist(&doc).await?;

        Ok(record)
    }

    /// Delete every record granting `entitlement` to `subject`. Removal
    /// is total deletion, never a voided flag. The subject key goes away
    /// with its last record. Returns whether anything was removed.
    pub async fn revoke(&self, subject: UserId, entitlement: RoleId) -> Result<bool, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        let Some(records) = doc.get_mut(&subject) else {
            return Ok(false);
        };

        let before = records.len();
        records.retain(|r| r.entitlement != entitlement);
        let removed = records.len() != before;

        if records.is_empty() {
            doc.remove(&subject);
        }

        if removed {
            self.persist(&doc).await?;
        }

        Ok(removed)
    }

    /// Existence test for a (subject, entitlement) pair. Deliberately
    /// expiry-unaware: an expired-but-unswept record still counts.
    pub async fn is_active(&self, subject: UserId, entitlement: RoleId) -> bool {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        doc.get(&subject)
            .is_some_and(|records| records.iter().any(|r| r.entitlement == entitlement))
    }

    /// The record behind a specific entitlement grant, if any.
    pub async fn find_by_entitlement(
        &self,
        subject: UserId,
        entitlement: RoleId,
    ) -> Option<PunishmentRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        doc.get(&subject)?
            .iter()
            .find(|r| r.entitlement == entitlement)
            .cloned()
    }

    /// Best-effort "the first record of this class", in insertion order.
    /// Lift flows act on one record at a time and use this to pick it.
    pub async fn find_first(
        &self,
        subject: UserId,
        class: CategoryClass,
    ) -> Option<PunishmentRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        doc.get(&subject)?
            .iter()
            .find(|r| class.matches(&r.category))
            .cloned()
    }

    /// Number of records held against a subject, optionally restricted to
    /// one category.
    pub async fn count_for(&self, subject: UserId, category: Option<&PunishmentCategory>) -> usize {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        match doc.get(&subject) {
            Some(records) => match category {
                Some(category) => records.iter().filter(|r| &r.category == category).count(),
                None => records.len(),
            },
            None => 0,
        }
    }

    /// Most-recent-first history, at most `limit` records.
    pub async fn history(&self, subject: UserId, limit: usize) -> Vec<PunishmentRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        match doc.get(&subject) {
            Some(records) => records.iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Remove and return every record whose expiry has passed. One
    /// rewrite per call, and only when something actually expired. The
    /// sweeper performs its external side effects AFTER this returns,
    /// outside the lock.
    pub async fn take_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PunishmentRecord>, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        let mut expired = Vec::new();

        doc.retain(|_, records| {
            records.retain(|r| {
                if r.is_expired(now) {
                    expired.push(r.clone());
                    false
                } else {
                    true
                }
            });

            !records.is_empty()
        });

        if !expired.is_empty() {
            self.persist(&doc).await?;
        }

        Ok(expired)
    }
}

fn internal(e: impl std::fmt::Display) -> ActionError {
    ActionError::InternalError {
        error: e.to_string(),
    }
}
