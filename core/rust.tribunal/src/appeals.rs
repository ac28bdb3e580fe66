use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::Mutex;

use tribunalcore_rs::ids::UserId;

use crate::punishments::{PunishmentCategory, PunishmentRecord};
use crate::types::ActionError;

/// How long a rejected appellant waits before submitting again.
pub const REJECTION_COOLDOWN_DAYS: i64 = 7;

/// Hard cap on the required evidence text.
pub const MAX_EVIDENCE_LENGTH: usize = 1000;

/// Hard cap on the optional extra-information text.
pub const MAX_EXTRA_INFO_LENGTH: usize = 500;

/// What a member can appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppealKind {
    Ban,
    Nedopusk,
}

impl AppealKind {
    /// The punishment category this kind of appeal contests.
    pub fn category(&self) -> PunishmentCategory {
        match self {
            AppealKind::Ban => PunishmentCategory::Ban,
            AppealKind::Nedopusk => PunishmentCategory::Nedopusk,
        }
    }
}

impl std::fmt::Display for AppealKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppealKind::Ban => write!(f, "ban"),
            AppealKind::Nedopusk => write!(f, "nedopusk"),
        }
    }
}

impl std::str::FromStr for AppealKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(AppealKind::Ban),
            "nedopusk" => Ok(AppealKind::Nedopusk),
            _ => Err(format!("Invalid appeal kind: {}", s).into()),
        }
    }
}

// Serde impls for AppealKind
impl Serialize for AppealKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for AppealKind {
    fn deserialize<D>(deserializer: D) -> Result<AppealKind, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AppealKind::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Appeal lifecycle. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppealStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppealStatus::Pending => write!(f, "pending"),
            AppealStatus::Approved => write!(f, "approved"),
            AppealStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for AppealStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppealStatus::Pending),
            "approved" => Ok(AppealStatus::Approved),
            "rejected" => Ok(AppealStatus::Rejected),
            _ => Err(format!("Invalid appeal status: {}", s).into()),
        }
    }
}

// Serde impls for AppealStatus
impl Serialize for AppealStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for AppealStatus {
    fn deserialize<D>(deserializer: D) -> Result<AppealStatus, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AppealStatus::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The terminal verdicts a reviewer can hand down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealVerdict {
    Approved,
    Rejected,
}

impl AppealVerdict {
    pub fn status(self) -> AppealStatus {
        match self {
            AppealVerdict::Approved => AppealStatus::Approved,
            AppealVerdict::Rejected => AppealStatus::Rejected,
        }
    }
}

/// Snapshot of the appealed ledger record taken at submission time.
///
/// The record may be deleted or rewritten while the appeal sits in the
/// queue, and legacy records predate issuer tracking, so everything here
/// is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealContext {
    /// Who issued the appealed punishment, when known
    pub issuer: Option<UserId>,
    /// The reason it was issued with
    pub reason: String,
    /// When it was issued
    pub issued_at: DateTime<Utc>,
}

impl AppealContext {
    pub fn from_record(record: &PunishmentRecord) -> Self {
        Self {
            issuer: record.issuer,
            reason: record.reason.clone(),
            issued_at: record.issued_at,
        }
    }

    /// Issuer line for queue embeds; legacy records have no issuer.
    pub fn issuer_display(&self) -> String {
        match self.issuer {
            Some(id) => id.to_string(),
            None => "not found".to_string(),
        }
    }
}

/// A filed appeal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealRecord {
    /// Globally monotonic appeal number
    pub number: u64,
    /// The appellant
    pub subject: UserId,
    /// What is being appealed
    pub kind: AppealKind,
    /// Required evidence text
    pub evidence: String,
    /// Optional extra information
    pub extra_info: Option<String>,
    /// Lifecycle state
    pub status: AppealStatus,
    /// Who decided it, once terminal
    pub decided_by: Option<UserId>,
    /// The decision reason, once terminal
    pub decision_reason: Option<String>,
    /// When it was filed
    pub submitted_at: DateTime<Utc>,
    /// Ledger context captured at submission, when available
    pub context: Option<AppealContext>,
}

/// Data required to file an appeal; the store assigns the number.
#[derive(Debug, Clone)]
pub struct AppealCreate {
    pub subject: UserId,
    pub kind: AppealKind,
    pub evidence: String,
    pub extra_info: Option<String>,
    pub context: Option<AppealContext>,
}

/// The persisted appeals document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppealsDoc {
    /// Monotonic counter behind appeal numbers
    #[serde(default)]
    pub counter: u64,
    /// Every appeal ever filed, in submission order
    #[serde(default)]
    pub appeals: Vec<AppealRecord>,
    /// Re-submission cooldowns: subject -> kind -> expiry
    #[serde(default)]
    pub cooldowns: BTreeMap<UserId, BTreeMap<AppealKind, DateTime<Utc>>>,
}

/// Whole-document appeal store, same discipline as the punishment store:
/// load -> mutate -> rewrite under one lock, no network inside it.
pub struct AppealStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AppealStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> AppealsDoc {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppealsDoc::default(),
            Err(e) => {
                log::error!("Failed to read appeal store {}: {}", self.path.display(), e);
                return AppealsDoc::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                log::error!(
                    "Appeal store {} is corrupt, treating it as empty: {}",
                    self.path.display(),
                    e
                );
                AppealsDoc::default()
            }
        }
    }

    async fn persist(&self, doc: &AppealsDoc) -> Result<(), ActionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(internal)?;
        }

        let bytes = serde_json::to_vec_pretty(doc).map_err(internal)?;
        tokio::fs::write(&self.path, bytes).await.map_err(internal)?;

        Ok(())
    }

    /// File a new appeal under the next number in the global sequence.
    pub async fn submit(&self, create: AppealCreate) -> Result<AppealRecord, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        doc.counter += 1;

        let record = AppealRecord {
            number: doc.counter,
            subject: create.subject,
            kind: create.kind,
            evidence: create.evidence,
            extra_info: create.extra_info,
            status: AppealStatus::Pending,
            decided_by: None,
            decision_reason: None,
            submitted_at: Utc::now(),
            context: create.context,
        };

        doc.appeals.push(record.clone());
        self.persist(&doc).await?;

        Ok(record)
    }

    pub async fn get(&self, number: u64) -> Option<AppealRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        doc.appeals.iter().find(|a| a.number == number).cloned()
    }

    /// Pending appeals filed by a subject, in submission order.
    pub async fn pending_for(&self, subject: UserId) -> Vec<AppealRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await;

        doc.appeals
            .iter()
            .filter(|a| a.subject == subject && a.status == AppealStatus::Pending)
            .cloned()
            .collect()
    }

    /// Terminalize a pending appeal. Deciding an unknown appeal is
    /// NotFound; deciding one twice is a Conflict, checked under the
    /// lock so two racing reviewers cannot both win.
    pub async fn decide(
        &self,
        number: u64,
        verdict: AppealVerdict,
        decided_by: UserId,
        reason: &str,
    ) -> Result<AppealRecord, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        let Some(appeal) = doc.appeals.iter_mut().find(|a| a.number == number) else {
            return Err(ActionError::NotFound {
                what: format!("Appeal #{} was not found", number),
            });
        };

        if appeal.status != AppealStatus::Pending {
            return Err(ActionError::Conflict {
                message: format!(
                    "Appeal #{} has already been {}",
                    number, appeal.status
                ),
            });
        }

        appeal.status = verdict.status();
        appeal.decided_by = Some(decided_by);
        appeal.decision_reason = Some(reason.to_string());

        let decided = appeal.clone();
        self.persist(&doc).await?;

        Ok(decided)
    }

    /// The active re-submission cooldown for (subject, kind), if any.
    /// Expired entries are cleaned up as they are seen.
    pub async fn active_cooldown(
        &self,
        subject: UserId,
        kind: AppealKind,
    ) -> Result<Option<DateTime<Utc>>, ActionError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        let until = doc
            .cooldowns
            .get(&subject)
            .and_then(|kinds| kinds.get(&kind))
            .copied();

        match until {
            None => Ok(None),
            Some(until) if until > Utc::now() => Ok(Some(until)),
            Some(_) => {
                if let Some(kinds) = doc.cooldowns.get_mut(&subject) {
                    kinds.remove(&kind);
                    if kinds.is_empty() {
                        doc.cooldowns.remove(&subject);
                    }
                }
                self.persist(&doc).await?;
                Ok(None)
            }
        }
    }

    /// Start the fixed rejection cooldown for (subject, kind). Returns
    /// when it lapses.
    pub async fn set_cooldown(
        &self,
        subject: UserId,
        kind: AppealKind,
    ) -> Result<DateTime<Utc>, ActionError> {
        let until = Utc::now() + Duration::days(REJECTION_COOLDOWN_DAYS);

        let _guard = self.lock.lock().await;
        let mut doc = self.load().await;

        doc.cooldowns.entry(subject).or_default().insert(kind, until);
        self.persist(&doc).await?;

        Ok(until)
    }
}

fn internal(e: impl std::fmt::Display) -> ActionError {
    ActionError::InternalError {
        error: e.to_string(),
    }
}
