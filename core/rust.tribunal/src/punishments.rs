use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use tribunalcore_rs::ids::{RoleId, UserId};

/// Hard cap on operator-supplied reasons.
pub const MAX_REASON_LENGTH: usize = 500;

/// A staff branch a reprimand or blacklist can be scoped to. "Common"
/// covers the whole staff and is only valid for blacklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffBranch {
    Support,
    Moderator,
    Control,
    Admin,
    Common,
}

impl StaffBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffBranch::Support => "support",
            StaffBranch::Moderator => "moderator",
            StaffBranch::Control => "control",
            StaffBranch::Admin => "admin",
            StaffBranch::Common => "common",
        }
    }
}

impl std::fmt::Display for StaffBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StaffBranch {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "support" => Ok(StaffBranch::Support),
            "moderator" => Ok(StaffBranch::Moderator),
            "control" => Ok(StaffBranch::Control),
            "admin" => Ok(StaffBranch::Admin),
            "common" => Ok(StaffBranch::Common),
            _ => Err(format!("Invalid staff branch: {}", s).into()),
        }
    }
}

/// Every punishment the panel can hand out.
///
/// The string form is what the ledger stores, and it doubles as the base
/// of the config role-tag lookup for the backing entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PunishmentCategory {
    /// Full removal from the community (the ban role strips everything else).
    Ban,
    /// Text channel mute.
    MuteText,
    /// Voice channel mute.
    MuteVoice,
    /// Staff suspension ("otstranenie").
    Suspension,
    /// A remark on record; the mildest sanction.
    Remark,
    /// Access denial for unverified members.
    Nedopusk,
    /// Warning issued to a regular member.
    SupportWarn,
    /// Warning issued to a member holding the moderator tag.
    ModeratorWarn,
    /// Formal staff reprimand, scoped to a branch (never "common").
    Reprimand(StaffBranch),
    /// Staff blacklist ("chs"), scoped to a branch.
    Blacklist(StaffBranch),
}

impl PunishmentCategory {
    /// The config role-tag whose platform role backs this punishment.
    ///
    /// Warns and reprimands share the per-branch warn roles; suspension
    /// uses the legacy "ostranenie" tag.
    pub fn role_tag(&self) -> String {
        match self {
            PunishmentCategory::Ban => "ban".to_string(),
            PunishmentCategory::MuteText => "mute_text".to_string(),
            PunishmentCategory::MuteVoice => "mute_voice".to_string(),
            PunishmentCategory::Suspension => "ostranenie".to_string(),
            PunishmentCategory::Remark => "remark".to_string(),
            PunishmentCategory::Nedopusk => "nedopusk".to_string(),
            PunishmentCategory::SupportWarn => "warn_support".to_string(),
            PunishmentCategory::ModeratorWarn => "warn_moderator".to_string(),
            PunishmentCategory::Reprimand(branch) => format!("warn_{}", branch),
            PunishmentCategory::Blacklist(branch) => format!("chs_{}", branch),
        }
    }

    /// Human label used in member-facing messages.
    pub fn describe(&self) -> &'static str {
        match self {
            PunishmentCategory::Ban => "ban",
            PunishmentCategory::MuteText => "text mute",
            PunishmentCategory::MuteVoice => "voice mute",
            PunishmentCategory::Suspension => "suspension",
            PunishmentCategory::Remark => "remark",
            PunishmentCategory::Nedopusk => "nedopusk",
            PunishmentCategory::SupportWarn | PunishmentCategory::ModeratorWarn => "warning",
            PunishmentCategory::Reprimand(_) => "reprimand",
            PunishmentCategory::Blacklist(_) => "staff blacklist",
        }
    }

    /// The access tier required to hand out or lift this punishment.
    pub fn required_gate(&self) -> permissions::Gate {
        match self {
            PunishmentCategory::Ban
            | PunishmentCategory::MuteText
            | PunishmentCategory::MuteVoice
            | PunishmentCategory::Remark
            | PunishmentCategory::SupportWarn
            | PunishmentCategory::ModeratorWarn => permissions::Gate::Moderator,
            PunishmentCategory::Suspension
            | PunishmentCategory::Reprimand(_)
            | PunishmentCategory::Blacklist(_) => permissions::Gate::FullAccess,
            PunishmentCategory::Nedopusk => permissions::Gate::Support,
        }
    }
}

impl std::fmt::Display for PunishmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PunishmentCategory::Ban => write!(f, "ban"),
            PunishmentCategory::MuteText => write!(f, "mute_text"),
            PunishmentCategory::MuteVoice => write!(f, "mute_voice"),
            PunishmentCategory::Suspension => write!(f, "suspension"),
            PunishmentCategory::Remark => write!(f, "remark"),
            PunishmentCategory::Nedopusk => write!(f, "nedopusk"),
            PunishmentCategory::SupportWarn => write!(f, "support_warn"),
            PunishmentCategory::ModeratorWarn => write!(f, "moderator_warn"),
            PunishmentCategory::Reprimand(branch) => write!(f, "reprimand_{}", branch),
            PunishmentCategory::Blacklist(branch) => write!(f, "chs_{}", branch),
        }
    }
}

impl std::str::FromStr for PunishmentCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(PunishmentCategory::Ban),
            "mute_text" => Ok(PunishmentCategory::MuteText),
            "mute_voice" => Ok(PunishmentCategory::MuteVoice),
            "suspension" => Ok(PunishmentCategory::Suspension),
            "remark" => Ok(PunishmentCategory::Remark),
            "nedopusk" => Ok(PunishmentCategory::Nedopusk),
            "support_warn" => Ok(PunishmentCategory::SupportWarn),
            "moderator_warn" => Ok(PunishmentCategory::ModeratorWarn),
            _ => {
                if let Some(branch) = s.strip_prefix("reprimand_") {
                    let branch = StaffBranch::from_str(branch)?;

                    if branch == StaffBranch::Common {
                        return Err("Reprimands cannot target the common branch".into());
                    }

                    Ok(PunishmentCategory::Reprimand(branch))
                } else if let Some(branch) = s.strip_prefix("chs_") {
                    Ok(PunishmentCategory::Blacklist(StaffBranch::from_str(
                        branch,
                    )?))
                } else {
                    Err(format!("Invalid punishment category: {}", s).into())
                }
            }
        }
    }
}

// Serde impls for PunishmentCategory
impl Serialize for PunishmentCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for PunishmentCategory {
    fn deserialize<D>(deserializer: D) -> Result<PunishmentCategory, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PunishmentCategory::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Category families the lift flows select by. Lifting acts on "the
/// first mute" or "the first warn-family record" rather than an exact
/// category, since the operator never sees record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryClass {
    /// mute_text | mute_voice
    Mute,
    /// support_warn | moderator_warn
    Warn,
    /// reprimand_*
    Reprimand,
    /// chs_*
    Blacklist,
}

impl CategoryClass {
    pub fn matches(&self, category: &PunishmentCategory) -> bool {
        match self {
            CategoryClass::Mute => matches!(
                category,
                PunishmentCategory::MuteText | PunishmentCategory::MuteVoice
            ),
            CategoryClass::Warn => matches!(
                category,
                PunishmentCategory::SupportWarn | PunishmentCategory::ModeratorWarn
            ),
            CategoryClass::Reprimand => matches!(category, PunishmentCategory::Reprimand(_)),
            CategoryClass::Blacklist => matches!(category, PunishmentCategory::Blacklist(_)),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CategoryClass::Mute => "mute",
            CategoryClass::Warn => "warning",
            CategoryClass::Reprimand => "reprimand",
            CategoryClass::Blacklist => "staff blacklist",
        }
    }
}

/// A single ledger entry.
///
/// A record is "active" purely by existing. Expiry does not deactivate
/// it; the sweeper deletes it, and until then it still blocks duplicate
/// grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunishmentRecord {
    /// The record ID
    pub id: uuid::Uuid,
    /// The punished member
    pub subject: UserId,
    /// What was handed out
    pub category: PunishmentCategory,
    /// The platform role that materializes the punishment
    pub entitlement: RoleId,
    /// Operator-supplied reason
    pub reason: String,
    /// Who issued it; legacy records may not know
    pub issuer: Option<UserId>,
    /// When it was issued
    pub issued_at: DateTime<Utc>,
    /// When it lapses; None means indefinite
    pub expires_at: Option<DateTime<Utc>>,
}

impl PunishmentRecord {
    /// Expiry is inclusive: a record lapsing exactly now is expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| t <= now)
    }

    /// One-line audit rendering used when a punishment is lifted.
    pub fn to_log_format(&self) -> String {
        format!(
            "{} | Handled '{}' for reason '{}'",
            self.subject, self.category, self.reason
        )
    }
}

/// Data required to append a record; the store assigns `id` and
/// `issued_at`.
#[derive(Debug, Clone)]
pub struct PunishmentCreate {
    /// The punished member
    pub subject: UserId,
    /// What is being handed out
    pub category: PunishmentCategory,
    /// The platform role that materializes the punishment
    pub entitlement: RoleId,
    /// Operator-supplied reason
    pub reason: String,
    /// Who issued it
    pub issuer: Option<UserId>,
    /// When it lapses; None means indefinite
    pub expires_at: Option<DateTime<Utc>>,
}

impl PunishmentCreate {
    pub fn into_record(self) -> PunishmentRecord {
        PunishmentRecord {
            id: uuid::Uuid::new_v4(),
            subject: self.subject,
            category: self.category,
            entitlement: self.entitlement,
            reason: self.reason,
            issuer: self.issuer,
            issued_at: Utc::now(),
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_string_roundtrip() {
        let categories = [
            PunishmentCategory::Ban,
            PunishmentCategory::MuteText,
            PunishmentCategory::MuteVoice,
            PunishmentCategory::Suspension,
            PunishmentCategory::Remark,
            PunishmentCategory::Nedopusk,
            PunishmentCategory::SupportWarn,
            PunishmentCategory::ModeratorWarn,
            PunishmentCategory::Reprimand(StaffBranch::Support),
            PunishmentCategory::Blacklist(StaffBranch::Common),
        ];

        for category in categories {
            let s = category.to_string();
            assert_eq!(PunishmentCategory::from_str(&s).unwrap(), category);
        }

        assert_eq!(
            PunishmentCategory::Reprimand(StaffBranch::Admin).to_string(),
            "reprimand_admin"
        );
        assert_eq!(
            PunishmentCategory::Blacklist(StaffBranch::Common).to_string(),
            "chs_common"
        );
    }

    #[test]
    fn test_category_rejects_invalid_strings() {
        assert!(PunishmentCategory::from_str("reprimand_common").is_err());
        assert!(PunishmentCategory::from_str("reprimand_nosuch").is_err());
        assert!(PunishmentCategory::from_str("chs_").is_err());
        assert!(PunishmentCategory::from_str("exile").is_err());
    }

    #[test]
    fn test_role_tags() {
        // Warns and reprimands share the branch warn roles
        assert_eq!(PunishmentCategory::SupportWarn.role_tag(), "warn_support");
        assert_eq!(
            PunishmentCategory::Reprimand(StaffBranch::Support).role_tag(),
            "warn_support"
        );
        assert_eq!(PunishmentCategory::Suspension.role_tag(), "ostranenie");
        assert_eq!(
            PunishmentCategory::Blacklist(StaffBranch::Common).role_tag(),
            "chs_common"
        );
    }

    #[test]
    fn test_category_serde_is_string_form() {
        let json = serde_json::to_string(&PunishmentCategory::MuteText).unwrap();
        assert_eq!(json, "\"mute_text\"");

        let back: PunishmentCategory = serde_json::from_str("\"reprimand_admin\"").unwrap();
        assert_eq!(back, PunishmentCategory::Reprimand(StaffBranch::Admin));
    }

    #[test]
    fn test_class_matching() {
        assert!(CategoryClass::Mute.matches(&PunishmentCategory::MuteVoice));
        assert!(!CategoryClass::Mute.matches(&PunishmentCategory::Ban));
        assert!(CategoryClass::Warn.matches(&PunishmentCategory::ModeratorWarn));
        assert!(!CategoryClass::Warn.matches(&PunishmentCategory::Reprimand(StaffBranch::Support)));
        assert!(CategoryClass::Reprimand.matches(&PunishmentCategory::Reprimand(
            StaffBranch::Control
        )));
        assert!(CategoryClass::Blacklist.matches(&PunishmentCategory::Blacklist(
            StaffBranch::Common
        )));
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let record = PunishmentCreate {
            subject: UserId::new(1),
            category: PunishmentCategory::MuteText,
            entitlement: RoleId::new(2),
            reason: "spam".to_string(),
            issuer: Some(UserId::new(3)),
            expires_at: Some(now),
        }
        .into_record();

        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - chrono::Duration::seconds(1)));

        let indefinite = PunishmentCreate {
            subject: UserId::new(1),
            category: PunishmentCategory::Ban,
            entitlement: RoleId::new(4),
            reason: "raid".to_string(),
            issuer: None,
            expires_at: None,
        }
        .into_record();

        assert!(!indefinite.is_expired(now + chrono::Duration::days(365)));
    }
}
