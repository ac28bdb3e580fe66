//! Shared machinery for the panel's command flows: actor gating, target
//! resolution, input validation and the fire-and-forget side channels.
//! Every command goes through these so the checks stay authoritative and
//! identically ordered across modules.

use chrono::{DateTime, Utc};

use permissions::Gate;
use tribunalcore_rs::ids::{RoleId, UserId};
use tribunalcore_rs::utils::parse_duration_string_to_chrono_duration;

use crate::data::Data;
use crate::platform::{AuditEvent, ResolvedMember};
use crate::punishments::MAX_REASON_LENGTH;
use crate::types::ActionError;

/// Resolve the acting member and hold them against `gate`, immediately
/// before mutating anything. The UI may have already gated the button
/// speculatively; this check is the one that counts.
pub async fn require_gate(
    data: &Data,
    actor: UserId,
    gate: Gate,
) -> Result<ResolvedMember, ActionError> {
    let member = data
        .platform
        .resolve_member(actor)
        .await
        .map_err(|e| external("resolve member roles", e))?;

    // An unresolvable actor holds no roles and passes no gate
    let Some(member) = member else {
        return Err(ActionError::PermissionDenied {
            required: gate.describe().to_string(),
        });
    };

    if !permissions::meets_gate(&data.config, &member.roles, gate) {
        return Err(ActionError::PermissionDenied {
            required: gate.describe().to_string(),
        });
    }

    Ok(member)
}

/// Resolve the member an action targets. Targets must be present: roles
/// can only be granted or stripped on current members.
pub async fn resolve_target(data: &Data, subject: UserId) -> Result<ResolvedMember, ActionError> {
    match data.platform.resolve_member(subject).await {
        Ok(Some(member)) => Ok(member),
        Ok(None) => Err(ActionError::NotFound {
            what: format!("Member {} was not found", subject),
        }),
        Err(e) => Err(external("resolve member", e)),
    }
}

/// Reject an empty or oversized operator text field before anything
/// durable happens. Lengths count characters, not bytes, since most
/// input is Cyrillic.
pub fn validate_text(field: &str, value: &str, max: usize) -> Result<(), ActionError> {
    if value.trim().is_empty() {
        return Err(ActionError::Conflict {
            message: format!("A {} is required", field),
        });
    }

    if value.chars().count() > max {
        return Err(ActionError::Conflict {
            message: format!("The {} must be at most {} characters", field, max),
        });
    }

    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<(), ActionError> {
    validate_text("reason", reason, MAX_REASON_LENGTH)
}

/// Parse an operator-supplied duration shorthand ("30m", "2 days") into
/// an absolute expiry. A missing or blank duration means indefinite.
pub fn parse_expiry(duration: Option<&str>) -> Result<Option<DateTime<Utc>>, ActionError> {
    let Some(raw) = duration else {
        return Ok(None);
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let duration =
        parse_duration_string_to_chrono_duration(raw).map_err(|e| ActionError::Conflict {
            message: e.to_string(),
        })?;

    Ok(Some(Utc::now() + duration))
}

/// The platform role behind a config role-tag. Feature tags are not
/// validated at load, so a hole in the mapping surfaces here.
pub fn entitlement_role(config: &config::Config, tag: &str) -> Result<RoleId, ActionError> {
    config
        .role(tag)
        .ok_or_else(|| ActionError::Configuration {
            missing: format!("role '{}'", tag),
        })
}

/// Map a failed platform call into the operator-facing error.
pub fn external(action: &str, e: crate::Error) -> ActionError {
    ActionError::ExternalActionFailed {
        action: action.to_string(),
        error: e.to_string(),
    }
}

/// DM the subject. Closed DMs are common and never fail the action.
pub async fn notify_subject(data: &Data, subject: UserId, message: &str) {
    if let Err(e) = data.platform.notify(subject, message).await {
        log::warn!("Failed to notify {}: {}", subject, e);
    }
}

/// Record an audit event. A broken log channel never blocks moderation.
pub async fn dispatch_audit(data: &Data, event: AuditEvent) {
    let kind = event.kind;

    if let Err(e) = data.audit.log(event).await {
        log::warn!("Failed to dispatch '{}' audit event: {}", kind, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("spam in general").is_ok());

        // Blank and whitespace-only reasons are rejected
        assert_eq!(validate_reason("").unwrap_err().code(), "conflict");
        assert_eq!(validate_reason("   ").unwrap_err().code(), "conflict");

        // Length counts characters, so 500 Cyrillic characters pass
        let cyrillic = "ж".repeat(MAX_REASON_LENGTH);
        assert!(validate_reason(&cyrillic).is_ok());
        let too_long = "ж".repeat(MAX_REASON_LENGTH + 1);
        assert_eq!(validate_reason(&too_long).unwrap_err().code(), "conflict");
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry(None).unwrap(), None);
        assert_eq!(parse_expiry(Some("")).unwrap(), None);
        assert_eq!(parse_expiry(Some("  ")).unwrap(), None);

        let before = Utc::now() + chrono::Duration::hours(2);
        let expiry = parse_expiry(Some("2h")).unwrap().unwrap();
        let after = Utc::now() + chrono::Duration::hours(2);
        assert!(expiry >= before && expiry <= after);

        assert_eq!(parse_expiry(Some("junk")).unwrap_err().code(), "conflict");
        assert_eq!(parse_expiry(Some("0m")).unwrap_err().code(), "conflict");
    }

    #[test]
    fn test_entitlement_role() {
        let config = config::Config::from_yaml(
            r#"
appeal_queues:
  ban: 900
  nedopusk: 901
roles:
  owner: 1
  developer: 2
  admin: 3
  admin_branch: 4
  curator: 5
  moderator: 6
  support: 7
  control: 8
  ban: 9
  mute_text: 10
  mute_voice: 11
  nedopusk: 12
  unverified: 13
"#,
        )
        .unwrap();

        assert_eq!(
            entitlement_role(&config, "ban").unwrap(),
            RoleId::new(9)
        );

        let err = entitlement_role(&config, "warn_support").unwrap_err();
        assert_eq!(err.code(), "configuration");
    }
}
