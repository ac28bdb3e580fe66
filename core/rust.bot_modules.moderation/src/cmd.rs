use super::core::{lifted_dm, punished_dm, warn_category_for, Gender, MuteKind};
use chrono::{DateTime, Utc};
use indexmap::indexmap;

use permissions::Gate;
use tribunal::data::Data;
use tribunal::ops;
use tribunal::platform::{AuditEvent, ResolvedMember};
use tribunal::punishments::{
    CategoryClass, PunishmentCategory, PunishmentCreate, PunishmentRecord, StaffBranch,
};
use tribunal::types::ActionError;
use tribunalcore_rs::ids::{RoleId, UserId};

/// How many records the history panel shows.
pub const HISTORY_LIMIT: usize = 10;

// Cheap duplicate check before touching the platform. The store repeats
// it under its lock, so a racing grant still cannot slip through.
async fn ensure_not_active(
    data: &Data,
    subject: UserId,
    entitlement: RoleId,
    category: &PunishmentCategory,
) -> Result<(), ActionError> {
    if data.punishments.is_active(subject, entitlement).await {
        return Err(ActionError::Conflict {
            message: format!(
                "{} already has an active '{}' punishment",
                subject, category
            ),
        });
    }

    Ok(())
}

// Shared grant flow: entitlement role first, ledger second, then the
// best-effort side channels. A platform failure aborts before the ledger
// is touched; a failed DM or audit post never fails the action.
async fn grant_punishment(
    data: &Data,
    actor: UserId,
    target: &ResolvedMember,
    category: PunishmentCategory,
    reason: &str,
    expires_at: Option<DateTime<Utc>>,
    kind: &'static str,
    fields: indexmap::IndexMap<String, String>,
) -> Result<PunishmentRecord, ActionError> {
    let entitlement = ops::entitlement_role(&data.config, &category.role_tag())?;

    ensure_not_active(data, target.user_id, entitlement, &category).await?;

    data.platform
        .grant_role(target.user_id, entitlement, reason)
        .await
        .map_err(|e| ops::external("grant punishment role", e))?;

    let record = data
        .punishments
        .grant(PunishmentCreate {
            subject: target.user_id,
            category,
            entitlement,
            reason: reason.to_string(),
            issuer: Some(actor),
            expires_at,
        })
        .await?;

    ops::notify_subject(
        data,
        target.user_id,
        &punished_dm(record.category.describe(), reason, expires_at),
    )
    .await;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind,
            actor: Some(actor),
            subject: target.user_id,
            reason: reason.to_string(),
            expires_at,
            fields,
        },
    )
    .await;

    Ok(record)
}

// Shared lift flow for a record the caller already located.
async fn lift_punishment(
    data: &Data,
    actor: UserId,
    target: &ResolvedMember,
    record: PunishmentRecord,
    reason: &str,
    kind: &'static str,
) -> Result<PunishmentRecord, ActionError> {
    data.platform
        .revoke_role(target.user_id, record.entitlement, reason)
        .await
        .map_err(|e| ops::external("revoke punishment role", e))?;

    data.punishments
        .revoke(target.user_id, record.entitlement)
        .await?;

    ops::notify_subject(
        data,
        target.user_id,
        &lifted_dm(record.category.describe(), reason),
    )
    .await;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind,
            actor: Some(actor),
            subject: target.user_id,
            reason: reason.to_string(),
            expires_at: None,
            fields: indexmap! {
                "record".to_string() => record.to_log_format(),
            },
        },
    )
    .await;

    Ok(record)
}

/// Ban a member, optionally for a limited time.
pub async fn ban(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
    duration: Option<&str>,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;
    let expires_at = ops::parse_expiry(duration)?;

    grant_punishment(
        data,
        actor,
        &target,
        PunishmentCategory::Ban,
        reason,
        expires_at,
        "ban",
        indexmap! {},
    )
    .await
}

/// Lift a ban.
pub async fn unban(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let entitlement = ops::entitlement_role(&data.config, "ban")?;
    let Some(record) = data.punishments.find_by_entitlement(subject, entitlement).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active ban", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unban").await
}

/// Mute a member in one channel family, optionally for a limited time.
pub async fn mute(
    data: &Data,
    actor: UserId,
    subject: UserId,
    kind: MuteKind,
    reason: &str,
    duration: Option<&str>,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;
    let expires_at = ops::parse_expiry(duration)?;

    grant_punishment(
        data,
        actor,
        &target,
        kind.category(),
        reason,
        expires_at,
        "mute",
        indexmap! {
            "kind".to_string() => kind.describe().to_string(),
        },
    )
    .await
}

/// Lift the member's first mute, whichever channel family it is.
pub async fn unmute(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let Some(record) = data.punishments.find_first(subject, CategoryClass::Mute).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active mute", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unmute").await
}

/// Warn a member, picking the tier from the target's own roles.
pub async fn warn(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let category = warn_category_for(&data.config, &target.roles);

    grant_punishment(data, actor, &target, category, reason, None, "warn", indexmap! {}).await
}

/// Lift the member's first warning.
pub async fn unwarn(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let Some(record) = data.punishments.find_first(subject, CategoryClass::Warn).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active warning", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unwarn").await
}

/// Put a remark on a member's record.
pub async fn remark(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    grant_punishment(
        data,
        actor,
        &target,
        PunishmentCategory::Remark,
        reason,
        None,
        "remark",
        indexmap! {},
    )
    .await
}

/// Lift a remark.
pub async fn unremark(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Moderator).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let entitlement = ops::entitlement_role(&data.config, "remark")?;
    let Some(record) = data.punishments.find_by_entitlement(subject, entitlement).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active remark", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unremark").await
}

/// Suspend a staff member from their duties, optionally for a limited
/// time. Administrators only.
pub async fn suspend(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
    duration: Option<&str>,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;
    let expires_at = ops::parse_expiry(duration)?;

    grant_punishment(
        data,
        actor,
        &target,
        PunishmentCategory::Suspension,
        reason,
        expires_at,
        "suspension",
        indexmap! {},
    )
    .await
}

/// Lift a suspension. Administrators only.
pub async fn unsuspend(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let entitlement =
        ops::entitlement_role(&data.config, &PunishmentCategory::Suspension.role_tag())?;
    let Some(record) = data.punishments.find_by_entitlement(subject, entitlement).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active suspension", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unsuspension").await
}

/// Deny an unverified member access pending review. The unverified
/// baseline role is swapped for the nedopusk entitlement.
pub async fn nedopusk(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Support).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let unverified = ops::entitlement_role(&data.config, "unverified")?;
    if !target.has_role(unverified) {
        return Err(ActionError::Conflict {
            message: "Access denial can only be issued to an unverified member".to_string(),
        });
    }

    let category = PunishmentCategory::Nedopusk;
    let entitlement = ops::entitlement_role(&data.config, &category.role_tag())?;
    ensure_not_active(data, subject, entitlement, &category).await?;

    data.platform
        .revoke_role(subject, unverified, reason)
        .await
        .map_err(|e| ops::external("revoke unverified role", e))?;

    grant_punishment(data, actor, &target, category, reason, None, "nedopusk", indexmap! {}).await
}

/// Lift an access denial. The member returns to the unverified baseline
/// and goes through verification again.
pub async fn un_nedopusk(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::Support).await?;
    ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let entitlement = ops::entitlement_role(&data.config, "nedopusk")?;
    let unverified = ops::entitlement_role(&data.config, "unverified")?;

    let Some(record) = data.punishments.find_by_entitlement(subject, entitlement).await else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active nedopusk", subject),
        });
    };

    data.platform
        .revoke_role(subject, entitlement, reason)
        .await
        .map_err(|e| ops::external("revoke punishment role", e))?;

    data.platform
        .grant_role(subject, unverified, reason)
        .await
        .map_err(|e| ops::external("grant unverified role", e))?;

    data.punishments.revoke(subject, entitlement).await?;

    ops::notify_subject(data, subject, &lifted_dm(record.category.describe(), reason)).await;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "un_nedopusk",
            actor: Some(actor),
            subject,
            reason: reason.to_string(),
            expires_at: None,
            fields: indexmap! {
                "record".to_string() => record.to_log_format(),
            },
        },
    )
    .await;

    Ok(record)
}

/// Formally reprimand a staff member in a branch. The branch warn role
/// doubles as the entitlement, so any existing warn-family record blocks
/// a new reprimand.
pub async fn reprimand(
    data: &Data,
    actor: UserId,
    subject: UserId,
    branch: StaffBranch,
    reason: &str,
    duration: Option<&str>,
) -> Result<PunishmentRecord, ActionError> {
    if branch == StaffBranch::Common {
        return Err(ActionError::Conflict {
            message: "Reprimands cannot target the common branch".to_string(),
        });
    }

    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;
    let expires_at = ops::parse_expiry(duration)?;

    if data.punishments.find_first(subject, CategoryClass::Warn).await.is_some()
        || data
            .punishments
            .find_first(subject, CategoryClass::Reprimand)
            .await
            .is_some()
    {
        return Err(ActionError::Conflict {
            message: format!("{} already has an active warning or reprimand", subject),
        });
    }

    grant_punishment(
        data,
        actor,
        &target,
        PunishmentCategory::Reprimand(branch),
        reason,
        expires_at,
        "reprimand",
        indexmap! {
            "branch".to_string() => branch.to_string(),
        },
    )
    .await
}

/// Lift the first reprimand on record. Administrators only.
pub async fn unreprimand(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let Some(record) = data
        .punishments
        .find_first(subject, CategoryClass::Reprimand)
        .await
    else {
        return Err(ActionError::NotFound {
            what: format!("{} has no active reprimand", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unreprimand").await
}

/// Blacklist a former staff member from a branch, or from staff entirely
/// via the common branch. Indefinite by design.
pub async fn blacklist(
    data: &Data,
    actor: UserId,
    subject: UserId,
    branch: StaffBranch,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    if data
        .punishments
        .find_first(subject, CategoryClass::Blacklist)
        .await
        .is_some()
    {
        return Err(ActionError::Conflict {
            message: format!("{} is already on a staff blacklist", subject),
        });
    }

    grant_punishment(
        data,
        actor,
        &target,
        PunishmentCategory::Blacklist(branch),
        reason,
        None,
        "blacklist",
        indexmap! {
            "branch".to_string() => branch.to_string(),
        },
    )
    .await
}

/// Lift the first staff blacklist on record. Administrators only.
pub async fn unblacklist(
    data: &Data,
    actor: UserId,
    subject: UserId,
    reason: &str,
) -> Result<PunishmentRecord, ActionError> {
    ops::require_gate(data, actor, Gate::FullAccess).await?;
    let target = ops::resolve_target(data, subject).await?;
    ops::validate_reason(reason)?;

    let Some(record) = data
        .punishments
        .find_first(subject, CategoryClass::Blacklist)
        .await
    else {
        return Err(ActionError::NotFound {
            what: format!("{} is not on a staff blacklist", subject),
        });
    };

    lift_punishment(data, actor, &target, record, reason, "unblacklist").await
}

// Strip both gender roles, then grant the selected one.
async fn set_gender_roles(
    data: &Data,
    target: &ResolvedMember,
    gender: Gender,
    audit_reason: &str,
) -> Result<(), ActionError> {
    for tag in ["verif_male", "verif_female"] {
        let role = ops::entitlement_role(&data.config, tag)?;
        data.platform
            .revoke_role(target.user_id, role, audit_reason)
            .await
            .map_err(|e| ops::external("revoke gender role", e))?;
    }

    let chosen = ops::entitlement_role(&data.config, gender.role_tag())?;
    data.platform
        .grant_role(target.user_id, chosen, audit_reason)
        .await
        .map_err(|e| ops::external("grant gender role", e))?;

    Ok(())
}

/// Verify an unverified member, assigning their gender role. Leaves no
/// ledger record; verification is not a punishment.
pub async fn verify(
    data: &Data,
    actor: UserId,
    subject: UserId,
    gender: Gender,
) -> Result<(), ActionError> {
    ops::require_gate(data, actor, Gate::Support).await?;
    let target = ops::resolve_target(data, subject).await?;

    let unverified = ops::entitlement_role(&data.config, "unverified")?;
    if !target.has_role(unverified) {
        return Err(ActionError::Conflict {
            message: "Only an unverified member can be verified".to_string(),
        });
    }

    set_gender_roles(data, &target, gender, "Verification").await?;

    data.platform
        .revoke_role(subject, unverified, "Verification")
        .await
        .map_err(|e| ops::external("revoke unverified role", e))?;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "verify",
            actor: Some(actor),
            subject,
            reason: gender.describe().to_string(),
            expires_at: None,
            fields: indexmap! {
                "gender".to_string() => gender.describe().to_string(),
            },
        },
    )
    .await;

    Ok(())
}

/// Swap a verified member's gender role.
pub async fn change_gender(
    data: &Data,
    actor: UserId,
    subject: UserId,
    gender: Gender,
) -> Result<(), ActionError> {
    ops::require_gate(data, actor, Gate::Support).await?;
    let target = ops::resolve_target(data, subject).await?;

    set_gender_roles(data, &target, gender, "Gender change").await?;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "gender",
            actor: Some(actor),
            subject,
            reason: gender.describe().to_string(),
            expires_at: None,
            fields: indexmap! {
                "gender".to_string() => gender.describe().to_string(),
            },
        },
    )
    .await;

    Ok(())
}

/// The most recent punishment records for a subject, newest first.
/// Staff-only read; works for members who have already left.
pub async fn history(
    data: &Data,
    actor: UserId,
    subject: UserId,
) -> Result<Vec<PunishmentRecord>, ActionError> {
    ops::require_gate(data, actor, Gate::Staff).await?;

    Ok(data.punishments.history(subject, HISTORY_LIMIT).await)
}
