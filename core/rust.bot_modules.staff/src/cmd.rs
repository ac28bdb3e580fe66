use indexmap::indexmap;

use super::core::{audit_reason, StaffAction, StaffChangeReport};
use permissions::Gate;
use tribunal::data::Data;
use tribunal::ops;
use tribunal::platform::AuditEvent;
use tribunal::types::ActionError;
use tribunalcore_rs::ids::{RoleId, UserId};

/// Hand a staff role to a batch of members.
pub async fn promote(
    data: &Data,
    actor: UserId,
    role: RoleId,
    targets: &[UserId],
    reason: &str,
) -> Result<StaffChangeReport, ActionError> {
    change_roles(data, actor, role, targets, reason, StaffAction::Promote).await
}

/// Strip a staff role from a batch of members.
pub async fn demote(
    data: &Data,
    actor: UserId,
    role: RoleId,
    targets: &[UserId],
    reason: &str,
) -> Result<StaffChangeReport, ActionError> {
    change_roles(data, actor, role, targets, reason, StaffAction::Demote).await
}

async fn change_roles(
    data: &Data,
    actor: UserId,
    role: RoleId,
    targets: &[UserId],
    reason: &str,
    action: StaffAction,
) -> Result<StaffChangeReport, ActionError> {
    let operator = ops::require_gate(data, actor, Gate::StaffManagement).await?;

    // Only roles carrying hierarchy metadata are manageable at all; the
    // reverse lookup rejects everything else up front.
    let Some(tag) = data.config.role_tag_by_id(role) else {
        return Err(ActionError::NotFound {
            what: format!("Role {} is not a manageable staff role", role),
        });
    };
    let tag = tag.to_string();

    if !permissions::can_manage_role(&data.config, &operator.roles, &tag) {
        return Err(ActionError::PermissionDenied {
            required: format!("'{}' management", tag),
        });
    }

    ops::validate_reason(reason)?;

    let change_reason = audit_reason(action, reason, &operator.display_name);
    let mut report = StaffChangeReport {
        role_tag: tag.clone(),
        ..Default::default()
    };

    for &target in targets {
        let member = match data.platform.resolve_member(target).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                report.unresolved.push(target);
                continue;
            }
            Err(e) => {
                log::warn!("Failed to resolve {} for a staff role change: {}", target, e);
                report.failed.push(target);
                continue;
            }
        };

        let result = match action {
            StaffAction::Promote => {
                if member.has_role(role) {
                    report.skipped.push(target);
                    continue;
                }
                data.platform.grant_role(target, role, &change_reason).await
            }
            StaffAction::Demote => {
                if !member.has_role(role) {
                    report.skipped.push(target);
                    continue;
                }
                data.platform.revoke_role(target, role, &change_reason).await
            }
        };

        match result {
            Ok(()) => report.applied.push(target),
            Err(e) => {
                log::warn!("Failed to change role '{}' on {}: {}", tag, target, e);
                report.failed.push(target);
            }
        }
    }

    for &subject in &report.applied {
        ops::dispatch_audit(
            data,
            AuditEvent {
                kind: action.audit_kind(),
                actor: Some(actor),
                subject,
                reason: reason.to_string(),
                expires_at: None,
                fields: indexmap! {
                    "role".to_string() => tag.clone(),
                },
            },
        )
        .await;
    }

    Ok(report)
}
