use chrono::{DateTime, Utc};

use config::Config;
use tribunal::appeals::{AppealKind, AppealRecord};
use tribunalcore_rs::ids::{ChannelId, RoleId};

/// The review queue an appeal kind is posted to.
pub fn queue_channel(config: &Config, kind: AppealKind) -> ChannelId {
    match kind {
        AppealKind::Ban => config.appeal_queues.ban,
        AppealKind::Nedopusk => config.appeal_queues.nedopusk,
    }
}

/// The responder role-tag to ping with a new appeal.
///
/// Nedopusk appeals always go to the support responders. Ban appeals go
/// to the responder team of the branch the issuer belongs to, so the
/// ping is skipped entirely when the issuer is unknown or holds no
/// branch tag.
pub fn responder_tag(
    config: &Config,
    kind: AppealKind,
    issuer_roles: Option<&[RoleId]>,
) -> Option<String> {
    match kind {
        AppealKind::Nedopusk => Some("otvechaet_support".to_string()),
        AppealKind::Ban => issuer_roles.and_then(|roles| {
            permissions::member_branches(config, roles)
                .first()
                .map(|branch| format!("otvechaet_{}", branch))
        }),
    }
}

/// The message posted to the review queue when an appeal is filed.
pub fn queue_message(appeal: &AppealRecord, submitter: &str) -> String {
    let mut message = format!(
        "Appeal #{} ({})\nSubmitted by: {} ({})\n",
        appeal.number, appeal.kind, submitter, appeal.subject
    );

    match &appeal.context {
        Some(context) => {
            message.push_str(&format!("Issued by: {}\n", context.issuer_display()));
            message.push_str(&format!("Punishment reason: {}\n", context.reason));
            message.push_str(&format!(
                "Issued at: {}\n",
                context.issued_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        None => message.push_str("Issued by: not found\nPunishment reason: not found\n"),
    }

    message.push_str(&format!("Evidence: {}\n", appeal.evidence));

    if let Some(extra) = &appeal.extra_info {
        message.push_str(&format!("Extra information: {}\n", extra));
    }

    message.push_str("Status: pending");

    message
}

/// DM sent when an appeal is approved.
pub fn approved_dm(appeal: &AppealRecord, reason: &str, reviewer: &str) -> String {
    format!(
        "Your {} appeal #{} has been approved.\nReason: {}\nReviewed by: {}",
        appeal.kind, appeal.number, reason, reviewer
    )
}

/// DM sent when an appeal is rejected, including when the re-submission
/// cooldown lapses.
pub fn rejected_dm(
    appeal: &AppealRecord,
    reason: &str,
    reviewer: &str,
    cooldown_until: DateTime<Utc>,
) -> String {
    format!(
        "Your {} appeal #{} has been rejected.\nReason: {}\nReviewed by: {}\nYou may submit a new appeal after {}.",
        appeal.kind,
        appeal.number,
        reason,
        reviewer,
        cooldown_until.format("%Y-%m-%d %H:%M UTC")
    )
}
