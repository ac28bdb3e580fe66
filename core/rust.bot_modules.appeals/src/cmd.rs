use indexmap::indexmap;

use super::core::{approved_dm, queue_channel, queue_message, rejected_dm, responder_tag};
use permissions::Gate;
use tribunal::appeals::{
    AppealContext, AppealCreate, AppealKind, AppealRecord, AppealStatus, AppealVerdict,
    MAX_EVIDENCE_LENGTH, MAX_EXTRA_INFO_LENGTH,
};
use tribunal::data::Data;
use tribunal::ops;
use tribunal::platform::AuditEvent;
use tribunal::types::ActionError;
use tribunalcore_rs::ids::UserId;

// Cheap terminality pre-check; the store repeats it under its lock so
// racing reviewers cannot both win.
fn ensure_pending(appeal: &AppealRecord) -> Result<(), ActionError> {
    if appeal.status != AppealStatus::Pending {
        return Err(ActionError::Conflict {
            message: format!(
                "Appeal #{} has already been {}",
                appeal.number, appeal.status
            ),
        });
    }

    Ok(())
}

// The queue post is how reviewers find the appeal, but the filed record
// is authoritative: a failed post is logged, never surfaced.
async fn post_to_queue(data: &Data, appeal: &AppealRecord, submitter: &str) {
    let issuer_roles = match (appeal.kind, &appeal.context) {
        (AppealKind::Ban, Some(context)) => match context.issuer {
            Some(issuer) => data
                .platform
                .resolve_member(issuer)
                .await
                .ok()
                .flatten()
                .map(|member| member.roles),
            None => None,
        },
        _ => None,
    };

    let mention = responder_tag(&data.config, appeal.kind, issuer_roles.as_deref())
        .and_then(|tag| data.config.role(&tag));

    if let Err(e) = data
        .platform
        .post_message(
            queue_channel(&data.config, appeal.kind),
            &queue_message(appeal, submitter),
            mention,
        )
        .await
    {
        log::warn!(
            "Failed to post appeal #{} to the review queue: {}",
            appeal.number,
            e
        );
    }
}

/// File an appeal on the appellant's own behalf.
///
/// The punishment role must actually be held (the platform is the source
/// of truth here, not the ledger) and no unexpired rejection cooldown may
/// exist for this kind. Pending appeals do not block one another.
pub async fn submit(
    data: &Data,
    subject: UserId,
    kind: AppealKind,
    evidence: &str,
    extra_info: Option<&str>,
) -> Result<AppealRecord, ActionError> {
    let member = ops::resolve_target(data, subject).await?;

    let entitlement = ops::entitlement_role(&data.config, &kind.category().role_tag())?;
    if !member.has_role(entitlement) {
        return Err(ActionError::Conflict {
            message: format!("There is no active {} to appeal", kind),
        });
    }

    ops::validate_text("statement of evidence", evidence, MAX_EVIDENCE_LENGTH)?;
    let extra_info = match extra_info.map(str::trim) {
        Some(text) if !text.is_empty() => {
            ops::validate_text("extra information", text, MAX_EXTRA_INFO_LENGTH)?;
            Some(text.to_string())
        }
        _ => None,
    };

    if let Some(until) = data.appeals.active_cooldown(subject, kind).await? {
        return Err(ActionError::Conflict {
            message: format!(
                "A rejected appeal blocks re-submission until {}",
                until.format("%Y-%m-%d %H:%M UTC")
            ),
        });
    }

    let context = data
        .punishments
        .find_by_entitlement(subject, entitlement)
        .await
        .map(|record| AppealContext::from_record(&record));

    let appeal = data
        .appeals
        .submit(AppealCreate {
            subject,
            kind,
            evidence: evidence.trim().to_string(),
            extra_info,
            context,
        })
        .await?;

    post_to_queue(data, &appeal, &member.display_name).await;

    Ok(appeal)
}

/// Approve a pending appeal: the punishment role and its ledger record
/// go away, and an approved access denial puts the member back on the
/// unverified baseline. A subject who already left the community is
/// tolerated; the appeal still closes, with nothing to lift.
pub async fn approve(
    data: &Data,
    actor: UserId,
    number: u64,
    reason: &str,
) -> Result<AppealRecord, ActionError> {
    let reviewer = ops::require_gate(data, actor, Gate::FullAccess).await?;
    ops::validate_reason(reason)?;

    let Some(appeal) = data.appeals.get(number).await else {
        return Err(ActionError::NotFound {
            what: format!("Appeal #{} was not found", number),
        });
    };

    ensure_pending(&appeal)?;

    let subject = match data.platform.resolve_member(appeal.subject).await {
        Ok(subject) => subject,
        Err(e) => return Err(ops::external("resolve member", e)),
    };

    if subject.is_some() {
        let audit_reason = format!("Appeal #{} approved", number);
        let entitlement =
            ops::entitlement_role(&data.config, &appeal.kind.category().role_tag())?;

        data.platform
            .revoke_role(appeal.subject, entitlement, &audit_reason)
            .await
            .map_err(|e| ops::external("revoke punishment role", e))?;

        if appeal.kind == AppealKind::Nedopusk {
            let unverified = ops::entitlement_role(&data.config, "unverified")?;
            data.platform
                .grant_role(appeal.subject, unverified, &audit_reason)
                .await
                .map_err(|e| ops::external("grant unverified role", e))?;
        }

        data.punishments.revoke(appeal.subject, entitlement).await?;
    }

    let decided = data
        .appeals
        .decide(number, AppealVerdict::Approved, actor, reason)
        .await?;

    if subject.is_some() {
        ops::notify_subject(
            data,
            appeal.subject,
            &approved_dm(&decided, reason, &reviewer.display_name),
        )
        .await;
    }

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "appeal_approved",
            actor: Some(actor),
            subject: appeal.subject,
            reason: reason.to_string(),
            expires_at: None,
            fields: indexmap! {
                "appeal".to_string() => format!("#{} ({})", appeal.number, appeal.kind),
            },
        },
    )
    .await;

    Ok(decided)
}

/// Reject a pending appeal and start the fixed re-submission cooldown.
/// The ledger is never touched.
pub async fn reject(
    data: &Data,
    actor: UserId,
    number: u64,
    reason: &str,
) -> Result<AppealRecord, ActionError> {
    let reviewer = ops::require_gate(data, actor, Gate::FullAccess).await?;
    ops::validate_reason(reason)?;

    let Some(appeal) = data.appeals.get(number).await else {
        return Err(ActionError::NotFound {
            what: format!("Appeal #{} was not found", number),
        });
    };

    ensure_pending(&appeal)?;

    let cooldown_until = data
        .appeals
        .set_cooldown(appeal.subject, appeal.kind)
        .await?;

    let decided = data
        .appeals
        .decide(number, AppealVerdict::Rejected, actor, reason)
        .await?;

    ops::notify_subject(
        data,
        appeal.subject,
        &rejected_dm(&decided, reason, &reviewer.display_name, cooldown_until),
    )
    .await;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "appeal_rejected",
            actor: Some(actor),
            subject: appeal.subject,
            reason: reason.to_string(),
            expires_at: Some(cooldown_until),
            fields: indexmap! {
                "appeal".to_string() => format!("#{} ({})", appeal.number, appeal.kind),
            },
        },
    )
    .await;

    Ok(decided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tribunal::platform::{AuditLogger, ChatPlatform, ResolvedMember};
    use tribunal::punishments::{PunishmentCategory, PunishmentCreate};
    use tribunalcore_rs::ids::{ChannelId, RoleId};

    const R_ADMIN: u64 = 3;
    const R_MODERATOR: u64 = 6;
    const R_BAN: u64 = 9;
    const R_NEDOPUSK: u64 = 12;
    const R_UNVERIFIED: u64 = 13;
    const R_OTV_SUPPORT: u64 = 30;
    const R_OTV_MODERATOR: u64 = 31;

    const MOD: u64 = 100;
    const ADMIN: u64 = 102;
    const BANNED: u64 = 200;
    const DENIED: u64 = 201;

    #[derive(Default)]
    struct FakePlatform {
        members: Mutex<HashMap<UserId, ResolvedMember>>,
        notifications: Mutex<Vec<(UserId, String)>>,
        posts: Mutex<Vec<(ChannelId, String, Option<RoleId>)>>,
        revoke_calls: Mutex<Vec<(UserId, RoleId)>>,
        fail_posts: AtomicBool,
    }

    impl FakePlatform {
        fn add_member(&self, user: u64, roles: &[u64]) {
            let user_id = UserId::new(user);
            self.members.lock().unwrap().insert(
                user_id,
                ResolvedMember {
                    user_id,
                    display_name: format!("user-{}", user),
                    roles: roles.iter().copied().map(RoleId::new).collect(),
                },
            );
        }

        fn remove_member(&self, user: u64) {
            self.members.lock().unwrap().remove(&UserId::new(user));
        }

        fn has_role(&self, user: u64, role: u64) -> bool {
            self.members
                .lock()
                .unwrap()
                .get(&UserId::new(user))
                .map(|m| m.roles.contains(&RoleId::new(role)))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn resolve_member(
            &self,
            user_id: UserId,
        ) -> Result<Option<ResolvedMember>, tribunal::Error> {
            Ok(self.members.lock().unwrap().get(&user_id).cloned())
        }

        async fn grant_role(
            &self,
            user_id: UserId,
            role: RoleId,
            _audit_reason: &str,
        ) -> Result<(), tribunal::Error> {
            if let Some(member) = self.members.lock().unwrap().get_mut(&user_id) {
                if !member.roles.contains(&role) {
                    member.roles.push(role);
                }
            }
            Ok(())
        }

        async fn revoke_role(
            &self,
            user_id: UserId,
            role: RoleId,
            _audit_reason: &str,
        ) -> Result<(), tribunal::Error> {
            self.revoke_calls.lock().unwrap().push((user_id, role));
            if let Some(member) = self.members.lock().unwrap().get_mut(&user_id) {
                member.roles.retain(|r| *r != role);
            }
            Ok(())
        }

        async fn notify(&self, user_id: UserId, message: &str) -> Result<(), tribunal::Error> {
            self.notifications
                .lock()
                .unwrap()
                .push((user_id, message.to_string()));
            Ok(())
        }

        async fn post_message(
            &self,
            channel: ChannelId,
            message: &str,
            mention: Option<RoleId>,
        ) -> Result<(), tribunal::Error> {
            if self.fail_posts.load(Ordering::SeqCst) {
                return Err("channel gone".into());
            }

            self.posts
                .lock()
                .unwrap()
                .push((channel, message.to_string(), mention));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeAudit {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl FakeAudit {
        fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    #[async_trait]
    impl AuditLogger for FakeAudit {
        async fn log(&self, event: AuditEvent) -> Result<(), tribunal::Error> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn test_data() -> (Data, Arc<FakePlatform>, Arc<FakeAudit>) {
        let dir = std::env::temp_dir()
            .join("tribunal-appeal-cmd-tests")
            .join(uuid::Uuid::new_v4().to_string());

        let yaml = format!(
            r#"
storage:
  punishments: {dir}/punishments.json
  appeals: {dir}/appeals.json
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
  otvechaet_support: 30
  otvechaet_moderator: 31
"#,
            dir = dir.display()
        );

        let config = config::Config::from_yaml(&yaml).unwrap();
        let platform = Arc::new(FakePlatform::default());
        let audit = Arc::new(FakeAudit::default());

        platform.add_member(MOD, &[R_MODERATOR]);
        platform.add_member(ADMIN, &[R_ADMIN]);
        platform.add_member(BANNED, &[R_BAN]);
        platform.add_member(DENIED, &[R_NEDOPUSK]);

        let data = Data::from_config(config, platform.clone(), audit.clone());
        (data, platform, audit)
    }

    fn user(id: u64) -> UserId {
        UserId::new(id)
    }

    async fn plant_ban_record(data: &Data) {
        data.punishments
            .grant(PunishmentCreate {
                subject: user(BANNED),
                category: PunishmentCategory::Ban,
                entitlement: RoleId::new(R_BAN),
                reason: "raiding".to_string(),
                issuer: Some(user(MOD)),
                expires_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_requires_held_role_and_posts_to_queue() {
        let (data, platform, audit) = test_data();
        plant_ban_record(&data).await;

        // No ban role, nothing to appeal
        let err = submit(&data, user(MOD), AppealKind::Ban, "unfair", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let appeal = submit(
            &data,
            user(BANNED),
            AppealKind::Ban,
            "wrong account",
            Some("screenshots attached"),
        )
        .await
        .unwrap();

        assert_eq!(appeal.number, 1);
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert_eq!(appeal.context.as_ref().unwrap().reason, "raiding");

        // Posted to the ban queue, pinging the issuer's responder team
        let posts = platform.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, ChannelId::new(900));
        assert!(posts[0].1.contains("Appeal #1 (ban)"));
        assert!(posts[0].1.contains("Punishment reason: raiding"));
        assert_eq!(posts[0].2, Some(RoleId::new(R_OTV_MODERATOR)));
        drop(posts);

        // Submission is visible through the queue, not the audit trail
        assert!(audit.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_submit_nedopusk_pings_support_responders() {
        let (data, platform, _audit) = test_data();

        let appeal = submit(&data, user(DENIED), AppealKind::Nedopusk, "mistake", None)
            .await
            .unwrap();

        // No ledger record was planted: context is tolerated to be absent
        assert!(appeal.context.is_none());

        let posts = platform.posts.lock().unwrap();
        assert_eq!(posts[0].0, ChannelId::new(901));
        assert!(posts[0].1.contains("Punishment reason: not found"));
        assert_eq!(posts[0].2, Some(RoleId::new(R_OTV_SUPPORT)));
    }

    #[tokio::test]
    async fn test_submit_validates_texts() {
        let (data, _platform, _audit) = test_data();

        let err = submit(&data, user(BANNED), AppealKind::Ban, "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let long = "x".repeat(MAX_EVIDENCE_LENGTH + 1);
        let err = submit(&data, user(BANNED), AppealKind::Ban, &long, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let long_extra = "x".repeat(MAX_EXTRA_INFO_LENGTH + 1);
        let err = submit(&data, user(BANNED), AppealKind::Ban, "fine", Some(&long_extra))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        // Blank extra info collapses to none
        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "fine", Some("   "))
            .await
            .unwrap();
        assert_eq!(appeal.extra_info, None);
    }

    #[tokio::test]
    async fn test_pending_appeals_coexist() {
        let (data, _platform, _audit) = test_data();

        let first = submit(&data, user(BANNED), AppealKind::Ban, "one", None)
            .await
            .unwrap();
        let second = submit(&data, user(BANNED), AppealKind::Ban, "two", None)
            .await
            .unwrap();

        // Cooldowns fire on rejection only, so both may sit in the queue
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(data.appeals.pending_for(user(BANNED)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_queue_post_failure_never_fails_submission() {
        let (data, platform, _audit) = test_data();
        platform.fail_posts.store(true, Ordering::SeqCst);

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();

        assert_eq!(appeal.number, 1);
        assert_eq!(data.appeals.pending_for(user(BANNED)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_approve_lifts_punishment() {
        let (data, platform, audit) = test_data();
        plant_ban_record(&data).await;

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "wrong account", None)
            .await
            .unwrap();

        let decided = approve(&data, user(ADMIN), appeal.number, "proof checks out")
            .await
            .unwrap();

        assert_eq!(decided.status, AppealStatus::Approved);
        assert_eq!(decided.decided_by, Some(user(ADMIN)));
        assert_eq!(decided.decision_reason.as_deref(), Some("proof checks out"));

        assert!(!platform.has_role(BANNED, R_BAN));
        assert!(
            !data
                .punishments
                .is_active(user(BANNED), RoleId::new(R_BAN))
                .await
        );

        let notifications = platform.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].1.contains("approved"));
        drop(notifications);

        assert_eq!(audit.kinds(), vec!["appeal_approved"]);
    }

    #[tokio::test]
    async fn test_approve_nedopusk_restores_unverified() {
        let (data, platform, _audit) = test_data();

        data.punishments
            .grant(PunishmentCreate {
                subject: user(DENIED),
                category: PunishmentCategory::Nedopusk,
                entitlement: RoleId::new(R_NEDOPUSK),
                reason: "failed check".to_string(),
                issuer: Some(user(MOD)),
                expires_at: None,
            })
            .await
            .unwrap();

        let appeal = submit(&data, user(DENIED), AppealKind::Nedopusk, "mistake", None)
            .await
            .unwrap();
        approve(&data, user(ADMIN), appeal.number, "verified manually")
            .await
            .unwrap();

        assert!(!platform.has_role(DENIED, R_NEDOPUSK));
        assert!(platform.has_role(DENIED, R_UNVERIFIED));
        assert!(
            !data
                .punishments
                .is_active(user(DENIED), RoleId::new(R_NEDOPUSK))
                .await
        );
    }

    #[tokio::test]
    async fn test_decisions_require_full_access() {
        let (data, _platform, _audit) = test_data();

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();

        let err = approve(&data, user(MOD), appeal.number, "ok").await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");
        let err = reject(&data, user(MOD), appeal.number, "no").await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");
    }

    #[tokio::test]
    async fn test_decision_guards() {
        let (data, _platform, _audit) = test_data();

        let err = approve(&data, user(ADMIN), 999, "ok").await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();
        approve(&data, user(ADMIN), appeal.number, "ok").await.unwrap();

        // Terminal appeals reject any further decision
        let err = approve(&data, user(ADMIN), appeal.number, "again")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        let err = reject(&data, user(ADMIN), appeal.number, "no")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn test_approve_tolerates_departed_subject() {
        let (data, platform, _audit) = test_data();
        plant_ban_record(&data).await;

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();
        platform.remove_member(BANNED);

        let decided = approve(&data, user(ADMIN), appeal.number, "gone anyway")
            .await
            .unwrap();

        // The appeal closes, but there is nobody to lift anything from
        assert_eq!(decided.status, AppealStatus::Approved);
        assert!(platform.revoke_calls.lock().unwrap().is_empty());
        assert!(
            data.punishments
                .is_active(user(BANNED), RoleId::new(R_BAN))
                .await
        );
    }

    #[tokio::test]
    async fn test_reject_sets_cooldown_and_leaves_ledger() {
        let (data, platform, audit) = test_data();
        plant_ban_record(&data).await;

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();
        let decided = reject(&data, user(ADMIN), appeal.number, "insufficient proof")
            .await
            .unwrap();

        assert_eq!(decided.status, AppealStatus::Rejected);

        // The punishment survives rejection untouched
        assert!(platform.has_role(BANNED, R_BAN));
        assert!(
            data.punishments
                .is_active(user(BANNED), RoleId::new(R_BAN))
                .await
        );

        // Re-submission is cooldown-gated per kind
        let err = submit(&data, user(BANNED), AppealKind::Ban, "again", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert!(err.to_markdown().contains("re-submission"));

        let notifications = platform.notifications.lock().unwrap();
        assert!(notifications[0].1.contains("rejected"));
        assert!(notifications[0].1.contains("You may submit a new appeal after"));
        drop(notifications);

        assert_eq!(audit.kinds(), vec!["appeal_rejected"]);
    }

    #[tokio::test]
    async fn test_cooldowns_are_per_kind() {
        let (data, platform, _audit) = test_data();
        platform.add_member(BANNED, &[R_BAN, R_NEDOPUSK]);

        let appeal = submit(&data, user(BANNED), AppealKind::Ban, "unfair", None)
            .await
            .unwrap();
        reject(&data, user(ADMIN), appeal.number, "no").await.unwrap();

        // The ban cooldown does not block a nedopusk appeal
        submit(&data, user(BANNED), AppealKind::Nedopusk, "mistake", None)
            .await
            .unwrap();
    }
}
