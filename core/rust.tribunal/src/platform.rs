use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tribunalcore_rs::ids::{ChannelId, RoleId, UserId};

/// A community member as the chat platform currently sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMember {
    /// The member's user id
    pub user_id: UserId,
    /// Display name for embeds and notifications
    pub display_name: String,
    /// Every role the member currently holds
    pub roles: Vec<RoleId>,
}

impl ResolvedMember {
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// The chat platform the panel runs against.
///
/// Punishments are entitlement roles, so the whole surface is role
/// management plus messaging. Implementations talk to the real platform
/// API; tests substitute in-memory fakes.
#[async_trait]
pub trait ChatPlatform
where
    Self: Send + Sync,
{
    /// Look up a member. `Ok(None)` means the member has left or never
    /// existed, which is not an error for most flows.
    async fn resolve_member(&self, user_id: UserId) -> Result<Option<ResolvedMember>, crate::Error>;

    /// Grant a role. The audit reason lands in the platform's own audit
    /// log next to the change.
    async fn grant_role(
        &self,
        user_id: UserId,
        role: RoleId,
        audit_reason: &str,
    ) -> Result<(), crate::Error>;

    /// Revoke a role. Must be a no-op (not an error) when the member
    /// does not currently hold it, so replays and drift repairs are safe.
    async fn revoke_role(
        &self,
        user_id: UserId,
        role: RoleId,
        audit_reason: &str,
    ) -> Result<(), crate::Error>;

    /// Direct-message a member. Callers treat failures as non-fatal
    /// since members can close their DMs at any time.
    async fn notify(&self, user_id: UserId, message: &str) -> Result<(), crate::Error>;

    /// Post a message to a channel, e.g. an appeal review queue. The
    /// mention, when given, pings a role along with the message.
    async fn post_message(
        &self,
        channel: ChannelId,
        message: &str,
        mention: Option<RoleId>,
    ) -> Result<(), crate::Error>;
}

/// One staff action, as recorded in the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Short machine name of the action, e.g. "ban" or "appeal_rejected"
    pub kind: &'static str,
    /// The staff member who performed it; None for automatic actions
    pub actor: Option<UserId>,
    /// The member it happened to
    pub subject: UserId,
    /// The reason given
    pub reason: String,
    /// Expiry attached to the action, if any
    pub expires_at: Option<DateTime<Utc>>,
    /// Extra lines for the log message, in insertion order
    pub fields: indexmap::IndexMap<String, String>,
}

/// Where audit events end up. Implementations own the mapping from
/// event kind to log channel; the engine only emits events.
#[async_trait]
pub trait AuditLogger
where
    Self: Send + Sync,
{
    async fn log(&self, event: AuditEvent) -> Result<(), crate::Error>;
}
