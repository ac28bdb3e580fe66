use tribunalcore_rs::ids::UserId;

/// Whether a staff role is being handed out or stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffAction {
    Promote,
    Demote,
}

impl StaffAction {
    pub fn audit_kind(&self) -> &'static str {
        match self {
            StaffAction::Promote => "staff_promote",
            StaffAction::Demote => "staff_demote",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            StaffAction::Promote => "Promotion",
            StaffAction::Demote => "Demotion",
        }
    }
}

/// The audit reason attached to the platform-side role change, so the
/// platform's own audit log carries the operator and their reason.
pub fn audit_reason(action: StaffAction, reason: &str, actor: &str) -> String {
    format!("{} via staff panel | {} | {}", action.describe(), reason, actor)
}

/// Outcome of one batch promote/demote.
///
/// A batch never aborts halfway: every target lands in exactly one
/// bucket and the caller renders the mix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffChangeReport {
    /// The manageable role-tag behind the changed role
    pub role_tag: String,
    /// Targets whose roles actually changed
    pub applied: Vec<UserId>,
    /// Targets already in the desired state
    pub skipped: Vec<UserId>,
    /// Targets that could not be resolved on the platform
    pub unresolved: Vec<UserId>,
    /// Targets whose role change the platform refused
    pub failed: Vec<UserId>,
}
