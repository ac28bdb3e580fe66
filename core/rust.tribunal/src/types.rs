use serde::{Deserialize, Serialize};

/// Why a panel operation could not run, or could not finish.
///
/// Serialized with a string tag (`var`) so surfaces can switch on the
/// variant without parsing messages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "var")]
pub enum ActionError {
    /// The actor does not clear the gate for this action. This is a
    /// verdict, not a fault: surfaces show it, nothing retries it and
    /// nothing logs it as a system error.
    PermissionDenied { required: String },
    /// Nothing matched: unknown member, no active record, no such appeal.
    NotFound { what: String },
    /// The operation contradicts current state or carries unusable input
    /// and was rejected before any mutation (duplicate punishment, active
    /// cooldown, already-decided appeal, bad reason/duration).
    Conflict { message: String },
    /// A role-tag or channel this feature needs is not mapped in config.
    /// Fatal for the feature, harmless for everything else.
    Configuration { missing: String },
    /// The platform refused the primary entitlement change. Operator
    /// flows abort on this before touching the ledger.
    ExternalActionFailed { action: String, error: String },
    /// Store or serialization fault.
    InternalError { error: String },
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::PermissionDenied { .. } => "permission_denied",
            ActionError::NotFound { .. } => "not_found",
            ActionError::Conflict { .. } => "conflict",
            ActionError::Configuration { .. } => "configuration",
            ActionError::ExternalActionFailed { .. } => "external_action_failed",
            ActionError::InternalError { .. } => "internal_error",
        }
    }

    /// Negative outcomes a surface may show the actor verbatim.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ActionError::PermissionDenied { .. }
                | ActionError::NotFound { .. }
                | ActionError::Conflict { .. }
        )
    }

    pub fn to_markdown(&self) -> String {
        match self {
            ActionError::PermissionDenied { required } => {
                format!("You need **{}** access to perform this action", required)
            }
            ActionError::NotFound { what } => what.clone(),
            ActionError::Conflict { message } => message.clone(),
            ActionError::Configuration { missing } => {
                format!(
                    "This feature is not configured on this deployment: missing {}",
                    missing
                )
            }
            ActionError::ExternalActionFailed { action, error } => {
                format!(
                    "The platform rejected the action ``{}``: {}.\n\nPlease try again later, it might work!",
                    action, error
                )
            }
            ActionError::InternalError { error } => error.clone(),
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.to_markdown())
    }
}

impl std::error::Error for ActionError {}

impl From<crate::Error> for ActionError {
    fn from(e: crate::Error) -> Self {
        ActionError::InternalError {
            error: e.to_string(),
        }
    }
}
