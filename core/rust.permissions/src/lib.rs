use config::Config;
use serde::{Deserialize, Serialize};
use tribunalcore_rs::ids::RoleId;

/// Role-tags that grant full access to every panel action.
pub const FULL_ACCESS_TAGS: &[&str] = &["admin", "developer", "owner"];

/// Role-tags that mark a member as staff for read-only surfaces such as
/// the punishment history panel.
pub const STAFF_TAGS: &[&str] = &[
    "moderator",
    "support",
    "control",
    "admin",
    "developer",
    "owner",
];

/// The access tier an action demands.
///
/// The same verdict is used speculatively (to decide whether a button is
/// shown at all) and authoritatively (immediately before mutation), so
/// everything here is a pure function of the actor's currently held roles
/// and static config.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Moderator tag or full access.
    Moderator,
    /// Support tag or full access.
    Support,
    /// Admin, developer or owner only.
    FullAccess,
    /// Any staff tag.
    Staff,
    /// Curator and up; gates the staff management panel.
    StaffManagement,
}

impl Gate {
    pub fn describe(&self) -> &'static str {
        match self {
            Gate::Moderator => "moderator or higher",
            Gate::Support => "support or higher",
            Gate::FullAccess => "administrator",
            Gate::Staff => "staff",
            Gate::StaffManagement => "curator or higher",
        }
    }
}

/// Whether the member holds the role a tag maps to. Unmapped tags hold
/// for nobody.
pub fn has_tag(config: &Config, member_roles: &[RoleId], tag: &str) -> bool {
    config
        .role(tag)
        .map_or(false, |id| member_roles.contains(&id))
}

pub fn has_full_access(config: &Config, member_roles: &[RoleId]) -> bool {
    FULL_ACCESS_TAGS
        .iter()
        .any(|tag| has_tag(config, member_roles, tag))
}

pub fn is_staff(config: &Config, member_roles: &[RoleId]) -> bool {
    STAFF_TAGS
        .iter()
        .any(|tag| has_tag(config, member_roles, tag))
}

/// The authoritative verdict: may a member holding `member_roles` pass
/// `gate`? Denial is a verdict, not an error.
pub fn meets_gate(config: &Config, member_roles: &[RoleId], gate: Gate) -> bool {
    match gate {
        Gate::Moderator => {
            has_tag(config, member_roles, "moderator") || has_full_access(config, member_roles)
        }
        Gate::Support => {
            has_tag(config, member_roles, "support") || has_full_access(config, member_roles)
        }
        Gate::FullAccess => has_full_access(config, member_roles),
        Gate::Staff => is_staff(config, member_roles),
        Gate::StaffManagement => can_use_staff_commands(config, member_roles),
    }
}

/// Hierarchy level of a member, 7 (owner) down to 1 (everyone else).
/// The highest held tag wins.
pub fn member_level(config: &Config, member_roles: &[RoleId]) -> u8 {
    if has_tag(config, member_roles, "owner") {
        return 7;
    }
    if has_tag(config, member_roles, "developer") {
        return 6;
    }
    if has_tag(config, member_roles, "admin") {
        return 5;
    }
    if has_tag(config, member_roles, "admin_branch") {
        return 4;
    }
    if has_tag(config, member_roles, "curator") {
        return 3;
    }
    for branch in config::BRANCHES {
        if has_tag(config, member_roles, &format!("otvechaet_{}", branch)) {
            return 2;
        }
    }
    1
}

/// The branches a member belongs to, via the branch membership tags.
pub fn member_branches(config: &Config, member_roles: &[RoleId]) -> Vec<&'static str> {
    config::BRANCHES
        .into_iter()
        .filter(|branch| has_tag(config, member_roles, branch))
        .collect()
}

/// May the actor hand out or strip the staff role behind `target_tag`?
///
/// Full access manages everything strictly below its own level. A branch
/// administrator (level 4) stays inside their own branches and below
/// themselves; a curator (level 3) additionally only reaches tags at
/// level 2 and under. Nobody manages "global" tags without full access,
/// and unknown tags are managed by nobody.
pub fn can_manage_role(config: &Config, actor_roles: &[RoleId], target_tag: &str) -> bool {
    let Some(target) = config.role_levels.get(target_tag) else {
        return false;
    };

    let actor_level = member_level(config, actor_roles);

    if has_full_access(config, actor_roles) {
        return target.level < actor_level;
    }

    let in_branch = target.branch != config::GLOBAL_BRANCH
        && member_branches(config, actor_roles).contains(&target.branch.as_str());

    match actor_level {
        4 => in_branch && target.level < actor_level,
        3 => in_branch && target.level <= 2,
        _ => false,
    }
}

/// Staff management commands are for curators and up.
pub fn can_use_staff_commands(config: &Config, member_roles: &[RoleId]) -> bool {
    member_level(config, member_roles) >= 3 || has_full_access(config, member_roles)
}
