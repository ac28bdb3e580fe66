use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tribunalcore_rs::ids::{ChannelId, RoleId};

pub type Error = Box<dyn std::error::Error + Send + Sync>; // This is constant and should be copy pasted

/// The staff branches a community is organized into.
pub const BRANCHES: [&str; 7] = [
    "support",
    "moderator",
    "eventsmod",
    "creative",
    "clanmaster",
    "closemaker",
    "broadcaster",
];

/// Branch marker for role-tags that sit above any single branch.
pub const GLOBAL_BRANCH: &str = "global";

/// Role-tags every deployment must map. Feature-specific tags (warn roles,
/// `ostranenie`, `chs_*`, gender roles, ...) may be absent and surface as a
/// configuration error the first time that feature is used.
pub const REQUIRED_TAGS: &[&str] = &[
    "owner",
    "developer",
    "admin",
    "admin_branch",
    "curator",
    "moderator",
    "support",
    "control",
    "ban",
    "mute_text",
    "mute_voice",
    "nedopusk",
    "unverified",
];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// One namespace of role-tag -> platform role id. Tags cover punishment
    /// entitlements ("ban", "warn_support", "chs_common", ...), staff tiers
    /// ("owner" down to "control"), the branch membership tags, per-branch
    /// responder tags ("otvechaet_<branch>") and special roles such as
    /// "unverified".
    pub roles: IndexMap<String, RoleId>,

    /// Hierarchy metadata for the role-tags staff commands may hand out.
    #[serde(default)]
    pub role_levels: IndexMap<String, RoleLevel>,

    /// Destination channels for submitted appeals, per appeal kind.
    pub appeal_queues: AppealQueues,

    #[serde(default)]
    pub storage: Storage,
}

/// Position of a manageable role-tag in the staff hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoleLevel {
    pub level: u8,
    pub branch: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppealQueues {
    pub ban: ChannelId,
    pub nedopusk: ChannelId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Storage {
    pub punishments: PathBuf,
    pub appeals: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            punishments: PathBuf::from("data/punishments.json"),
            appeals: PathBuf::from("data/appeals.json"),
        }
    }
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| format!("Failed to open {}: {}", path.as_ref().display(), e))?;

        let cfg: Config = serde_yaml::from_reader(file)?;

        cfg.validate()?;

        Ok(cfg)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let cfg: Config = serde_yaml::from_str(contents)?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// The platform role mapped to a role-tag, if the deployment maps it.
    pub fn role(&self, tag: &str) -> Option<RoleId> {
        self.roles.get(tag).copied()
    }

    /// Reverse lookup: the manageable role-tag behind a platform role.
    /// Only tags present in `role_levels` participate.
    pub fn role_tag_by_id(&self, id: RoleId) -> Option<&str> {
        self.roles
            .iter()
            .find(|(tag, rid)| **rid == id && self.role_levels.contains_key(*tag))
            .map(|(tag, _)| tag.as_str())
    }

    pub fn validate(&self) -> Result<(), Error> {
        for tag in REQUIRED_TAGS {
            if !self.roles.contains_key(*tag) {
                return Err(format!("config.roles is missing required tag '{}'", tag).into());
            }
        }

        let mut seen: IndexMap<RoleId, &str> = IndexMap::new();
        for (tag, id) in &self.roles {
            if let Some(other) = seen.insert(*id, tag.as_str()) {
                return Err(format!(
                    "config.roles maps '{}' and '{}' to the same role id {}",
                    tag, other, id
                )
                .into());
            }
        }

        for (tag, meta) in &self.role_levels {
            if !self.roles.contains_key(tag) {
                return Err(format!(
                    "config.role_levels entry '{}' has no role id in config.roles",
                    tag
                )
                .into());
            }

            if !(1..=7).contains(&meta.level) {
                return Err(format!(
                    "config.role_levels entry '{}' has out-of-range level {}",
                    tag, meta.level
                )
                .into());
            }

            if meta.branch != GLOBAL_BRANCH && !BRANCHES.contains(&meta.branch.as_str()) {
                return Err(format!(
                    "config.role_levels entry '{}' names unknown branch '{}'",
                    tag, meta.branch
                )
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> String {
        let mut yaml = String::from("appeal_queues:\n  ban: 500\n  nedopusk: 501\nroles:\n");
        for (i, tag) in REQUIRED_TAGS.iter().enumerate() {
            yaml.push_str(&format!("  {}: {}\n", tag, 1000 + i));
        }
        yaml
    }

    #[test]
    fn test_minimal_config_loads() {
        let cfg = Config::from_yaml(&minimal_yaml()).unwrap();
        assert_eq!(cfg.role("ban"), Some(RoleId::new(1008)));
        assert_eq!(cfg.role("warn_support"), None);
        assert_eq!(cfg.storage.punishments, PathBuf::from("data/punishments.json"));
    }

    #[test]
    fn test_missing_required_tag_rejected() {
        let yaml = "roles:\n  owner: 1\nappeal_queues:\n  ban: 2\n  nedopusk: 3\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("missing required tag"));
    }

    #[test]
    fn test_duplicate_role_id_rejected() {
        let mut yaml = minimal_yaml();
        yaml.push_str("  warn_support: 1000\n"); // collides with the first required tag
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("same role id"));
    }

    #[test]
    fn test_role_levels_validation() {
        let mut yaml = minimal_yaml();
        yaml.push_str("  rolControl: 2000\nrole_levels:\n  rolControl:\n    level: 9\n    branch: global\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("out-of-range level"));

        let mut yaml = minimal_yaml();
        yaml.push_str("  rolControl: 2000\nrole_levels:\n  rolControl:\n    level: 2\n    branch: nosuchbranch\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown branch"));

        let mut yaml = minimal_yaml();
        yaml.push_str("role_levels:\n  ghost:\n    level: 2\n    branch: support\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("no role id"));
    }

    #[test]
    fn test_role_tag_by_id_only_covers_managed_tags() {
        let mut yaml = minimal_yaml();
        yaml.push_str("  helper: 2000\nrole_levels:\n  helper:\n    level: 1\n    branch: support\n");
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.role_tag_by_id(RoleId::new(2000)), Some("helper"));
        // "owner" is mapped but carries no role_levels entry
        assert_eq!(cfg.role_tag_by_id(RoleId::new(1000)), None);
    }
}
