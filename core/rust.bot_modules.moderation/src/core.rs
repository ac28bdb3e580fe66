use chrono::{DateTime, Utc};

use config::Config;
use tribunal::punishments::PunishmentCategory;
use tribunalcore_rs::ids::RoleId;

/// Which channel family a mute silences. Text and voice mutes are
/// independent punishments backed by different roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteKind {
    Text,
    Voice,
}

impl MuteKind {
    pub fn category(&self) -> PunishmentCategory {
        match self {
            MuteKind::Text => PunishmentCategory::MuteText,
            MuteKind::Voice => PunishmentCategory::MuteVoice,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MuteKind::Text => "text",
            MuteKind::Voice => "voice",
        }
    }
}

/// Gender roles handed out at verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn role_tag(&self) -> &'static str {
        match self {
            Gender::Male => "verif_male",
            Gender::Female => "verif_female",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// The warn tier is decided by the target, not the actor: members
/// holding the moderator tag answer to the moderator warning.
pub fn warn_category_for(config: &Config, target_roles: &[RoleId]) -> PunishmentCategory {
    if permissions::has_tag(config, target_roles, "moderator") {
        PunishmentCategory::ModeratorWarn
    } else {
        PunishmentCategory::SupportWarn
    }
}

/// DM sent when a punishment lands.
pub fn punished_dm(label: &str, reason: &str, expires_at: Option<DateTime<Utc>>) -> String {
    let mut message = format!("You have received a {}.\nReason: {}", label, reason);

    if let Some(expires_at) = expires_at {
        message.push_str(&format!(
            "\nExpires: {}",
            expires_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    message
}

/// DM sent when a punishment is lifted early.
pub fn lifted_dm(label: &str, reason: &str) -> String {
    format!("Your {} has been lifted.\nReason: {}", label, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_tier_follows_target_roles() {
        let config = Config::from_yaml(
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
            warn_category_for(&config, &[RoleId::new(6)]),
            PunishmentCategory::ModeratorWarn
        );
        assert_eq!(
            warn_category_for(&config, &[RoleId::new(7)]),
            PunishmentCategory::SupportWarn
        );
        assert_eq!(
            warn_category_for(&config, &[]),
            PunishmentCategory::SupportWarn
        );
    }

    #[test]
    fn test_dm_texts() {
        let dm = punished_dm("ban", "raiding", None);
        assert_eq!(dm, "You have received a ban.\nReason: raiding");

        let expires = Utc::now() + chrono::Duration::hours(1);
        let dm = punished_dm("text mute", "spam", Some(expires));
        assert!(dm.contains("Expires:"));

        assert_eq!(
            lifted_dm("warning", "appealed"),
            "Your warning has been lifted.\nReason: appealed"
        );
    }
}
