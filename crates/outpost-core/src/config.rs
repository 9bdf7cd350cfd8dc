use std::collections::HashMap;

use crate::error::OutpostError;
use crate::scenario::{ScenarioTag, RECRUITMENT_CHANNEL};

/// Channel ids resolved from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelIds {
    pub general: String,
    pub landing: String,
    pub leavers: String,
    pub recruitment: String,
    pub recruitment_forum: String,
    pub recruitment_hub: String,
    pub hr: String,
}

impl ChannelIds {
    /// Resolve a logical channel name (as used in scenario allow-lists).
    pub fn resolve(&self, logical: &str) -> Option<&str> {
        match logical {
            RECRUITMENT_CHANNEL => Some(self.recruitment.as_str()),
            "general" => Some(self.general.as_str()),
            "landing" => Some(self.landing.as_str()),
            "leavers" => Some(self.leavers.as_str()),
            "recruitment_forum" => Some(self.recruitment_forum.as_str()),
            "recruitment_hub" => Some(self.recruitment_hub.as_str()),
            "hr" => Some(self.hr.as_str()),
            _ => None,
        }
    }

    /// The concrete channel ids a scenario restricts message counting to.
    /// Empty means unrestricted.
    pub fn allow_list_for(&self, scenario: ScenarioTag) -> Vec<String> {
        scenario
            .spec()
            .channel_allow_list
            .iter()
            .filter_map(|name| self.resolve(name))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether message-family counting is allowed in `channel_id` for the
    /// scenario. An unconfigured allow-list admits everything; a configured
    /// list that resolves to no ids admits nothing.
    pub fn is_channel_allowed(&self, scenario: ScenarioTag, channel_id: &str) -> bool {
        if scenario.spec().channel_allow_list.is_empty() {
            return true;
        }
        self.allow_list_for(scenario)
            .iter()
            .any(|id| id == channel_id)
    }
}

/// Role ids resolved from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIds {
    pub member: String,
    pub recruit: String,
    pub guest: String,
    pub absentee: String,
    pub server_clown: String,
    pub blue: String,
    pub newcomer: String,
    pub authenticated_guest: String,
    pub authenticated_member: String,
    pub mining: String,
    pub industry: String,
    pub pve: String,
    pub pvp: String,
    pub fw: String,
}

impl RoleIds {
    /// Roles granted on corporation acceptance and stripped on departure.
    pub fn content_notification(&self) -> Vec<String> {
        vec![
            self.mining.clone(),
            self.industry.clone(),
            self.pve.clone(),
            self.pvp.clone(),
            self.fw.clone(),
        ]
    }
}

/// Static process configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub guild_id: String,
    pub store_path: String,
    pub channels: ChannelIds,
    pub roles: RoleIds,
}

impl BotConfig {
    /// Load from the process environment. Missing required variables are a
    /// startup-fatal configuration error.
    pub fn from_env() -> Result<Self, OutpostError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&env)
    }

    /// Load from an explicit map (used by tests).
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self, OutpostError> {
        let require = |key: &str| -> Result<String, OutpostError> {
            match env.get(key) {
                Some(v) if !v.is_empty() => Ok(v.clone()),
                _ => Err(OutpostError::Config(format!("missing env var {key}"))),
            }
        };
        let optional = |key: &str| env.get(key).cloned().unwrap_or_default();

        Ok(Self {
            bot_token: require("BOT_TOKEN")?,
            guild_id: require("GUILD_ID")?,
            store_path: require("STORE_PATH")?,
            channels: ChannelIds {
                general: optional("GENERAL_CHANNEL_ID"),
                landing: optional("LANDING_CHANNEL_ID"),
                leavers: optional("LEAVERS_CHANNEL_ID"),
                recruitment: optional("RECRUITMENT_CHANNEL_ID"),
                recruitment_forum: optional("RECRUITMENT_FORUM_ID"),
                recruitment_hub: optional("RECRUITMENT_HUB_ID"),
                hr: optional("HR_CHANNEL_ID"),
            },
            roles: RoleIds {
                member: optional("MEMBER_ROLE_ID"),
                recruit: optional("RECRUIT_ROLE_ID"),
                guest: optional("GUEST_ROLE_ID"),
                absentee: optional("ABSENTEE_ROLE_ID"),
                server_clown: optional("SERVER_CLOWN_ROLE_ID"),
                blue: optional("BLUE_ROLE_ID"),
                newcomer: optional("NEWCOMER_ROLE_ID"),
                authenticated_guest: optional("AUTHENTICATED_GUEST_ROLE_ID"),
                authenticated_member: optional("AUTHENTICATED_MEMBER_ROLE_ID"),
                mining: optional("MINING_ROLE_ID"),
                industry: optional("INDUSTRY_ROLE_ID"),
                pve: optional("PVE_ROLE_ID"),
                pvp: optional("PVP_ROLE_ID"),
                fw: optional("FW_ROLE_ID"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_env() -> HashMap<String, String> {
        env(&[
            ("BOT_TOKEN", "tok"),
            ("GUILD_ID", "g1"),
            ("STORE_PATH", "/tmp/outpost.db"),
            ("RECRUITMENT_CHANNEL_ID", "c-recruit"),
            ("GENERAL_CHANNEL_ID", "c-general"),
        ])
    }

    #[test]
    fn missing_required_var_fails() {
        let mut e = base_env();
        e.remove("BOT_TOKEN");
        let err = BotConfig::from_env_map(&e).unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    fn loads_required_and_optional() {
        let cfg = BotConfig::from_env_map(&base_env()).unwrap();
        assert_eq!(cfg.guild_id, "g1");
        assert_eq!(cfg.channels.recruitment, "c-recruit");
        assert_eq!(cfg.channels.hr, "");
    }

    #[test]
    fn recruitment_process_allow_list_resolves() {
        let cfg = BotConfig::from_env_map(&base_env()).unwrap();
        assert_eq!(
            cfg.channels.allow_list_for(ScenarioTag::RecruitmentProcess),
            vec!["c-recruit".to_string()]
        );
        assert!(cfg
            .channels
            .is_channel_allowed(ScenarioTag::RecruitmentProcess, "c-recruit"));
        assert!(!cfg
            .channels
            .is_channel_allowed(ScenarioTag::RecruitmentProcess, "c-general"));
    }

    #[test]
    fn unresolved_allow_list_admits_nothing() {
        let mut e = base_env();
        e.remove("RECRUITMENT_CHANNEL_ID");
        let cfg = BotConfig::from_env_map(&e).unwrap();
        assert!(!cfg
            .channels
            .is_channel_allowed(ScenarioTag::RecruitmentProcess, "c-recruit"));
    }

    #[test]
    fn unrestricted_scenario_allows_any_channel() {
        let cfg = BotConfig::from_env_map(&base_env()).unwrap();
        assert!(cfg.channels.allow_list_for(ScenarioTag::NewRecruit).is_empty());
        assert!(cfg
            .channels
            .is_channel_allowed(ScenarioTag::NewRecruit, "anything"));
    }

    #[test]
    fn content_notification_roles_in_grant_order() {
        let mut e = base_env();
        for (k, v) in [
            ("MINING_ROLE_ID", "r1"),
            ("INDUSTRY_ROLE_ID", "r2"),
            ("PVE_ROLE_ID", "r3"),
            ("PVP_ROLE_ID", "r4"),
            ("FW_ROLE_ID", "r5"),
        ] {
            e.insert(k.into(), v.into());
        }
        let cfg = BotConfig::from_env_map(&e).unwrap();
        assert_eq!(cfg.roles.content_notification(), vec!["r1", "r2", "r3", "r4", "r5"]);
    }
}
