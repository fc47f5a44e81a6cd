use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::platform::jid::owns_jid;
use crate::platform::typing::TYPING_REFRESH_INTERVAL;
use crate::platform::RegisteredGroup;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default = "default_typing_interval_secs")]
    pub typing_interval_secs: u64,
}

/// A `[[groups]]` entry: one bridged Discord channel.
#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub jid: String,
    #[serde(flatten)]
    pub group: RegisteredGroup,
}

fn default_typing_interval_secs() -> u64 {
    TYPING_REFRESH_INTERVAL.as_secs()
}

impl DiscordConfig {
    pub fn typing_interval(&self) -> Duration {
        Duration::from_secs(self.typing_interval_secs)
    }
}

impl Config {
    /// Registered groups keyed by bridge JID.
    pub fn registered_groups(&self) -> HashMap<String, RegisteredGroup> {
        self.groups
            .iter()
            .map(|g| (g.jid.clone(), g.group.clone()))
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;

        if config.discord.bot_token.trim().is_empty() {
            bail!("discord.bot_token must not be empty");
        }
        if config.discord.typing_interval_secs == 0 {
            bail!("discord.typing_interval_secs must be greater than zero");
        }
        for group in &config.groups {
            if !owns_jid(&group.jid) {
                bail!("Group '{}' has a non-Discord JID: {}", group.group.name, group.jid);
            }
        }

        Ok(config)
    }
}
