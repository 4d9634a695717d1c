//! Configuration validation, run at load time and before UpdateSettings is
//! accepted.

use std::collections::HashSet;

use anyhow::{Result, bail};

use super::AppConfig;

pub fn validate(config: &AppConfig) -> Result<()> {
    if config.model.is_empty() {
        bail!("model must not be empty");
    }
    if config.startup_volume > 10 {
        bail!("startupVolume must be between 0 and 10");
    }
    if config.session_timeout_minutes == 0 {
        bail!("sessionTimeoutMinutes must be at least 1");
    }
    if config.conversation_inactivity_timeout_seconds == 0 {
        bail!("conversationInactivityTimeoutSeconds must be at least 1");
    }
    if config.memory_cap == 0 {
        bail!("memoryCap must be at least 1");
    }
    if config.agents.is_empty() {
        bail!("at least one agent must be configured");
    }

    let mut wake_models = HashSet::new();
    for agent in &config.agents {
        if agent.name.is_empty() {
            bail!("agent name must not be empty");
        }
        if agent.wake_word_model.is_empty() {
            bail!("agent '{}': wakeWordModel must not be empty", agent.name);
        }
        if !wake_models.insert(&agent.wake_word_model) {
            bail!(
                "wake word model '{}' is assigned to more than one agent",
                agent.wake_word_model
            );
        }
        if !(0.1..=0.9).contains(&agent.wake_word_threshold) {
            bail!(
                "agent '{}': wakeWordThreshold {} outside [0.1, 0.9]",
                agent.name,
                agent.wake_word_threshold
            );
        }
        if !(1..=10).contains(&agent.wake_word_trigger_level) {
            bail!(
                "agent '{}': wakeWordTriggerLevel {} outside [1, 10]",
                agent.name,
                agent.wake_word_trigger_level
            );
        }
        if let Some(temperature) = agent.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                bail!(
                    "agent '{}': temperature {} outside [0.0, 2.0]",
                    agent.name,
                    temperature
                );
            }
        }
        if agent.voice.is_empty() {
            bail!("agent '{}': voice must not be empty", agent.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    #[test]
    fn test_threshold_bounds() {
        let mut config = AppConfig::default();
        config.agents[0].wake_word_threshold = 0.1;
        validate(&config).unwrap();
        config.agents[0].wake_word_threshold = 0.9;
        validate(&config).unwrap();
        config.agents[0].wake_word_threshold = 0.05;
        assert!(validate(&config).is_err());
        config.agents[0].wake_word_threshold = 0.95;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_trigger_level_bounds() {
        let mut config = AppConfig::default();
        config.agents[0].wake_word_trigger_level = 1;
        validate(&config).unwrap();
        config.agents[0].wake_word_trigger_level = 10;
        validate(&config).unwrap();
        config.agents[0].wake_word_trigger_level = 0;
        assert!(validate(&config).is_err());
        config.agents[0].wake_word_trigger_level = 11;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_wake_models_rejected() {
        let mut config = AppConfig::default();
        config.agents.push(AgentConfig::default());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_agent_list_rejected() {
        let mut config = AppConfig::default();
        config.agents.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_volume_bound() {
        let mut config = AppConfig::default();
        config.startup_volume = 11;
        assert!(validate(&config).is_err());
    }
}
