use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provider::ProviderKind;

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("temperature {0} is outside the allowed range 0.0..=2.0")]
    Temperature(f32),

    #[error("model name must not be empty")]
    EmptyModel,

    #[error("model '{model}' is not offered by provider {provider}")]
    UnknownModel {
        provider: ProviderKind,
        model: String,
    },
}

/// Per-chat agent settings exposed in the settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            temperature: default_temperature(),
            include_sources: default_include_sources(),
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(SettingsError::Temperature(self.temperature));
        }
        let model = self.model.trim();
        if model.is_empty() {
            return Err(SettingsError::EmptyModel);
        }
        if let Some(models) = self.provider.known_models() {
            if !models.iter().any(|m| *m == model) {
                return Err(SettingsError::UnknownModel {
                    provider: self.provider,
                    model: model.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Confirmation shown to the user after the settings change.
    pub fn summary(&self) -> String {
        format!(
            "Settings updated successfully!\n- Temperature: {}\n- Model: {}\n- Include sources: {}\n",
            self.temperature, self.model, self.include_sources
        )
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_include_sources() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = AgentSettings::default();
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert!(settings.include_sources);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let settings = AgentSettings {
            temperature: 2.5,
            ..AgentSettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::Temperature(2.5)));
    }

    #[test]
    fn gemini_only_accepts_listed_models() {
        let settings = AgentSettings {
            model: "gemini-ultra-9".to_string(),
            ..AgentSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::UnknownModel { .. })
        ));

        let custom = AgentSettings {
            provider: ProviderKind::OpenAiCompatible,
            model: "llama-3.1-70b".to_string(),
            ..AgentSettings::default()
        };
        assert!(custom.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: AgentSettings = serde_json::from_str(r#"{"temperature": 0.4}"#).unwrap();
        assert_eq!(settings.temperature, 0.4);
        assert_eq!(settings.provider, ProviderKind::Gemini);
        assert!(settings.summary().contains("- Temperature: 0.4"));
    }
}
