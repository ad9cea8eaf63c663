use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::settings::AgentSettings;

const GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-1.5-pro", "gemini-1.5-flash"];

#[derive(Error, Debug, PartialEq)]
pub enum ProviderError {
    #[error("{env} environment variable is required for provider {provider}")]
    MissingApiKey {
        provider: ProviderKind,
        env: &'static str,
    },

    #[error("invalid base URL for provider {provider}: {url}")]
    InvalidBaseUrl { provider: ProviderKind, url: String },
}

/// Hosted LLM families the agent can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl ProviderKind {
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GOOGLE_API_KEY",
            ProviderKind::OpenAiCompatible => "OPENAI_API_KEY",
        }
    }

    pub fn base_url_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GOOGLE_API_BASE_URL",
            ProviderKind::OpenAiCompatible => "OPENAI_BASE_URL",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenAiCompatible => "https://api.openai.com/v1",
        }
    }

    /// Models offered in the settings panel. `None` means any model name is accepted.
    pub fn known_models(&self) -> Option<&'static [&'static str]> {
        match self {
            ProviderKind::Gemini => Some(GEMINI_MODELS),
            ProviderKind::OpenAiCompatible => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

/// Resolved connection details for the hosted model.
#[derive(Debug, Clone)]
pub struct ChatBackend {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
}

impl ChatBackend {
    pub fn completions_url(&self) -> String {
        match self.provider {
            ProviderKind::Gemini => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
            ProviderKind::OpenAiCompatible => format!("{}/chat/completions", self.base_url),
        }
    }

    /// Key with everything but the last four characters hidden, for logs.
    pub fn masked_key(&self) -> String {
        let len = self.api_key.chars().count();
        if len <= 8 {
            return "<hidden>".to_string();
        }
        let tail: String = self.api_key.chars().skip(len - 4).collect();
        format!("****{}", tail)
    }
}

/// Build the chat backend for the configured provider. `lookup` resolves
/// environment variables so callers can inject a fixed environment.
pub fn build_chat_backend<F>(
    settings: &AgentSettings,
    lookup: F,
) -> Result<ChatBackend, ProviderError>
where
    F: Fn(&str) -> Option<String>,
{
    let provider = settings.provider;
    let api_key = lookup(provider.api_key_env())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::MissingApiKey {
            provider,
            env: provider.api_key_env(),
        })?;

    let base_url = lookup(provider.base_url_env())
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| provider.default_base_url().to_string());

    match url::Url::parse(&base_url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        _ => {
            return Err(ProviderError::InvalidBaseUrl {
                provider,
                url: base_url,
            })
        }
    }

    Ok(ChatBackend {
        provider,
        model: settings.model.clone(),
        base_url,
        api_key,
        temperature: settings.temperature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn gemini_backend_uses_generate_content_endpoint() {
        let settings = AgentSettings::default();
        let backend =
            build_chat_backend(&settings, env(&[("GOOGLE_API_KEY", "g-key-123456")])).unwrap();
        assert_eq!(backend.provider, ProviderKind::Gemini);
        assert_eq!(
            backend.completions_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(backend.masked_key(), "****3456");
    }

    #[test]
    fn openai_backend_honours_base_url_override() {
        let settings = AgentSettings {
            provider: ProviderKind::OpenAiCompatible,
            model: "gpt-4o-mini".to_string(),
            ..AgentSettings::default()
        };
        let backend = build_chat_backend(
            &settings,
            env(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ]),
        )
        .unwrap();
        assert_eq!(
            backend.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = build_chat_backend(&AgentSettings::default(), env(&[])).unwrap_err();
        assert_eq!(
            err,
            ProviderError::MissingApiKey {
                provider: ProviderKind::Gemini,
                env: "GOOGLE_API_KEY"
            }
        );
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn provider_kind_round_trips_through_config_names() {
        let kind: ProviderKind = serde_json::from_str("\"openai_compatible\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAiCompatible);
        assert_eq!(kind.to_string(), "openai_compatible");
        assert_eq!(serde_json::to_string(&ProviderKind::Gemini).unwrap(), "\"gemini\"");
    }
}
