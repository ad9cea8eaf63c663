use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI research assistant. You have access to web search and academic paper search tools.

Your capabilities include:
1. Searching the web for current information
2. Finding academic papers and research
3. Reading and comparing web pages with the scraping tools
4. Providing comprehensive, well-researched answers

Always cite your sources and provide accurate, helpful information.";

/// Read the system prompt from `path`, falling back to the built-in prompt
/// when the file is missing or empty.
pub fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            info!(path = %path.display(), bytes = contents.len(), "loaded system prompt");
            contents
        }
        Ok(_) => {
            warn!(path = %path.display(), "system prompt file is empty, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            info!(
                path = %path.display(),
                error = %e,
                "system prompt file unavailable, using default"
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Starter {
    pub label: &'static str,
    pub message: &'static str,
    pub icon: &'static str,
}

/// Conversation starters offered on an empty chat.
pub fn starters() -> Vec<Starter> {
    vec![
        Starter {
            label: "New topic",
            message: "Can you help me to identify a new research topic or question for my dissertation?",
            icon: "public/idea.svg",
        },
        Starter {
            label: "Refine hypotheses",
            message: "I already know my research question but I need help developing my hypotheses",
            icon: "public/research.svg",
        },
        Starter {
            label: "Design the study",
            message: "I need help with my study design",
            icon: "public/plan.svg",
        },
        Starter {
            label: "Data analysis",
            message: "I've collected my data but I need help with my analysis",
            icon: "public/data.svg",
        },
        Starter {
            label: "What can you do?",
            message: "Explain what you can do, and how you can help me with my dissertation",
            icon: "public/ai.svg",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_prompt_file_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esi_agent_instruction.md");
        std::fs::write(&path, "You are ESI.").unwrap();
        assert_eq!(load_system_prompt(&path), "You are ESI.");
    }

    #[test]
    fn falls_back_for_missing_or_blank_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.md");
        assert_eq!(load_system_prompt(&missing), DEFAULT_SYSTEM_PROMPT);

        let blank = dir.path().join("blank.md");
        std::fs::write(&blank, "  \n").unwrap();
        assert_eq!(load_system_prompt(&blank), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn five_starters_with_icons() {
        let all = starters();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|s| s.icon.starts_with("public/")));
    }
}
