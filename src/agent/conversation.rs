use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::artifacts::{Artifact, ArtifactChannel};

/// One event emitted by the reasoning loop while it answers a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentMessage { content: String },
    ToolMessage { tool: String, content: String },
    Error { message: String },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnOutput {
    pub reply: String,
    pub errors: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct Turn {
    reply: String,
    errors: Vec<String>,
    done: bool,
}

/// Chat history plus the state of the turn in progress.
pub struct Conversation {
    system_prompt: String,
    history: Vec<ChatMessage>,
    artifacts: ArtifactChannel,
    turn: Option<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>, artifacts: ArtifactChannel) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            artifacts,
            turn: None,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn artifacts(&self) -> ArtifactChannel {
        self.artifacts.clone()
    }

    pub fn begin_turn(&mut self, user_message: &str) {
        if self.history.is_empty() {
            self.history
                .push(ChatMessage::new(Role::System, self.system_prompt.clone()));
        }
        self.history.push(ChatMessage::new(Role::User, user_message));
        self.turn = Some(Turn::default());
    }

    /// Fold one event into the turn. Returns the text to stream to the user,
    /// if any.
    pub fn apply(&mut self, event: AgentEvent) -> Option<String> {
        let turn = self.turn.get_or_insert_with(Turn::default);
        if turn.done {
            debug!(?event, "event after done ignored");
            return None;
        }
        match event {
            AgentEvent::AgentMessage { content } => {
                turn.reply.push_str(&content);
                self.history
                    .push(ChatMessage::new(Role::Assistant, content.clone()));
                Some(content)
            }
            AgentEvent::ToolMessage { tool, content } => {
                self.history.push(ChatMessage {
                    role: Role::Tool,
                    content: content.clone(),
                    name: Some(tool),
                });
                Some(content)
            }
            AgentEvent::Error { message } => {
                warn!(error = %message, "agent error");
                turn.errors.push(message);
                None
            }
            AgentEvent::Done => {
                turn.done = true;
                None
            }
        }
    }

    /// Close the turn and drain the artifacts produced during it.
    pub async fn finish_turn(&mut self) -> TurnOutput {
        let turn = self.turn.take().unwrap_or_default();
        TurnOutput {
            reply: turn.reply,
            errors: turn.errors,
            artifacts: self.artifacts.take().await,
            completed: turn.done,
        }
    }
}

/// Parse newline-delimited JSON events; blank lines are skipped.
pub fn parse_events(input: &str) -> Result<Vec<AgentEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_kind_tag() {
        let event = AgentEvent::ToolMessage {
            tool: "batch_scrape".to_string(),
            content: "[]".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"tool_message","tool":"batch_scrape","content":"[]"}"#
        );
        assert_eq!(serde_json::to_string(&AgentEvent::Done).unwrap(), r#"{"kind":"done"}"#);
    }

    #[tokio::test]
    async fn turn_folds_events_into_history() {
        let channel = ArtifactChannel::new();
        let mut conv = Conversation::new("You are an ESI assistant.", channel.clone());
        conv.begin_turn("What sample size do I need?");

        assert_eq!(
            conv.apply(AgentEvent::ToolMessage {
                tool: "python_sandbox".to_string(),
                content: "n = 64".to_string()
            })
            .as_deref(),
            Some("n = 64")
        );
        assert_eq!(
            conv.apply(AgentEvent::AgentMessage {
                content: "About 64 per group.".to_string()
            })
            .as_deref(),
            Some("About 64 per group.")
        );
        assert_eq!(
            conv.apply(AgentEvent::Error {
                message: "search quota exceeded".to_string()
            }),
            None
        );
        channel
            .push(Artifact::new("power.png", "image/png", vec![1]))
            .await;
        assert_eq!(conv.apply(AgentEvent::Done), None);
        assert_eq!(
            conv.apply(AgentEvent::AgentMessage {
                content: "late".to_string()
            }),
            None
        );

        let out = conv.finish_turn().await;
        assert_eq!(out.reply, "About 64 per group.");
        assert_eq!(out.errors, vec!["search quota exceeded"]);
        assert_eq!(out.artifacts.len(), 1);
        assert!(out.completed);
        assert!(channel.take().await.is_empty());

        let roles: Vec<Role> = conv.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Tool, Role::Assistant]);
        assert_eq!(conv.history()[2].name.as_deref(), Some("python_sandbox"));
    }

    #[tokio::test]
    async fn system_prompt_is_added_once() {
        let mut conv = Conversation::new("sys", ArtifactChannel::new());
        conv.begin_turn("one");
        conv.finish_turn().await;
        conv.begin_turn("two");
        let out = conv.finish_turn().await;
        assert!(!out.completed);

        let system_count = conv
            .history()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(conv.history().len(), 3);
    }

    #[test]
    fn parses_jsonl_and_reports_bad_lines() {
        let input = "{\"kind\":\"agent_message\",\"content\":\"hi\"}\n\n{\"kind\":\"done\"}\n";
        let events = parse_events(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], AgentEvent::Done);

        let err = parse_events("{\"kind\":\"done\"}\n{\"kind\":\"shout\"}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
