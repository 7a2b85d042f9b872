// SPDX-License-Identifier: MIT

//! Agent reply parsing
//!
//! Chat services answer in a handful of shapes. [`AgentReply`] lists them in
//! the order they are tried; the first one that deserializes wins and yields
//! the reply text. The text is then searched for a completion envelope.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

/// Speaker of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the agent conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Known reply shapes, in priority order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AgentReply {
    /// Bare string
    Text(String),
    /// `{"choices": [{"message": {"content": ...}}]}`
    Choices { choices: Vec<Choice> },
    /// `{"content": [{"type": "text", "text": ...}]}`
    Blocks { content: Vec<ContentBlock> },
    /// `{"message": {"content": ...}}`
    Message { message: ChoiceMessage },
    /// `{"content": "..."}`
    Content { content: String },
    /// `{"text": "..."}`
    TextField { text: String },
    /// `{"response": "..."}`
    Response { response: String },
    /// `{"output": "..."}`
    Output { output: String },
}

impl AgentReply {
    pub fn text(self) -> Option<String> {
        match self {
            AgentReply::Text(text)
            | AgentReply::Content { content: text }
            | AgentReply::TextField { text }
            | AgentReply::Response { response: text }
            | AgentReply::Output { output: text } => Some(text),
            AgentReply::Choices { choices } => choices.into_iter().next()?.message.content,
            AgentReply::Message { message } => message.content,
            AgentReply::Blocks { content } => {
                let parts: Vec<String> = content
                    .into_iter()
                    .filter(|b| b.kind.as_deref().map_or(true, |k| k == "text"))
                    .filter_map(|b| b.text)
                    .collect();
                (!parts.is_empty()).then(|| parts.join("\n"))
            }
        }
    }
}

/// Reply text, if the reply has a recognizable shape
pub fn extract_text(reply: &Value) -> Option<String> {
    serde_json::from_value::<AgentReply>(reply.clone())
        .ok()
        .and_then(AgentReply::text)
}

/// Completion envelope an agent sends when it is done
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub completed: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    /// Output, defaulting to an empty map
    pub fn output_or_empty(&self) -> Value {
        match &self.output {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(output) => output.clone(),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Find an envelope in reply text: fenced blocks first, then the raw text
pub fn parse_envelope(text: &str) -> Option<Envelope> {
    let fenced = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| envelope_from_str(m.as_str()));
    fenced.or_else(|| envelope_from_str(text))
}

fn envelope_from_str(text: &str) -> Option<Envelope> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    envelope_from_value(&value)
}

/// An object carrying a boolean `completed` field
pub fn envelope_from_value(value: &Value) -> Option<Envelope> {
    if !value.get("completed").is_some_and(Value::is_boolean) {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

/// What one agent turn amounts to
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Envelope with `completed: true`
    Completed(Value),
    /// Envelope with `completed: false` and an error
    Failed(String),
    /// Keep talking; the text becomes the assistant turn
    Continue(String),
    /// Nothing usable; the parseable output is the answer
    Final(Value),
}

/// Classify a raw chat reply
pub fn classify(reply: &Value) -> TurnOutcome {
    let text = extract_text(reply).filter(|t| !t.trim().is_empty());
    let envelope = envelope_from_value(reply).or_else(|| text.as_deref().and_then(parse_envelope));

    match envelope {
        Some(env) if env.completed => TurnOutcome::Completed(env.output_or_empty()),
        // An agent that reports an error has failed, whatever partial output it sent
        Some(env) => match env.error_message() {
            Some(error) => TurnOutcome::Failed(error),
            None => match env.message.clone().filter(|m| !m.trim().is_empty()).or(text) {
                Some(message) => TurnOutcome::Continue(message),
                None => TurnOutcome::Final(env.output_or_empty()),
            },
        },
        None => match text {
            Some(message) => TurnOutcome::Continue(message),
            None => TurnOutcome::Final(
                reply
                    .get("output")
                    .filter(|o| !o.is_null())
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_shapes() {
        assert_eq!(extract_text(&json!("hi")), Some("hi".to_string()));
        assert_eq!(
            extract_text(&json!({"choices": [{"message": {"role": "assistant", "content": "a"}}]})),
            Some("a".to_string())
        );
        assert_eq!(
            extract_text(&json!({"content": [
                {"type": "text", "text": "b1"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "b2"}
            ]})),
            Some("b1\nb2".to_string())
        );
        assert_eq!(
            extract_text(&json!({"message": {"content": "c"}})),
            Some("c".to_string())
        );
        assert_eq!(extract_text(&json!({"content": "d"})), Some("d".to_string()));
        assert_eq!(extract_text(&json!({"text": "e"})), Some("e".to_string()));
        assert_eq!(extract_text(&json!({"response": "f"})), Some("f".to_string()));
        assert_eq!(extract_text(&json!({"output": "g"})), Some("g".to_string()));
        assert_eq!(extract_text(&json!({"unrelated": 1})), None);
        assert_eq!(extract_text(&json!(42)), None);
    }

    #[test]
    fn test_fenced_block_wins_over_prose() {
        let text = "Done! Here is the result:\n```json\n{\"completed\": true, \"output\": {\"id\": 7}}\n```\nBye.";
        let env = parse_envelope(text).unwrap();
        assert!(env.completed);
        assert_eq!(env.output_or_empty(), json!({"id": 7}));
    }

    #[test]
    fn test_raw_json_envelope() {
        let env = parse_envelope(r#" {"completed": false, "message": "step 1 done"} "#).unwrap();
        assert!(!env.completed);
        assert_eq!(env.message.as_deref(), Some("step 1 done"));
    }

    #[test]
    fn test_envelope_requires_boolean_completed() {
        assert!(parse_envelope(r#"{"completed": "yes"}"#).is_none());
        assert!(parse_envelope(r#"{"output": {}}"#).is_none());
        assert!(parse_envelope("not json at all").is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&json!({"completed": true})),
            TurnOutcome::Completed(json!({}))
        );
        assert_eq!(
            classify(&json!("```json\n{\"completed\": false, \"error\": \"no access\"}\n```")),
            TurnOutcome::Failed("no access".to_string())
        );
        assert_eq!(
            classify(&json!({"content": "working on it"})),
            TurnOutcome::Continue("working on it".to_string())
        );
        assert_eq!(
            classify(&json!({"output": {"partial": true}})),
            TurnOutcome::Final(json!({"partial": true}))
        );
        assert_eq!(classify(&json!(null)), TurnOutcome::Final(json!({})));
    }

    #[test]
    fn test_classify_incomplete_envelope() {
        assert_eq!(
            classify(&json!({"completed": false, "message": "need the repo name", "output": {"step": 1}})),
            TurnOutcome::Continue("need the repo name".to_string())
        );
        assert_eq!(
            classify(&json!({"completed": false, "output": {"step": 1}})),
            TurnOutcome::Final(json!({"step": 1}))
        );
        assert_eq!(
            classify(&json!({"completed": false, "error": "quota", "output": {"step": 1}})),
            TurnOutcome::Failed("quota".to_string())
        );
    }
}
