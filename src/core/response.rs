//! Staged parsing of the decision layer's free-text reply.
//!
//! Replies are supposed to be a JSON object with either `selected_action`
//! or `action_sequence`, but models wrap them in prose and code fences or
//! break the JSON outright. Each stage is tried in turn; the last one always
//! succeeds with a fixed safe action, so parsing never fails.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::action::{Action, ActionInput, Pointer};

/// Longest action sequence accepted from one reply.
pub const MAX_SEQUENCE: usize = 5;

/// Action used when nothing could be extracted.
pub const DEFAULT_ACTION: Action = Action::Up;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ParseStage {
    Json,
    CodeBlock,
    BraceObject,
    TextPattern,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParsedDecision {
    /// Never empty.
    pub commands: Vec<ActionInput>,
    pub stage: ParseStage,
    pub reasoning: Option<String>,
}

impl ParsedDecision {
    fn fallback() -> Self {
        Self {
            commands: vec![ActionInput::new(DEFAULT_ACTION)],
            stage: ParseStage::Default,
            reasoning: None,
        }
    }
}

pub fn parse_decision(text: &str) -> ParsedDecision {
    let trimmed = text.trim();

    if let Some(d) = from_json_text(trimmed, ParseStage::Json) {
        return d;
    }
    for block in fenced_blocks(trimmed) {
        if let Some(d) = from_json_text(block, ParseStage::CodeBlock) {
            return d;
        }
    }
    for candidate in brace_objects(trimmed) {
        if let Some(d) = from_json_text(candidate, ParseStage::BraceObject) {
            return d;
        }
    }
    if let Some(commands) = from_text_patterns(trimmed) {
        return ParsedDecision {
            commands,
            stage: ParseStage::TextPattern,
            reasoning: None,
        };
    }

    debug!("decision reply unparseable; using default action");
    ParsedDecision::fallback()
}

fn from_json_text(text: &str, stage: ParseStage) -> Option<ParsedDecision> {
    let v: Value = serde_json::from_str(text.trim()).ok()?;
    let obj = v.as_object()?;

    let mut commands = Vec::new();
    if let Some(seq) = obj.get("action_sequence").and_then(Value::as_array) {
        commands.extend(seq.iter().filter_map(command_from_value));
    }
    if commands.is_empty() {
        if let Some(v) = obj.get("selected_action") {
            let pointer = obj.get("coordinates").and_then(pointer_from_value);
            if let Some(mut c) = command_from_value(v) {
                if c.pointer.is_none() {
                    c.pointer = pointer;
                }
                commands.push(c);
            }
        }
    }
    if commands.is_empty() {
        return None;
    }
    commands.truncate(MAX_SEQUENCE);

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(ParsedDecision {
        commands,
        stage,
        reasoning,
    })
}

fn playable(name: &str) -> Option<Action> {
    Action::from_action_str(name).filter(|a| *a != Action::Reset)
}

fn command_from_value(v: &Value) -> Option<ActionInput> {
    match v {
        Value::String(s) => playable(s).map(ActionInput::new),
        Value::Object(o) => {
            let action = o.get("action").and_then(Value::as_str).and_then(playable)?;
            let pointer = o.get("coordinates").and_then(pointer_from_value);
            Some(ActionInput { action, pointer })
        }
        _ => None,
    }
}

fn pointer_from_value(v: &Value) -> Option<Pointer> {
    let arr = v.as_array()?;
    let x = arr.first()?.as_u64()?;
    let y = arr.get(1)?.as_u64()?;
    Some(Pointer::new(
        usize::try_from(x).ok()?,
        usize::try_from(y).ok()?,
    ))
}

/// Contents of ``` fenced blocks, with an optional language tag removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(end) = after.find("```") else {
            break;
        };
        let body = &after[..end];
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].trim_start().starts_with('{') => &body[nl + 1..],
            _ => body,
        };
        out.push(body.trim());
        rest = &after[end + 3..];
    }
    out
}

/// Top-level `{ ... }` spans, respecting JSON strings.
fn brace_objects(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_str = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_str {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_str = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Value following `key` and a `:` separator, stripped of quotes.
fn value_after<'a>(lower: &'a str, key: &str) -> Option<&'a str> {
    let idx = lower.find(key)?;
    let rest = lower[idx + key.len()..].trim_start_matches(['"', '\'']);
    let rest = rest.trim_start().strip_prefix(':')?;
    let rest = rest.trim_start().trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn from_text_patterns(text: &str) -> Option<Vec<ActionInput>> {
    let lower = text.to_ascii_lowercase();

    for key in ["selected_action", "\"action\"", "action"] {
        if let Some(a) = value_after(&lower, key).and_then(playable) {
            return Some(vec![ActionInput::new(a)]);
        }
    }

    if let Some(idx) = lower.find("action_sequence") {
        let rest = &lower[idx..];
        if let (Some(open), Some(close)) = (rest.find('['), rest.find(']')) {
            if open < close {
                let items: Vec<ActionInput> = rest[open + 1..close]
                    .split(',')
                    .filter_map(|s| playable(s.trim().trim_matches(['"', '\''])))
                    .map(ActionInput::new)
                    .take(MAX_SEQUENCE)
                    .collect();
                if !items.is_empty() {
                    return Some(items);
                }
            }
        }
    }

    // Bare action word anywhere in the text.
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|w| match w {
            "up" | "down" | "left" | "right" | "space" | "click" => playable(w),
            _ => None,
        })
        .map(|a| vec![ActionInput::new(a)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(d: &ParsedDecision) -> Vec<Action> {
        d.commands.iter().map(|c| c.action).collect()
    }

    #[test]
    fn strict_json() {
        let d = parse_decision(r#"{"selected_action": "left", "reasoning": "wall ahead"}"#);
        assert_eq!(d.stage, ParseStage::Json);
        assert_eq!(actions(&d), vec![Action::Left]);
        assert_eq!(d.reasoning.as_deref(), Some("wall ahead"));
    }

    #[test]
    fn sequence_with_coordinates_is_capped() {
        let d = parse_decision(
            r#"{"action_sequence": ["up", {"action": "click", "coordinates": [12, 30]},
                "down", "down", "left", "right", "up"]}"#,
        );
        assert_eq!(d.commands.len(), MAX_SEQUENCE);
        assert_eq!(d.commands[1].pointer, Some(Pointer::new(12, 30)));
    }

    #[test]
    fn fenced_block() {
        let d = parse_decision("Here you go:\n```json\n{\"action_sequence\": [\"up\", \"left\"]}\n```");
        assert_eq!(d.stage, ParseStage::CodeBlock);
        assert_eq!(actions(&d), vec![Action::Up, Action::Left]);
    }

    #[test]
    fn object_embedded_in_prose() {
        let d = parse_decision(
            r#"I think {"note": "x"} is irrelevant, but {"selected_action": "space", "meta": {"k": "}"}} works"#,
        );
        assert_eq!(d.stage, ParseStage::BraceObject);
        assert_eq!(actions(&d), vec![Action::Space]);
    }

    #[test]
    fn broken_json_falls_to_text_patterns() {
        let d = parse_decision(r#"{"selected_action": "right", "reasoning": "unterminated"#);
        assert_eq!(d.stage, ParseStage::TextPattern);
        assert_eq!(actions(&d), vec![Action::Right]);

        let d = parse_decision(r#"action_sequence: ["down", "jump", "left"]"#);
        assert_eq!(actions(&d), vec![Action::Down, Action::Left]);
    }

    #[test]
    fn garbage_uses_safe_default() {
        let d = parse_decision("I am not sure what to do here.");
        assert_eq!(d.stage, ParseStage::Default);
        assert_eq!(actions(&d), vec![DEFAULT_ACTION]);
        assert_eq!(parse_decision("").stage, ParseStage::Default);
    }

    #[test]
    fn invalid_action_names_are_ignored() {
        let d = parse_decision(r#"{"selected_action": "teleport"}"#);
        assert_ne!(d.stage, ParseStage::Json);
    }
}
