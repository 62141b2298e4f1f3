use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, TextArgSpec, FOLLOW_UP_ACTION, NO_ARG_COMMANDS, TEXT_ARG_COMMANDS,
    URL_PAIR_COMMANDS,
};
use crate::tasks::ActionKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args.get(key).and_then(Value::as_str)
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn find_text_spec(command: &str) -> Option<&'static TextArgSpec> {
    TEXT_ARG_COMMANDS.iter().find(|spec| spec.command == command)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn string_list(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

/// Parses one chat line.
///
/// Commands start with `/`, optionally namespaced as `/mj.<command>`. Anything
/// that is not a command parses to `noop`.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return Intent::new("noop", text);
    };
    let slash_tail = slash_tail.strip_prefix("mj.").unwrap_or(slash_tail);

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return Intent::new("noop", text);
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Intent::new(action, text);
    }

    if let Some(spec) = find_text_spec(&command) {
        return Intent::new(spec.action, text).with_arg(spec.key, Value::String(arg.to_string()));
    }

    if let Some(action) = find_action(&command, URL_PAIR_COMMANDS) {
        return Intent::new(action, text).with_arg("urls", string_list(split_args(arg)));
    }

    if let Some(kind) = ActionKind::from_command(&command) {
        let mut parts = split_args(arg).into_iter();
        let task_id = parts.next().unwrap_or_default();
        let param = parts.next().map(Value::String).unwrap_or(Value::Null);
        return Intent::new(FOLLOW_UP_ACTION, text)
            .with_arg("kind", Value::String(kind.command().to_string()))
            .with_arg("task_id", Value::String(task_id))
            .with_arg("param", param);
    }

    Intent::new("unknown", text)
        .with_arg("command", Value::String(command))
        .with_arg("arg", Value::String(arg.to_string()))
}
