use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Task lifecycle events written to `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    BotStarted {
        client: String,
        max_attempts: usize,
    },
    TaskCreated {
        record_id: i64,
        task_id: String,
        origin: String,
        user_id: String,
        options: usize,
    },
    ActionUnavailable {
        task_id: String,
        label: String,
        offered: Vec<String>,
    },
    CommandFailed {
        action: String,
        user_id: String,
        kind: String,
        detail: Option<String>,
    },
    TasksCleared {
        removed: usize,
    },
    BotStopped {
        client: String,
    },
}

/// Append-only JSONL log of [`BotEvent`]s for one bot process.
///
/// Each line is the event stamped with `bot_id` and an RFC 3339 `ts`. Clones
/// write through the same lock, so concurrent handlers append whole lines.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: Arc<PathBuf>,
    bot_id: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, bot_id: &str) -> Self {
        Self {
            path: Arc::new(path.into()),
            bot_id: Arc::from(bot_id),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn record(&self, event: &BotEvent) -> Result<Value> {
        let mut line = serde_json::to_value(event)?;
        if let Value::Object(fields) = &mut line {
            fields.insert("bot_id".to_string(), Value::from(&*self.bot_id));
            fields.insert(
                "ts".to_string(),
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
            );
        }
        let mut text = serde_json::to_string(&line)?;
        text.push('\n');

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{BotEvent, EventLog};

    fn read_lines(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        let body = std::fs::read_to_string(path)?;
        let lines = body
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(lines)
    }

    #[test]
    fn task_created_line_carries_bot_id_and_timestamp() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = EventLog::new(&path, "bot-1");

        let written = log.record(&BotEvent::TaskCreated {
            record_id: 7,
            task_id: "abc".to_string(),
            origin: "upscale".to_string(),
            user_id: "user-1".to_string(),
            options: 9,
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines, vec![written]);
        let line = &lines[0];
        assert_eq!(line["type"], json!("task_created"));
        assert_eq!(line["bot_id"], json!("bot-1"));
        assert_eq!(line["record_id"], json!(7));
        assert_eq!(line["origin"], json!("upscale"));
        DateTime::parse_from_rfc3339(line["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn unavailable_action_lists_offered_labels() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path, "bot-1");

        log.record(&BotEvent::ActionUnavailable {
            task_id: "abc".to_string(),
            label: "Vary (Strong)".to_string(),
            offered: vec!["U1".to_string(), "🔄".to_string()],
        })?;
        log.record(&BotEvent::CommandFailed {
            action: "follow_up".to_string(),
            user_id: "user-1".to_string(),
            kind: "unavailable_action".to_string(),
            detail: None,
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines[0]["offered"], json!(["U1", "🔄"]));
        assert_eq!(lines[1]["type"], json!("command_failed"));
        assert_eq!(lines[1]["detail"], Value::Null);
        Ok(())
    }

    #[test]
    fn concurrent_handlers_append_whole_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path, "bot-1");

        let workers = (0..8)
            .map(|removed| {
                let log = log.clone();
                thread::spawn(move || log.record(&BotEvent::TasksCleared { removed }))
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
        }

        let mut removed = read_lines(&path)?
            .iter()
            .filter_map(|line| line["removed"].as_u64())
            .collect::<Vec<u64>>();
        removed.sort_unstable();
        assert_eq!(removed, (0..8).collect::<Vec<u64>>());
        Ok(())
    }
}
