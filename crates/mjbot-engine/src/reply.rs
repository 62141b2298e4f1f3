//! User-facing chat text.

use chrono::DateTime;
use mjbot_contracts::chat::CHAT_HELP_COMMANDS;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::client::AccountInfo;

pub const RECEIVED: &str = "Received, working on it...";
pub const GENERIC_FAILURE: &str = "Something went wrong. Try again?";
pub const NO_SUCH_ACTION: &str = "This task has no such action.";
pub const CLEARED: &str = "Task table cleared.";
pub const INVALID_URL: &str = "Please provide valid URLs.";

const INFO_LABELS: &[(&str, &str)] = &[
    ("subscription", "Subscription"),
    ("jobMode", "Job mode"),
    ("visibilityMode", "Visibility mode"),
    ("fastTimeRemaining", "Fast time remaining"),
    ("lifetimeUsage", "Lifetime usage"),
    ("relaxedUsage", "Relaxed usage"),
    ("queuedJobsFast", "Queued fast jobs"),
    ("queuedJobsRelax", "Queued relaxed jobs"),
    ("runningJobs", "Running jobs"),
];

// Discord also allows a style suffix such as `<t:123:R>`.
static DISCORD_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<t:(\d+)(?::[A-Za-z])?>").expect("timestamp pattern compiles"));

pub const PARAMETER_LIST: &str = "\
📗 Parameter list
1. --ar <w:h> aspect ratio, default 1:1.
2. --chaos <0-100> how varied the grid is; higher values give more unusual results.
3. --fast run this job in fast mode.
4. --iw <0-2> image prompt weight relative to text, default 1.
5. --no <terms> negative prompt, e.g. --no plants.
6. --q <.25|.5|1> render quality, default 1; higher takes longer.
7. --relax run this job in relax mode.
8. --seed <0-4294967295> seed for the initial grid; same seed and prompt give similar images.
9. --stop <10-100> stop the job early for a blurrier, less detailed result.
10. --style <raw|4a|4b|4c|cute|expressive|original|scenic> switch model or niji style.
11. --s <0-1000> stylize strength of the default aesthetic.
12. --tile generate a seamless repeating tile.
13. --turbo run this job in turbo mode.
14. --weird <0-3000> explore unusual aesthetics.
15. --version <1|2|3|4|5|5.1|5.2> pick an algorithm version.
16. --niji use the anime-focused model.";

/// The message posted for every finished image job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReply<'a> {
    pub user_id: &'a str,
    pub image_url: &'a str,
    pub prompt: &'a str,
    pub task_id: &'a str,
}

impl TaskReply<'_> {
    pub fn render(&self) -> String {
        format!(
            "<@{}>\n[image] {}\nPrompt: {}\n\nTask ID: {}",
            self.user_id, self.image_url, self.prompt, self.task_id
        )
    }
}

pub fn unknown_task(task_id: &str) -> String {
    format!("No task found with id {task_id}.")
}

pub fn help_text() -> String {
    let mut lines = vec!["Midjourney commands:".to_string()];
    lines.extend(CHAT_HELP_COMMANDS.iter().map(|usage| format!("  {usage}")));
    lines.push("Every image reply carries a task id; pass it to the follow-up commands.".to_string());
    lines.join("\n")
}

pub fn suggestions(user_id: &str, heading: &str, lines: &[String]) -> String {
    format!("<@{user_id}>\n{heading}\n{}", lines.join("\n"))
}

/// Renders account fields with friendly labels, in a fixed order.
///
/// Unrecognised fields follow under their raw names.
pub fn format_account_info(info: &AccountInfo) -> String {
    let known = INFO_LABELS
        .iter()
        .filter_map(|(key, label)| info.get(*key).map(|value| (*label, value.as_str())));
    let unknown = info
        .iter()
        .filter(|(key, _)| !INFO_LABELS.iter().any(|(known, _)| known == key))
        .map(|(key, value)| (key.as_str(), value.as_str()));
    known
        .chain(unknown)
        .map(|(label, value)| format!("{label}: {}", rewrite_discord_timestamps(value)))
        .collect::<Vec<String>>()
        .join("\n")
}

/// Rewrites every `<t:UNIX>` marker as `<t:YYYY-MM-DD>` (UTC).
pub fn rewrite_discord_timestamps(text: &str) -> String {
    DISCORD_TIMESTAMP
        .replace_all(text, |caps: &Captures<'_>| {
            caps[1]
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|date| format!("<t:{}>", date.format("%Y-%m-%d")))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::{format_account_info, help_text, rewrite_discord_timestamps, TaskReply};
    use crate::client::AccountInfo;

    #[test]
    fn task_reply_joins_fixed_lines() {
        let reply = TaskReply {
            user_id: "42",
            image_url: "https://cdn.example/abc.png",
            prompt: "a red fox",
            task_id: "abc",
        };
        assert_eq!(
            reply.render(),
            "<@42>\n[image] https://cdn.example/abc.png\nPrompt: a red fox\n\nTask ID: abc"
        );
    }

    #[test]
    fn timestamps_become_dates() {
        assert_eq!(
            rewrite_discord_timestamps("renews <t:1767225600>, began <t:0:R>"),
            "renews <t:2026-01-01>, began <t:1970-01-01>"
        );
        assert_eq!(rewrite_discord_timestamps("<t:soon>"), "<t:soon>");
        assert_eq!(rewrite_discord_timestamps("broken <t:12"), "broken <t:12");
    }

    #[test]
    fn unclosed_marker_does_not_hide_the_next_one() {
        assert_eq!(
            rewrite_discord_timestamps("resets <t:soon, renews <t:1767225600>"),
            "resets <t:soon, renews <t:2026-01-01>"
        );
        assert_eq!(
            rewrite_discord_timestamps("<t:99999999999999999999>"),
            "<t:99999999999999999999>"
        );
    }

    #[test]
    fn account_info_uses_fixed_order() {
        let mut info = AccountInfo::new();
        info.insert("jobMode".to_string(), "Fast".to_string());
        info.insert("extra".to_string(), "1".to_string());
        info.insert("subscription".to_string(), "Basic <t:1767225600>".to_string());
        assert_eq!(
            format_account_info(&info),
            "Subscription: Basic <t:2026-01-01>\nJob mode: Fast\nextra: 1"
        );
    }

    #[test]
    fn help_lists_follow_up_domains() {
        let help = help_text();
        assert!(help.contains("/upscale <taskId> <1-4>"));
        assert!(help.contains("/zoomout <taskId> <2x|1.5x|custom>"));
    }
}
