#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text argument stored under `key`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TextArgSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub key: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mj",
        action: "help",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "clear",
        action: "clear_tasks",
    },
    CommandSpec {
        command: "info",
        action: "show_info",
    },
    CommandSpec {
        command: "params",
        action: "show_parameters",
    },
    CommandSpec {
        command: "parameterlist",
        action: "show_parameters",
    },
];

pub(crate) const TEXT_ARG_COMMANDS: &[TextArgSpec] = &[
    TextArgSpec {
        command: "imagine",
        action: "imagine",
        key: "prompt",
    },
    TextArgSpec {
        command: "shorten",
        action: "shorten",
        key: "prompt",
    },
    TextArgSpec {
        command: "describe",
        action: "describe",
        key: "url",
    },
];

pub(crate) const URL_PAIR_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "blend",
        action: "blend",
    },
    CommandSpec {
        command: "faceswap",
        action: "face_swap",
    },
    // Spelling used by the first published command set.
    CommandSpec {
        command: "facewap",
        action: "face_swap",
    },
];

pub(crate) const FOLLOW_UP_ACTION: &str = "follow_up";

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/clear",
    "/info",
    "/params",
    "/imagine <prompt>",
    "/blend <url1> <url2>",
    "/faceswap <source-url> <target-url>",
    "/shorten <prompt>",
    "/describe <url>",
    "/reroll <taskId>",
    "/upscale <taskId> <1-4>",
    "/variation <taskId> <1-4>",
    "/vary <taskId> <1|2>",
    "/zoomout <taskId> <2x|1.5x|custom>",
    "/pan <taskId> <1-4>",
];
