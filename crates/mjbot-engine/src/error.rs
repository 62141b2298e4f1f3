use crate::reply;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandErrorKind {
    Validation,
    UnknownTask,
    UnavailableAction,
    Remote,
    Storage,
}

impl CommandErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::UnknownTask => "unknown_task",
            Self::UnavailableAction => "unavailable_action",
            Self::Remote => "remote",
            Self::Storage => "storage",
        }
    }
}

/// A command that did not produce a reply.
///
/// `message` is what the user sees; `detail` keeps the underlying error chain
/// for logs and is never shown in chat.
#[derive(Debug)]
pub struct CommandError {
    kind: CommandErrorKind,
    message: String,
    detail: Option<String>,
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: CommandErrorKind::Validation,
            message: message.into(),
            detail: None,
        }
    }

    pub fn unknown_task(task_id: &str) -> Self {
        Self {
            kind: CommandErrorKind::UnknownTask,
            message: reply::unknown_task(task_id),
            detail: None,
        }
    }

    pub fn unavailable_action(label: &str) -> Self {
        Self {
            kind: CommandErrorKind::UnavailableAction,
            message: reply::NO_SUCH_ACTION.to_string(),
            detail: Some(format!("label {label} not offered by task")),
        }
    }

    pub fn remote(err: anyhow::Error) -> Self {
        Self {
            kind: CommandErrorKind::Remote,
            message: reply::GENERIC_FAILURE.to_string(),
            detail: Some(format!("{err:#}")),
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self {
            kind: CommandErrorKind::Storage,
            message: reply::GENERIC_FAILURE.to_string(),
            detail: Some(format!("{err:#}")),
        }
    }

    pub fn kind(&self) -> CommandErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}
