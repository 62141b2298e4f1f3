use std::sync::Arc;

use mjbot_contracts::chat::Intent;
use mjbot_contracts::events::{BotEvent, EventLog};
use mjbot_contracts::tasks::{select_option, ActionKind, FollowUp, TaskLookup, TaskStore};
use tracing::{debug, info, warn};

use crate::client::{ActionRequest, JobDescriptor, MidjourneyClient};
use crate::error::{CommandError, CommandErrorKind};
use crate::reply::{self, TaskReply};
use crate::retry::Retrier;

/// Where a command came from and where its replies go.
pub trait Session {
    fn user_id(&self) -> &str;
    fn send(&self, text: &str);
}

/// Runs chat commands against the remote client and the task table.
///
/// Every handler validates its arguments before touching the store or the
/// client, acknowledges the user once validation passes, and appends exactly
/// one record per successful image job.
pub struct MidjourneyBot {
    client: Arc<dyn MidjourneyClient>,
    store: Arc<TaskStore>,
    retrier: Retrier,
    events: Option<EventLog>,
}

impl MidjourneyBot {
    pub fn new(client: Arc<dyn MidjourneyClient>, store: Arc<TaskStore>, retrier: Retrier) -> Self {
        Self {
            client,
            store,
            retrier,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn start(&self) {
        info!(client = self.client.name(), "bot started");
        self.emit(BotEvent::BotStarted {
            client: self.client.name().to_string(),
            max_attempts: self.retrier.max_attempts(),
        });
    }

    /// Runs one command and sends its reply, or its error message, to the session.
    pub fn handle(&self, session: &dyn Session, intent: &Intent) {
        match self.dispatch(session, intent) {
            Ok(Some(text)) => session.send(&text),
            Ok(None) => {}
            Err(err) => {
                match err.kind() {
                    CommandErrorKind::Validation | CommandErrorKind::UnknownTask => {
                        debug!(action = %intent.action, kind = err.kind().as_str(), "command rejected")
                    }
                    _ => warn!(
                        action = %intent.action,
                        kind = err.kind().as_str(),
                        detail = err.detail().unwrap_or_default(),
                        "command failed"
                    ),
                }
                self.emit(BotEvent::CommandFailed {
                    action: intent.action.clone(),
                    user_id: session.user_id().to_string(),
                    kind: err.kind().as_str().to_string(),
                    detail: err.detail().map(str::to_string),
                });
                session.send(err.message());
            }
        }
    }

    pub fn dispatch(
        &self,
        session: &dyn Session,
        intent: &Intent,
    ) -> Result<Option<String>, CommandError> {
        let reply = match intent.action.as_str() {
            "noop" => return Ok(None),
            "help" => reply::help_text(),
            "clear_tasks" => self.clear_tasks()?,
            "show_info" => self.info(session)?,
            "show_parameters" => reply::PARAMETER_LIST.to_string(),
            "imagine" => self.imagine(session, intent.arg_str("prompt").unwrap_or_default())?,
            "shorten" => self.shorten(session, intent.arg_str("prompt").unwrap_or_default())?,
            "describe" => self.describe(session, intent.arg_str("url").unwrap_or_default())?,
            "blend" => self.blend(session, &intent.arg_list("urls"))?,
            "face_swap" => {
                let urls = intent.arg_list("urls");
                match urls.as_slice() {
                    [source, target] => self.face_swap(session, source, target)?,
                    _ => return Err(CommandError::validation(reply::INVALID_URL)),
                }
            }
            "follow_up" => {
                let kind = intent
                    .arg_str("kind")
                    .and_then(ActionKind::from_command)
                    .ok_or_else(|| CommandError::validation("unknown follow-up action"))?;
                self.follow_up(
                    session,
                    intent.arg_str("task_id").unwrap_or_default(),
                    kind,
                    intent.arg_str("param"),
                )?
            }
            _ => {
                let command = intent.arg_str("command").unwrap_or(intent.raw.as_str());
                return Err(CommandError::validation(format!(
                    "Unknown command /{command}. Send /help for the command list."
                )));
            }
        };
        Ok(Some(reply))
    }

    pub fn clear_tasks(&self) -> Result<String, CommandError> {
        let removed = self.store.clear().map_err(CommandError::storage)?;
        info!(removed, "task table cleared");
        self.emit(BotEvent::TasksCleared { removed });
        Ok(reply::CLEARED.to_string())
    }

    pub fn info(&self, session: &dyn Session) -> Result<String, CommandError> {
        session.send(reply::RECEIVED);
        let info = self
            .retrier
            .run("info", || self.client.info())
            .map_err(CommandError::remote)?;
        Ok(reply::format_account_info(&info))
    }

    pub fn imagine(&self, session: &dyn Session, prompt: &str) -> Result<String, CommandError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CommandError::validation("Usage: /imagine <prompt>"));
        }
        session.send(reply::RECEIVED);
        let job = self
            .retrier
            .run("imagine", || self.client.imagine(prompt))
            .map_err(CommandError::remote)?;
        self.record_job(session, &job, prompt, "imagine")
    }

    pub fn blend(&self, session: &dyn Session, urls: &[String]) -> Result<String, CommandError> {
        if urls.len() != 2 || !urls.iter().all(|url| is_valid_url(url)) {
            return Err(CommandError::validation(reply::INVALID_URL));
        }
        session.send(reply::RECEIVED);
        let job = self
            .retrier
            .run("blend", || self.client.blend(urls))
            .map_err(CommandError::remote)?;
        self.record_job(session, &job, &urls.join(" "), "blend")
    }

    /// Puts the face from `source` onto `target`.
    pub fn face_swap(
        &self,
        session: &dyn Session,
        source: &str,
        target: &str,
    ) -> Result<String, CommandError> {
        if !is_valid_url(source) || !is_valid_url(target) {
            return Err(CommandError::validation(reply::INVALID_URL));
        }
        session.send(reply::RECEIVED);
        let job = self
            .retrier
            .run("face_swap", || self.client.face_swap(target, source))
            .map_err(CommandError::remote)?;
        self.record_job(session, &job, &format!("{source} {target}"), "face_swap")
    }

    pub fn shorten(&self, session: &dyn Session, prompt: &str) -> Result<String, CommandError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CommandError::validation("Usage: /shorten <prompt>"));
        }
        session.send(reply::RECEIVED);
        let prompts = self
            .retrier
            .run("shorten", || self.client.shorten(prompt))
            .map_err(CommandError::remote)?;
        Ok(reply::suggestions(
            session.user_id(),
            "Shortened prompts:",
            &prompts,
        ))
    }

    pub fn describe(&self, session: &dyn Session, url: &str) -> Result<String, CommandError> {
        let url = url.trim();
        if !is_valid_url(url) {
            return Err(CommandError::validation(reply::INVALID_URL));
        }
        session.send(reply::RECEIVED);
        let descriptions = self
            .retrier
            .run("describe", || self.client.describe(url))
            .map_err(CommandError::remote)?;
        Ok(reply::suggestions(
            session.user_id(),
            "Descriptions:",
            &descriptions,
        ))
    }

    /// Presses one button of a recorded job and records the job it produces.
    ///
    /// The new record inherits the prompt of the record it was derived from.
    pub fn follow_up(
        &self,
        session: &dyn Session,
        task_id: &str,
        kind: ActionKind,
        param: Option<&str>,
    ) -> Result<String, CommandError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(CommandError::validation(format!(
                "Missing task id; expected /{kind} <taskId> ({})",
                kind.domain_hint()
            )));
        }
        let action =
            FollowUp::resolve(kind, param).map_err(|err| CommandError::validation(err.to_string()))?;

        let lookup = self.store.resolve(task_id).map_err(CommandError::storage)?;
        if let TaskLookup::Ambiguous(rows) = &lookup {
            warn!(task_id, matches = rows.len(), "several records share task id, using latest");
        }
        let record = lookup
            .latest()
            .ok_or_else(|| CommandError::unknown_task(task_id))?;

        session.send(reply::RECEIVED);
        let Some(token) = select_option(&record, action.label) else {
            self.emit(BotEvent::ActionUnavailable {
                task_id: task_id.to_string(),
                label: action.label.to_string(),
                offered: record
                    .option_labels()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
            return Err(CommandError::unavailable_action(action.label));
        };

        let request = ActionRequest {
            job_id: record.remote_job_id.clone(),
            custom: token.to_string(),
            flags: record.flags,
        };
        let job = self
            .retrier
            .run(kind.command(), || self.client.invoke_action(&request))
            .map_err(CommandError::remote)?;
        self.record_job(session, &job, &record.prompt, kind.command())
    }

    /// Closes the client. Call once, after every handler has returned.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.emit(BotEvent::BotStopped {
            client: self.client.name().to_string(),
        });
        self.client.close()?;
        info!("bot stopped");
        Ok(())
    }

    fn record_job(
        &self,
        session: &dyn Session,
        job: &JobDescriptor,
        prompt: &str,
        origin: &str,
    ) -> Result<String, CommandError> {
        let record_id = self
            .store
            .append(&job.to_record(session.user_id(), prompt))
            .map_err(CommandError::storage)?;
        info!(record_id, task_id = %job.id, origin, "task recorded");
        self.emit(BotEvent::TaskCreated {
            record_id,
            task_id: job.id.clone(),
            origin: origin.to_string(),
            user_id: session.user_id().to_string(),
            options: job.options.len(),
        });
        Ok(TaskReply {
            user_id: session.user_id(),
            image_url: &job.proxy_url,
            prompt,
            task_id: &job.id,
        }
        .render())
    }

    fn emit(&self, event: BotEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.record(&event) {
            warn!(?event, error = %format!("{err:#}"), "failed to write event");
        }
    }
}

fn is_valid_url(value: &str) -> bool {
    reqwest::Url::parse(value).is_ok()
}
