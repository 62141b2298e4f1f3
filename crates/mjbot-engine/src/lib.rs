pub mod bot;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod error;
pub mod quotes;
pub mod reply;
pub mod retry;

pub use bot::{MidjourneyBot, Session};
pub use client::{AccountInfo, ActionRequest, JobDescriptor, MidjourneyClient};
pub use config::{BotConfig, RetrySettings, DEFAULT_QUOTE_URL};
pub use dryrun::DryrunClient;
pub use error::{CommandError, CommandErrorKind};
pub use quotes::HitokotoQuotes;
pub use retry::{DiagnosticSource, Retrier, Sleeper, ThreadSleeper};
