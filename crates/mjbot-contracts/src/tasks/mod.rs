pub mod actions;
mod record;
mod store;

pub use actions::{ActionKind, FollowUp, InvalidActionParam, LABEL_TABLE};
pub use record::{select_option, NewTaskRecord, TaskLookup, TaskOption, TaskRecord};
pub use store::TaskStore;
