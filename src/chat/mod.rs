pub mod log;

pub use log::{ChatLog, DynChatLog, SqliteChatLog};
