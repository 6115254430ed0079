pub mod activity;
pub mod narration;

pub use activity::{
    ActivityJournal, DynActivityJournal, JournalEvent, SqliteActivityJournal, YOU_LABEL,
};
pub use narration::{DefaultNarrator, DynNarrator, NarrationEvent, Narrator};
