pub mod code;
pub mod registry;

pub use registry::{ClubDetails, ClubRegistry, DynClubRegistry, SqliteClubRegistry};
