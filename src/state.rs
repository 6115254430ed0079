use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::chat::{DynChatLog, SqliteChatLog};
use crate::clubs::{DynClubRegistry, SqliteClubRegistry};
use crate::config::Config;
use crate::identity::{DynIdentityStore, SqliteIdentityStore};
use crate::journal::{DefaultNarrator, DynActivityJournal, DynNarrator, SqliteActivityJournal};
use crate::leaderboard::{DynLeaderboardEngine, SqliteLeaderboardEngine};
use crate::membership::{DynMembershipLedger, SqliteMembershipLedger};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: DynIdentityStore,
    pub clubs: DynClubRegistry,
    pub members: DynMembershipLedger,
    pub leaderboard: DynLeaderboardEngine,
    pub journal: DynActivityJournal,
    pub chat: DynChatLog,
}

impl AppState {
    /// Wire the SQLite-backed components with the default narration.
    pub fn new(db: DbPool, config: Config) -> Self {
        Self::with_narrator(db, config, Arc::new(DefaultNarrator))
    }

    pub fn with_narrator(db: DbPool, config: Config, narrator: DynNarrator) -> Self {
        Self {
            identity: Arc::new(SqliteIdentityStore::new(db.clone(), config.auth.bcrypt_cost)),
            clubs: Arc::new(SqliteClubRegistry::new(db.clone())),
            members: Arc::new(SqliteMembershipLedger::new(db.clone(), narrator.clone())),
            leaderboard: Arc::new(SqliteLeaderboardEngine::new(
                db.clone(),
                config.scoring,
                narrator.clone(),
            )),
            journal: Arc::new(SqliteActivityJournal::new(db.clone(), narrator)),
            chat: Arc::new(SqliteChatLog::new(db.clone())),
            db,
            config,
        }
    }
}
