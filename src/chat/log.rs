use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::models::{
    ChatMessage, ClubId, Message, MessageId, MessageKind, ReplyPreview, UserId, UserProfile,
};
use crate::db::{with_transaction, StoreError, StoreResult};
use crate::state::DbPool;

pub const MAX_MESSAGE_CHARS: usize = 2000;

#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Post a user message, optionally replying to another message in the
    /// same club.
    async fn post(
        &self,
        club_id: ClubId,
        user: UserId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> StoreResult<Message>;

    async fn post_system(&self, club_id: ClubId, user: UserId, text: &str)
        -> StoreResult<Message>;

    /// Newest first, with author profiles and a one-level reply preview.
    async fn list(&self, club_id: ClubId, limit: u32, offset: u32)
        -> StoreResult<Vec<ChatMessage>>;
}

pub struct SqliteChatLog {
    pool: DbPool,
}

impl SqliteChatLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn clean_text(text: &str) -> StoreResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::InvalidInput("message text is required".into()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(StoreError::InvalidInput(format!(
            "message is longer than {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(text)
}

pub(crate) fn insert_message(
    conn: &Connection,
    club_id: ClubId,
    user: UserId,
    text: &str,
    kind: MessageKind,
    reply_to: Option<MessageId>,
    now: DateTime<Utc>,
) -> StoreResult<Message> {
    conn.execute(
        "INSERT INTO messages (club_id, user_id, message, timestamp, type, reply_to_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![club_id, user, text, now, kind, reply_to],
    )?;

    Ok(Message {
        id: MessageId(conn.last_insert_rowid()),
        club_id,
        user_id: user,
        message: text.to_string(),
        timestamp: now,
        kind,
        reply_to_id: reply_to,
    })
}

fn chat_message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let message = Message::from_row(row)?;
    let user = UserProfile {
        id: message.user_id,
        username: row.get("username")?,
        avatar_id: row.get("avatar_id")?,
    };

    let reply_to = match row.get::<_, Option<MessageId>>("reply_id")? {
        Some(id) => Some(ReplyPreview {
            id,
            user: UserProfile {
                id: row.get("reply_user_id")?,
                username: row.get("reply_username")?,
                avatar_id: row.get("reply_avatar_id")?,
            },
            message: row.get("reply_message")?,
        }),
        None => None,
    };

    Ok(ChatMessage {
        message,
        user,
        reply_to,
    })
}

#[async_trait]
impl ChatLog for SqliteChatLog {
    async fn post(
        &self,
        club_id: ClubId,
        user: UserId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> StoreResult<Message> {
        let text = clean_text(text)?;
        let now = Utc::now();

        let message = with_transaction(&self.pool, |tx| {
            if let Some(reply_id) = reply_to {
                let target_club: Option<ClubId> = tx
                    .query_row(
                        "SELECT club_id FROM messages WHERE id = ?1",
                        params![reply_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if target_club != Some(club_id) {
                    return Err(StoreError::not_found(format!("message {reply_id}")));
                }
            }
            insert_message(tx, club_id, user, text, MessageKind::User, reply_to, now)
        })?;

        tracing::debug!(club_id = %club_id, user = %user, message_id = %message.id, "message posted");
        Ok(message)
    }

    async fn post_system(
        &self,
        club_id: ClubId,
        user: UserId,
        text: &str,
    ) -> StoreResult<Message> {
        let text = clean_text(text)?;
        let conn = self.pool.get()?;
        insert_message(&conn, club_id, user, text, MessageKind::System, None, Utc::now())
    }

    async fn list(
        &self,
        club_id: ClubId,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<ChatMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT m.id AS id, m.club_id AS club_id, m.user_id AS user_id,
                    m.message AS message, m.timestamp AS timestamp, m.type AS type,
                    m.reply_to_id AS reply_to_id,
                    u.username AS username, u.avatar_id AS avatar_id,
                    r.id AS reply_id, r.message AS reply_message, r.user_id AS reply_user_id,
                    ru.username AS reply_username, ru.avatar_id AS reply_avatar_id
             FROM messages m
             JOIN users u ON u.id = m.user_id
             LEFT JOIN messages r ON r.id = m.reply_to_id
             LEFT JOIN users ru ON ru.id = r.user_id
             WHERE m.club_id = ?1
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let messages = stmt
            .query_map(params![club_id, limit, offset], chat_message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

pub type DynChatLog = Arc<dyn ChatLog>;
