use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer row ids wrapped for compile-time safety.
macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(UserId);
row_id!(ClubId);
row_id!(MessageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(FromSqlError::Other(
                format!("unknown role: {other}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl ToSql for MessageKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(FromSqlError::Other(
                format!("unknown message type: {other}").into(),
            )),
        }
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar_id: String,
}

impl UserProfile {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            avatar_id: row.get("avatar_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: ClubId,
    pub created_by: UserId,
    pub is_private: bool,
    pub name: String,
    pub description: Option<String>,
    pub action: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Club {
    pub(crate) const COLUMNS: &'static str =
        "id, created_by, is_private, name, description, action, code, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            created_by: row.get("created_by")?,
            is_private: row.get("is_private")?,
            name: row.get("name")?,
            description: row.get("description")?,
            action: row.get("action")?,
            code: row.get("code")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub user_id: UserId,
    pub club_id: ClubId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub(crate) const COLUMNS: &'static str = "id, user_id, club_id, role, joined_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            club_id: row.get("club_id")?,
            role: row.get("role")?,
            joined_at: row.get("joined_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: UserId,
    pub club_id: ClubId,
    pub score: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_checked_in: Option<DateTime<Utc>>,
}

impl LeaderboardEntry {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, club_id, score, current_streak, longest_streak, last_checked_in";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            club_id: row.get("club_id")?,
            score: row.get("score")?,
            current_streak: row.get("current_streak")?,
            longest_streak: row.get("longest_streak")?,
            last_checked_in: row.get("last_checked_in")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub user_id: UserId,
    pub club_id: ClubId,
    pub action: String,
    pub updated_score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub club_id: ClubId,
    pub user_id: UserId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub reply_to_id: Option<MessageId>,
}

impl Message {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            club_id: row.get("club_id")?,
            user_id: row.get("user_id")?,
            message: row.get("message")?,
            timestamp: row.get("timestamp")?,
            kind: row.get("type")?,
            reply_to_id: row.get("reply_to_id")?,
        })
    }
}

/// One-level preview of the message being replied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: MessageId,
    pub user: UserProfile,
    pub message: String,
}

/// A chat message as read back from the log, with its author resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(flatten)]
    pub message: Message,
    pub user: UserProfile,
    pub reply_to: Option<ReplyPreview>,
}
