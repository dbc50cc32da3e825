// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Buffer store operations: buffered messages, the instant whitelist,
//! trigger keywords, and interest topics.

use ferry_core::{
    BufferSummary, BufferedMessage, FerryError, InterestTopic, TriggerKeyword, WhitelistEntry,
};
use rusqlite::params;
use tracing::debug;

use crate::database::{map_tr_err, Database};

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_buffered(row: &rusqlite::Row<'_>) -> rusqlite::Result<BufferedMessage> {
    Ok(BufferedMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        msg_id: row.get(2)?,
        content: row.get(3)?,
        sender_id: row.get(4)?,
        sender_name: row.get(5)?,
        created_at: row.get(6)?,
        processed: row.get::<_, i64>(7)? != 0,
        processed_at: row.get(8)?,
    })
}

const BUFFERED_COLUMNS: &str = "id, chat_id, msg_id, content, sender_id, sender_name, \
                                created_at, processed, processed_at";

// ---- Buffered messages ----

/// Insert a message into the buffer. Duplicate `msg_id`s are silently
/// ignored — ingest-time dedup is best-effort and the unique index is the
/// backstop.
pub async fn add_message(db: &Database, msg: &BufferedMessage) -> Result<(), FerryError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO buffered_messages
                 (chat_id, msg_id, content, sender_id, sender_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.chat_id,
                    msg.msg_id,
                    msg.content,
                    msg.sender_id,
                    msg.sender_name,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Unprocessed messages for one chat, oldest first.
pub async fn unprocessed_for_chat(
    db: &Database,
    chat_id: &str,
) -> Result<Vec<BufferedMessage>, FerryError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BUFFERED_COLUMNS} FROM buffered_messages
                 WHERE chat_id = ?1 AND processed = 0
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![chat_id], row_to_buffered)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// All unprocessed messages, ordered by chat then time so callers can
/// group without re-sorting.
pub async fn all_unprocessed(db: &Database) -> Result<Vec<BufferedMessage>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BUFFERED_COLUMNS} FROM buffered_messages
                 WHERE processed = 0
                 ORDER BY chat_id, created_at ASC"
            ))?;
            let rows = stmt.query_map([], row_to_buffered)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark rows as processed (kept until retention cleanup).
pub async fn mark_processed(db: &Database, ids: &[i64]) -> Result<(), FerryError> {
    if ids.is_empty() {
        return Ok(());
    }
    let ids = ids.to_vec();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!(
                "UPDATE buffered_messages SET processed = 1, processed_at = ?
                 WHERE id IN ({placeholders})"
            );
            // processed_at binds first, then the id list.
            let args = std::iter::once(now).chain(ids.iter().copied());
            conn.execute(&sql, rusqlite::params_from_iter(args))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Per-chat unread counts with the newest message time, newest first.
pub async fn summary(db: &Database) -> Result<Vec<BufferSummary>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, COUNT(*), MAX(created_at)
                 FROM buffered_messages
                 WHERE processed = 0
                 GROUP BY chat_id
                 ORDER BY MAX(created_at) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(BufferSummary {
                    chat_id: row.get(0)?,
                    message_count: row.get(1)?,
                    last_message: row.get(2)?,
                })
            })?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete processed rows older than `before_secs`. Unprocessed rows are
/// never deleted here. Returns the number of deleted rows.
pub async fn cleanup(db: &Database, before_secs: i64) -> Result<usize, FerryError> {
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM buffered_messages WHERE created_at < ?1 AND processed = 1",
                params![before_secs],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(map_tr_err)
}

// ---- Instant whitelist ----

/// Add (or re-add) a chat to the instant whitelist.
pub async fn add_to_whitelist(
    db: &Database,
    chat_id: &str,
    reason: &str,
    added_by: &str,
) -> Result<(), FerryError> {
    debug!(chat_id, added_by, "adding chat to instant whitelist");
    let chat_id = chat_id.to_string();
    let reason = reason.to_string();
    let added_by = added_by.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO instant_whitelist (chat_id, reason, added_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, reason, added_by, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a chat from the whitelist.
pub async fn remove_from_whitelist(db: &Database, chat_id: &str) -> Result<(), FerryError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM instant_whitelist WHERE chat_id = ?1",
                params![chat_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All whitelist entries, newest first.
pub async fn list_whitelist(db: &Database) -> Result<Vec<WhitelistEntry>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, reason, added_by, created_at
                 FROM instant_whitelist ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(WhitelistEntry {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    reason: row.get(2)?,
                    added_by: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a chat bypasses the classifier.
pub async fn in_whitelist(db: &Database, chat_id: &str) -> Result<bool, FerryError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM instant_whitelist WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

// ---- Trigger keywords ----

/// Add (or replace) a trigger keyword.
pub async fn add_keyword(db: &Database, keyword: &str, priority: i64) -> Result<(), FerryError> {
    let keyword = keyword.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO trigger_keywords (keyword, priority, created_at)
                 VALUES (?1, ?2, ?3)",
                params![keyword, priority, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a trigger keyword.
pub async fn remove_keyword(db: &Database, keyword: &str) -> Result<(), FerryError> {
    let keyword = keyword.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM trigger_keywords WHERE keyword = ?1",
                params![keyword],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All keywords, highest priority first.
pub async fn list_keywords(db: &Database) -> Result<Vec<TriggerKeyword>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, keyword, priority, created_at
                 FROM trigger_keywords ORDER BY priority DESC, keyword ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TriggerKeyword {
                    id: row.get(0)?,
                    keyword: row.get(1)?,
                    priority: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?;
            let mut keywords = Vec::new();
            for row in rows {
                keywords.push(row?);
            }
            Ok(keywords)
        })
        .await
        .map_err(map_tr_err)
}

/// First keyword whose lowercased form is a substring of the lowercased
/// content, preferring higher-priority rows. Matching is deliberately
/// naïve substring: the keyword "bug" matches "debug".
pub async fn match_keyword(
    db: &Database,
    content: &str,
) -> Result<Option<TriggerKeyword>, FerryError> {
    let keywords = list_keywords(db).await?;
    let content_lower = content.to_lowercase();
    Ok(keywords
        .into_iter()
        .find(|kw| content_lower.contains(&kw.keyword.to_lowercase())))
}

// ---- Interest topics ----

/// Add (or replace) an interest topic.
pub async fn add_topic(db: &Database, topic: &str, description: &str) -> Result<(), FerryError> {
    let topic = topic.to_string();
    let description = description.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO interest_topics (topic, description, created_at)
                 VALUES (?1, ?2, ?3)",
                params![topic, description, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove an interest topic.
pub async fn remove_topic(db: &Database, topic: &str) -> Result<(), FerryError> {
    let topic = topic.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM interest_topics WHERE topic = ?1", params![topic])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All topics, newest first.
pub async fn list_topics(db: &Database) -> Result<Vec<InterestTopic>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT topic, description FROM interest_topics ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(InterestTopic {
                    topic: row.get(0)?,
                    description: row.get(1)?,
                })
            })?;
            let mut topics = Vec::new();
            for row in rows {
                topics.push(row?);
            }
            Ok(topics)
        })
        .await
        .map_err(map_tr_err)
}
