// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store operations (chat -> backend thread mapping).

use ferry_core::{FerryError, Session};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        chat_id: row.get(0)?,
        thread_id: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        last_reply_at: row.get(4)?,
        last_msg_time: row.get(5)?,
        last_processed_msg_id: row.get(6)?,
    })
}

const SESSION_COLUMNS: &str = "chat_id, thread_id, created_at, updated_at, \
                               last_reply_at, last_msg_time, last_processed_msg_id";

/// Get the session for a chat, if one exists.
pub async fn get(db: &Database, chat_id: &str) -> Result<Option<Session>, FerryError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let session = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE chat_id = ?1"),
                    params![chat_id],
                    row_to_session,
                )
                .optional()?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a session row.
pub async fn save(db: &Database, session: &Session) -> Result<(), FerryError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions
                 (chat_id, thread_id, created_at, updated_at, last_reply_at,
                  last_msg_time, last_processed_msg_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.chat_id,
                    session.thread_id,
                    session.created_at,
                    session.updated_at,
                    session.last_reply_at,
                    session.last_msg_time,
                    session.last_processed_msg_id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the session for a chat. Deleting a missing row is not an error.
pub async fn delete(db: &Database, chat_id: &str) -> Result<(), FerryError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM sessions WHERE chat_id = ?1", params![chat_id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bump `updated_at` to now.
pub async fn touch(db: &Database, chat_id: &str) -> Result<(), FerryError> {
    let chat_id = chat_id.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE chat_id = ?2",
                params![now, chat_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a bot reply: bumps `updated_at` and `last_reply_at`.
pub async fn mark_replied(db: &Database, chat_id: &str) -> Result<(), FerryError> {
    let chat_id = chat_id.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1, last_reply_at = ?1 WHERE chat_id = ?2",
                params![now, chat_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance the resumption anchor to the given message id and time (platform
/// milliseconds). Also bumps `updated_at`.
pub async fn update_last_processed(
    db: &Database,
    chat_id: &str,
    msg_id: &str,
    msg_time_ms: i64,
) -> Result<(), FerryError> {
    let chat_id = chat_id.to_string();
    let msg_id = msg_id.to_string();
    let now = now_secs();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET updated_at = ?1, last_msg_time = ?2, last_processed_msg_id = ?3
                 WHERE chat_id = ?4",
                params![now, msg_time_ms, msg_id, chat_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List all sessions, most recently active first.
pub async fn list_all(db: &Database) -> Result<Vec<Session>, FerryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_session(chat_id: &str) -> Session {
        Session {
            chat_id: chat_id.to_string(),
            thread_id: "thread-1".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
            last_reply_at: 0,
            last_msg_time: 0,
            last_processed_msg_id: String::new(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        save(&db, &make_session("c1")).await.unwrap();

        let s = get(&db, "c1").await.unwrap().unwrap();
        assert_eq!(s.chat_id, "c1");
        assert_eq!(s.thread_id, "thread-1");
        assert_eq!(s.last_processed_msg_id, "");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn save_replaces_existing_row() {
        let (db, _dir) = setup_db().await;
        save(&db, &make_session("c1")).await.unwrap();

        let mut s = make_session("c1");
        s.thread_id = "thread-2".to_string();
        save(&db, &s).await.unwrap();

        let got = get(&db, "c1").await.unwrap().unwrap();
        assert_eq!(got.thread_id, "thread-2");
        let all = list_all(&db).await.unwrap();
        assert_eq!(all.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (db, _dir) = setup_db().await;
        save(&db, &make_session("c1")).await.unwrap();
        delete(&db, "c1").await.unwrap();
        assert!(get(&db, "c1").await.unwrap().is_none());
        // Deleting again is fine.
        delete(&db, "c1").await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn touch_and_mark_replied_bump_timestamps() {
        let (db, _dir) = setup_db().await;
        save(&db, &make_session("c1")).await.unwrap();

        touch(&db, "c1").await.unwrap();
        let s = get(&db, "c1").await.unwrap().unwrap();
        assert!(s.updated_at > 1_700_000_000);
        assert_eq!(s.last_reply_at, 0);

        mark_replied(&db, "c1").await.unwrap();
        let s = get(&db, "c1").await.unwrap().unwrap();
        assert!(s.last_reply_at > 0);
        assert_eq!(s.last_reply_at, s.updated_at);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_last_processed_sets_both_anchors() {
        let (db, _dir) = setup_db().await;
        save(&db, &make_session("c1")).await.unwrap();

        update_last_processed(&db, "c1", "om_42", 1_700_000_123_456)
            .await
            .unwrap();

        let s = get(&db, "c1").await.unwrap().unwrap();
        assert_eq!(s.last_processed_msg_id, "om_42");
        assert_eq!(s.last_msg_time, 1_700_000_123_456);
        assert!(s.updated_at > 1_700_000_000);

        db.close().await.unwrap();
    }
}
