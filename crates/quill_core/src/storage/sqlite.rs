//! SQLite-backed storage implementation.
//!
//! This module provides a persistent storage backend using SQLite for post
//! rows and their revision log.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::{DraftTouch, PostStore, RevisionHead, derive_revision_info};
use crate::error::{QuillError, Result};
use crate::types::{
    NewRevision, Post, PostKey, PostMetadata, PostStatus, Revision, RevisionKind,
};

const POST_COLUMNS: &str =
    "author, permlink, status, date, scheduled_date, tags, featured_img, warning_msg";

const REVISION_COLUMNS: &str =
    "seq, author, permlink, authperm, rev_hash, title, body, json_metadata, created_at, kind";

/// Authperms per query in batched lookups, well under SQLite's bound
/// parameter limit.
const BATCH_SIZE: usize = 500;

/// SQLite-backed post storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the store is dropped.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                author TEXT NOT NULL,
                permlink TEXT NOT NULL,
                status TEXT NOT NULL,
                date INTEGER NOT NULL,
                scheduled_date INTEGER,
                tags TEXT NOT NULL DEFAULT '[]',
                featured_img TEXT NOT NULL DEFAULT '',
                warning_msg TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (author, permlink)
            );

            -- Append-only; seq orders drafts against autosaves
            CREATE TABLE IF NOT EXISTS revisions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                author TEXT NOT NULL,
                permlink TEXT NOT NULL,
                authperm TEXT NOT NULL,
                rev_hash TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                json_metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS autosave_floors (
                authperm TEXT PRIMARY KEY,
                seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_revisions_authperm ON revisions(authperm, kind, seq);
            CREATE INDEX IF NOT EXISTS idx_revisions_hash ON revisions(authperm, rev_hash);
            CREATE INDEX IF NOT EXISTS idx_posts_author_status ON posts(author, status);
            "#,
        )?;
        Ok(())
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    let status: String = row.get(2)?;
    let tags: String = row.get(5)?;
    Ok(Post {
        author: row.get(0)?,
        permlink: row.get(1)?,
        status: status.parse().map_err(|e: String| conversion_error(2, e))?,
        date: row.get(3)?,
        scheduled_date: row.get(4)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(5, e))?,
        featured_img: row.get(6)?,
        warning_msg: row.get(7)?,
    })
}

fn row_to_revision(row: &Row<'_>) -> rusqlite::Result<Revision> {
    let metadata: String = row.get(7)?;
    let kind: String = row.get(9)?;
    Ok(Revision {
        seq: row.get(0)?,
        author: row.get(1)?,
        permlink: row.get(2)?,
        authperm: row.get(3)?,
        rev_hash: row.get(4)?,
        title: row.get(5)?,
        body: row.get(6)?,
        metadata: PostMetadata::from_json_str(&metadata).map_err(|e| conversion_error(7, e))?,
        created_at: row.get(8)?,
        kind: kind.parse().map_err(|e: String| conversion_error(9, e))?,
    })
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl PostStore for SqliteStore {
    fn get_post(&self, key: &PostKey) -> Result<Option<Post>> {
        let conn = self.conn();
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE author = ? AND permlink = ? LIMIT 1"),
                params![key.author, key.permlink],
                row_to_post,
            )
            .optional()?;
        Ok(post)
    }

    fn insert_post_if_absent(&self, post: &Post) -> Result<bool> {
        let conn = self.conn();
        let tags = serde_json::to_string(&post.tags)?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO posts ({POST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                post.author,
                post.permlink,
                post.status.to_string(),
                post.date,
                post.scheduled_date,
                tags,
                post.featured_img,
                post.warning_msg,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn touch_post(&self, key: &PostKey, touch: &DraftTouch<'_>) -> Result<()> {
        let conn = self.conn();
        let tags = serde_json::to_string(touch.tags)?;
        conn.execute(
            "INSERT INTO posts (author, permlink, status, date, tags, featured_img)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(author, permlink) DO UPDATE SET
                date = excluded.date,
                tags = excluded.tags,
                featured_img = excluded.featured_img",
            params![
                key.author,
                key.permlink,
                PostStatus::Draft.to_string(),
                touch.date,
                tags,
                touch.featured_img,
            ],
        )?;
        Ok(())
    }

    fn set_status(&self, key: &PostKey, status: PostStatus) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE posts SET status = ? WHERE author = ? AND permlink = ?",
            params![status.to_string(), key.author, key.permlink],
        )?;
        Ok(changed > 0)
    }

    fn clear_warning(&self, key: &PostKey) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE posts SET warning_msg = '' WHERE author = ? AND permlink = ?",
            params![key.author, key.permlink],
        )?;
        Ok(changed > 0)
    }

    fn list_posts(
        &self,
        author: &str,
        status: Option<PostStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE author = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY date DESC, permlink ASC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let posts = stmt
            .query_map(
                params![
                    author,
                    status.map(|s| s.to_string()),
                    limit as i64,
                    offset as i64
                ],
                row_to_post,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    fn count_posts(&self, author: &str, status: Option<PostStatus>) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE author = ?1 AND (?2 IS NULL OR status = ?2)",
            params![author, status.map(|s| s.to_string())],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn append_revision(&self, revision: &NewRevision) -> Result<i64> {
        let conn = self.conn();
        let metadata = revision.metadata.to_json_string()?;
        conn.execute(
            "INSERT INTO revisions
                (author, permlink, authperm, rev_hash, title, body, json_metadata, created_at, kind)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                revision.key.author,
                revision.key.permlink,
                revision.key.authperm(),
                revision.rev_hash,
                revision.title,
                revision.body,
                metadata,
                revision.created_at,
                revision.kind.to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_revision(&self, authperm: &str, rev_hash: &str) -> Result<Option<Revision>> {
        let conn = self.conn();
        let revision = conn
            .query_row(
                &format!(
                    "SELECT {REVISION_COLUMNS} FROM revisions
                     WHERE authperm = ? AND rev_hash = ?
                     ORDER BY seq DESC LIMIT 1"
                ),
                params![authperm, rev_hash],
                row_to_revision,
            )
            .optional()?;
        Ok(revision)
    }

    fn latest_revision(&self, authperm: &str, kind: RevisionKind) -> Result<Option<RevisionHead>> {
        let conn = self.conn();
        let head = conn
            .query_row(
                "SELECT seq, rev_hash FROM revisions
                 WHERE authperm = ? AND kind = ?
                 ORDER BY seq DESC LIMIT 1",
                params![authperm, kind.to_string()],
                |row| {
                    Ok(RevisionHead {
                        seq: row.get(0)?,
                        rev_hash: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(head)
    }

    fn revisions(&self, authperm: &str) -> Result<Vec<Revision>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVISION_COLUMNS} FROM revisions WHERE authperm = ? ORDER BY seq ASC"
        ))?;
        let revisions = stmt
            .query_map(params![authperm], row_to_revision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(revisions)
    }

    fn discard_autosaves(&self, key: &PostKey) -> Result<bool> {
        let conn = self.conn();
        let exists = conn
            .query_row(
                "SELECT 1 FROM posts WHERE author = ? AND permlink = ?",
                params![key.author, key.permlink],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO autosave_floors (authperm, seq)
             SELECT ?1, COALESCE(MAX(seq), 0) FROM revisions WHERE authperm = ?1
             ON CONFLICT(authperm) DO UPDATE SET seq = excluded.seq",
            params![key.authperm()],
        )?;
        Ok(true)
    }

    fn autosave_floor(&self, authperm: &str) -> Result<i64> {
        let conn = self.conn();
        let floor: Option<i64> = conn
            .query_row(
                "SELECT seq FROM autosave_floors WHERE authperm = ?",
                params![authperm],
                |row| row.get(0),
            )
            .optional()?;
        Ok(floor.unwrap_or(0))
    }

    fn relocate(&self, from: &PostKey, to: &PostKey) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let moved = tx.execute(
            "UPDATE posts SET author = ?, permlink = ? WHERE author = ? AND permlink = ?",
            params![to.author, to.permlink, from.author, from.permlink],
        )?;
        if moved == 0 {
            // Dropping the transaction rolls it back
            return Err(QuillError::NotFound(from.to_string()));
        }

        tx.execute(
            "UPDATE revisions SET author = ?, permlink = ?, authperm = ?
             WHERE author = ? AND permlink = ?",
            params![
                to.author,
                to.permlink,
                to.authperm(),
                from.author,
                from.permlink
            ],
        )?;
        tx.execute(
            "DELETE FROM autosave_floors WHERE authperm = ?",
            params![to.authperm()],
        )?;
        tx.execute(
            "UPDATE autosave_floors SET authperm = ? WHERE authperm = ?",
            params![to.authperm(), from.authperm()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn autosaves(&self, authperms: &[String]) -> Result<HashMap<String, String>> {
        let mut out: HashMap<String, String> = authperms
            .iter()
            .map(|a| (a.clone(), String::new()))
            .collect();

        let conn = self.conn();
        for chunk in authperms.chunks(BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");

            // SQLite returns the bare rev_hash column from the MAX(seq) row
            let mut stmt = conn.prepare(&format!(
                "SELECT authperm, kind, MAX(seq), rev_hash FROM revisions
                 WHERE authperm IN ({placeholders})
                 GROUP BY authperm, kind"
            ))?;
            let mut heads: HashMap<String, (Option<RevisionHead>, Option<RevisionHead>)> =
                HashMap::new();
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    RevisionHead {
                        seq: row.get(2)?,
                        rev_hash: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (authperm, kind, head) = row?;
                let entry = heads.entry(authperm).or_default();
                match kind.parse::<RevisionKind>() {
                    Ok(RevisionKind::Draft) => entry.0 = Some(head),
                    Ok(RevisionKind::Autosave) => entry.1 = Some(head),
                    Err(e) => return Err(QuillError::Storage(e)),
                }
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT authperm, seq FROM autosave_floors WHERE authperm IN ({placeholders})"
            ))?;
            let floors = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;

            for (authperm, (draft, autosave)) in heads {
                let floor = floors.get(&authperm).copied().unwrap_or(0);
                out.insert(
                    authperm,
                    derive_revision_info(draft, autosave, floor).autosave_revision,
                );
            }
        }
        Ok(out)
    }
}
