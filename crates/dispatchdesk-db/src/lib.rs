// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use dispatchdesk_app::{PersonalizationBackend, PersonalizationDocument, SaveMode, ScopeKey};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const APP_NAME: &str = "dispatchdesk";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[(
    "personalization",
    &[
        "user",
        "screen",
        "component",
        "document",
        "created_at",
        "updated_at",
    ],
)];

struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[RequiredIndex {
    name: "idx_personalization_user",
    create_sql: "CREATE INDEX IF NOT EXISTS idx_personalization_user ON personalization (user);",
}];

/// A stored document with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPersonalization {
    pub scope: ScopeKey,
    pub document: PersonalizationDocument,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)
    }

    pub fn get_personalization(&self, scope: &ScopeKey) -> Result<Option<StoredPersonalization>> {
        let raw = self
            .conn
            .query_row(
                "
                SELECT document, created_at, updated_at
                FROM personalization
                WHERE user = ? AND screen = ? AND component = ?
                ",
                params![scope.user, scope.screen, scope.component],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("read personalization for {scope}"))?;

        raw.map(|(document, created_at, updated_at)| {
            Ok(StoredPersonalization {
                scope: scope.clone(),
                document: parse_document(scope, &document)?,
                created_at: parse_datetime(&created_at)?,
                updated_at: parse_datetime(&updated_at)?,
            })
        })
        .transpose()
    }

    /// Stores `document` for `scope`, replacing any earlier one. The first
    /// write sets `created_at`; later writes only move `updated_at`.
    pub fn put_personalization(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
    ) -> Result<()> {
        let now = now_rfc3339()?;
        let raw = document
            .to_json()
            .with_context(|| format!("encode personalization for {scope}"))?;
        self.conn
            .execute(
                "
                INSERT INTO personalization
                  (user, screen, component, document, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user, screen, component) DO UPDATE SET
                  document = excluded.document,
                  updated_at = excluded.updated_at
                ",
                params![scope.user, scope.screen, scope.component, raw, now, now],
            )
            .with_context(|| format!("save personalization for {scope}"))?;
        Ok(())
    }

    pub fn delete_personalization(&self, scope: &ScopeKey) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM personalization WHERE user = ? AND screen = ? AND component = ?",
                params![scope.user, scope.screen, scope.component],
            )
            .with_context(|| format!("delete personalization for {scope}"))?;
        Ok(deleted > 0)
    }

    /// Every scope stored for `user`, ordered by screen then component.
    pub fn list_personalization(&self, user: &str) -> Result<Vec<StoredPersonalization>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT screen, component, document, created_at, updated_at
                FROM personalization
                WHERE user = ?
                ORDER BY screen ASC, component ASC
                ",
            )
            .context("prepare personalization list query")?;
        let rows = stmt
            .query_map(params![user], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .with_context(|| format!("list personalization for {user}"))?;

        let mut out = Vec::new();
        for row in rows {
            let (screen, component, document, created_at, updated_at) =
                row.context("read personalization row")?;
            let scope = ScopeKey::new(user, screen, component);
            out.push(StoredPersonalization {
                document: parse_document(&scope, &document)?,
                created_at: parse_datetime(&created_at)?,
                updated_at: parse_datetime(&updated_at)?,
                scope,
            });
        }
        Ok(out)
    }
}

impl PersonalizationBackend for Store {
    fn load(&self, scope: &ScopeKey) -> Result<Option<PersonalizationDocument>> {
        Ok(self
            .get_personalization(scope)?
            .map(|stored| stored.document))
    }

    fn save(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
        mode: SaveMode,
    ) -> Result<()> {
        // Remote backends pick the HTTP verb from the mode; SQLite upserts.
        tracing::debug!(%scope, mode = mode.as_str(), "saving personalization");
        self.put_personalization(scope, document)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("DISPATCHDESK_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!(
            "cannot resolve data directory; set DISPATCHDESK_DB_PATH to a writable database path"
        )
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("dispatchdesk.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn parse_document(scope: &ScopeKey, raw: &str) -> Result<PersonalizationDocument> {
    PersonalizationDocument::from_json(raw).with_context(|| {
        format!("personalization for {scope} is not a valid document; delete it to reset the layout")
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point [storage].db_path at a dispatchdesk database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).with_context(|| format!("unsupported datetime format {raw:?}"))
}
