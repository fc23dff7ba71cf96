// SQLite-backed moderation store.
//
// Tables:
// - reports: one row per report, with its review outcome
// - blocks: one row per block; revocation flips is_active
// - moderation_cases: one row per case; report ids stored as a JSON array
//
// Every row carries a `version` column. Updates are conditional on it
// (`WHERE id = ? AND version = ?`) so a stale write never clobbers a
// concurrent moderator's change. Partial unique indexes keep at most one
// active block per pair and one open case per target.

use crate::core::moderation::{
    Block, BlockId, BlockRepository, CaseId, CasePriority, CaseStatus, ModerationAction,
    ModerationCase, ModerationCaseRepository, Report, ReportId, ReportReason, ReportRepository,
    ReportStatus, StoreError, UnitOfWork, UnitOfWorkFactory, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Unique index violations mean another writer got there first.
fn write_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => storage(e),
    }
}

/// Run `$query.$method(..)` inside the session's open transaction, or on the
/// pool when no transaction is open.
macro_rules! run {
    ($session:expr, $query:expr, $method:ident) => {{
        let mut tx = $session.tx.lock().await;
        match tx.as_mut() {
            Some(tx) => $query.$method(&mut **tx).await,
            None => $query.$method(&$session.pool).await,
        }
        .map_err(write_error)
    }};
}

/// A positional SQL parameter.
#[derive(Debug, Clone, Copy)]
enum Param<'a> {
    Int(i64),
    Text(&'a str),
}

// ============================================================================
// STORE (FACTORY)
// ============================================================================

#[derive(Clone)]
pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    /// Open (creating if needed) the database at `database_url` and run migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        // An in-memory database only exists on the connection that created it.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&conn_str)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id INTEGER NOT NULL,
                reported_user_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by INTEGER,
                resolved_action INTEGER,
                review_notes TEXT,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reports_reported_user
            ON reports(reported_user_id, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blocker_id INTEGER NOT NULL,
                blocked_user_id INTEGER NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                revoked_at TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_blocks_blocked_user
            ON blocks(blocked_user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_blocks_active_pair
            ON blocks(blocker_id, blocked_user_id) WHERE is_active = 1
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_user_id INTEGER NOT NULL,
                report_ids TEXT NOT NULL DEFAULT '[]',
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                assigned_at TEXT,
                assigned_to INTEGER,
                resolved_at TEXT,
                final_action INTEGER,
                resolution TEXT,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_cases_target_user
            ON moderation_cases(target_user_id, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_cases_open_target
            ON moderation_cases(target_user_id) WHERE status = 'open'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn unit_of_work(&self) -> SqliteUnitOfWork {
        let session = Arc::new(Session {
            pool: self.pool.clone(),
            tx: Mutex::new(None),
            writes: AtomicU64::new(0),
        });

        SqliteUnitOfWork {
            reports: SqliteReportRepository {
                session: Arc::clone(&session),
            },
            blocks: SqliteBlockRepository {
                session: Arc::clone(&session),
            },
            cases: SqliteCaseRepository {
                session: Arc::clone(&session),
            },
            session,
        }
    }
}

#[async_trait]
impl UnitOfWorkFactory for SqliteModerationStore {
    type Work = SqliteUnitOfWork;

    async fn create(&self) -> Result<SqliteUnitOfWork, StoreError> {
        Ok(self.unit_of_work())
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Connection state shared by one unit of work and its repositories.
struct Session {
    pool: Pool<Sqlite>,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
    writes: AtomicU64,
}

impl Session {
    async fn fetch(&self, sql: &str, params: &[Param<'_>]) -> Result<Vec<SqliteRow>, StoreError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match *param {
                Param::Int(value) => query.bind(value),
                Param::Text(value) => query.bind(value),
            };
        }
        run!(self, query, fetch_all)
    }

    fn wrote(&self, rows: u64) {
        self.writes.fetch_add(rows, Ordering::SeqCst);
    }

    /// Explain why a conditional update touched no rows.
    async fn update_miss(&self, table: &str, kind: &str, id: i64, expected: u64) -> StoreError {
        let sql = format!("SELECT version FROM {} WHERE id = ?", table);
        let rows = match self.fetch(&sql, &[Param::Int(id)]).await {
            Ok(rows) => rows,
            Err(e) => return e,
        };

        match rows.first() {
            Some(row) => match row.try_get::<i64, _>("version") {
                Ok(stored) => StoreError::Conflict(format!(
                    "{} {} is at version {}, update was based on version {}",
                    kind, id, stored, expected
                )),
                Err(e) => storage(e),
            },
            None => StoreError::NotFound(format!("{} {}", kind, id)),
        }
    }
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

pub struct SqliteUnitOfWork {
    session: Arc<Session>,
    reports: SqliteReportRepository,
    blocks: SqliteBlockRepository,
    cases: SqliteCaseRepository,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    fn reports(&self) -> &dyn ReportRepository {
        &self.reports
    }

    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }

    fn cases(&self) -> &dyn ModerationCaseRepository {
        &self.cases
    }

    async fn save_changes(&self) -> Result<u64, StoreError> {
        Ok(self.session.writes.swap(0, Ordering::SeqCst))
    }

    async fn begin_transaction(&self) -> Result<(), StoreError> {
        let mut tx = self.session.tx.lock().await;
        if tx.is_some() {
            return Err(StoreError::Storage("transaction already in progress".into()));
        }
        *tx = Some(self.session.pool.begin().await.map_err(storage)?);
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self
            .session
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::Storage("no transaction in progress".into()))?;
        tx.commit().await.map_err(write_error)
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.session.tx.lock().await.take();
        self.session.writes.store(0, Ordering::SeqCst);
        match tx {
            Some(tx) => tx.rollback().await.map_err(storage),
            None => Ok(()),
        }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn to_text(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage(format!("bad timestamp '{}': {}", text, e)))
}

fn parse_optional_time(text: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    text.as_deref().map(parse_time).transpose()
}

fn user(raw: i64) -> Result<UserId, StoreError> {
    UserId::new(raw).map_err(storage)
}

fn optional_user(raw: Option<i64>) -> Result<Option<UserId>, StoreError> {
    raw.map(user).transpose()
}

fn action(raw: Option<i64>) -> Result<Option<ModerationAction>, StoreError> {
    raw.map(|severity| {
        u8::try_from(severity)
            .map_err(storage)
            .and_then(|s| ModerationAction::from_severity(s).map_err(storage))
    })
    .transpose()
}

fn report_from_row(row: &SqliteRow) -> Result<Report, StoreError> {
    let reason: String = row.try_get("reason").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;

    Ok(Report {
        id: ReportId(row.try_get("id").map_err(storage)?),
        reporter_id: user(row.try_get("reporter_id").map_err(storage)?)?,
        reported_user_id: user(row.try_get("reported_user_id").map_err(storage)?)?,
        reason: reason.parse::<ReportReason>().map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
        status: status.parse::<ReportStatus>().map_err(storage)?,
        created_at: parse_time(&created_at)?,
        reviewed_at: parse_optional_time(row.try_get("reviewed_at").map_err(storage)?)?,
        reviewed_by: optional_user(row.try_get("reviewed_by").map_err(storage)?)?,
        resolved_action: action(row.try_get("resolved_action").map_err(storage)?)?,
        review_notes: row.try_get("review_notes").map_err(storage)?,
        version: row.try_get::<i64, _>("version").map_err(storage)? as u64,
    })
}

fn block_from_row(row: &SqliteRow) -> Result<Block, StoreError> {
    let created_at: String = row.try_get("created_at").map_err(storage)?;

    Ok(Block {
        id: BlockId(row.try_get("id").map_err(storage)?),
        blocker_id: user(row.try_get("blocker_id").map_err(storage)?)?,
        blocked_user_id: user(row.try_get("blocked_user_id").map_err(storage)?)?,
        reason: row.try_get("reason").map_err(storage)?,
        created_at: parse_time(&created_at)?,
        revoked_at: parse_optional_time(row.try_get("revoked_at").map_err(storage)?)?,
        is_active: row.try_get("is_active").map_err(storage)?,
        version: row.try_get::<i64, _>("version").map_err(storage)? as u64,
    })
}

fn case_from_row(row: &SqliteRow) -> Result<ModerationCase, StoreError> {
    let report_ids: String = row.try_get("report_ids").map_err(storage)?;
    let priority: String = row.try_get("priority").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;

    Ok(ModerationCase {
        id: CaseId(row.try_get("id").map_err(storage)?),
        target_user_id: user(row.try_get("target_user_id").map_err(storage)?)?,
        report_ids: serde_json::from_str::<BTreeSet<ReportId>>(&report_ids).map_err(storage)?,
        priority: priority.parse::<CasePriority>().map_err(storage)?,
        status: status.parse::<CaseStatus>().map_err(storage)?,
        created_at: parse_time(&created_at)?,
        assigned_at: parse_optional_time(row.try_get("assigned_at").map_err(storage)?)?,
        assigned_to: optional_user(row.try_get("assigned_to").map_err(storage)?)?,
        resolved_at: parse_optional_time(row.try_get("resolved_at").map_err(storage)?)?,
        final_action: action(row.try_get("final_action").map_err(storage)?)?,
        resolution: row.try_get("resolution").map_err(storage)?,
        version: row.try_get::<i64, _>("version").map_err(storage)? as u64,
    })
}

fn collect<T>(
    rows: Vec<SqliteRow>,
    map: fn(&SqliteRow) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.iter().map(map).collect()
}

// ============================================================================
// REPORTS
// ============================================================================

const REPORT_COLUMNS: &str = "id, reporter_id, reported_user_id, reason, description, status, \
     created_at, reviewed_at, reviewed_by, resolved_action, review_notes, version";

pub struct SqliteReportRepository {
    session: Arc<Session>,
}

impl SqliteReportRepository {
    async fn fetch(&self, filter: &str, params: &[Param<'_>]) -> Result<Vec<Report>, StoreError> {
        let sql = format!("SELECT {} FROM reports {}", REPORT_COLUMNS, filter);
        let rows = self.session.fetch(&sql, params).await?;
        collect(rows, report_from_row)
    }

    async fn count(&self, sql: &str, reported_user_id: UserId) -> Result<u64, StoreError> {
        let rows = self
            .session
            .fetch(
                sql,
                &[
                    Param::Int(reported_user_id.get()),
                    Param::Text(ReportStatus::Dismissed.as_str()),
                ],
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| storage("count query returned no rows"))?;
        let count: i64 = row.try_get("count").map_err(storage)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn get_by_id(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        let reports = self.fetch("WHERE id = ?", &[Param::Int(id.get())]).await?;
        Ok(reports.into_iter().next())
    }

    async fn get_reports_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<Vec<Report>, StoreError> {
        self.fetch(
            "WHERE reported_user_id = ? ORDER BY id DESC",
            &[Param::Int(reported_user_id.get())],
        )
        .await
    }

    async fn get_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>, StoreError> {
        self.fetch("WHERE status = ? ORDER BY id ASC", &[Param::Text(status.as_str())])
            .await
    }

    async fn get_pending_reports(&self) -> Result<Vec<Report>, StoreError> {
        self.get_reports_by_status(ReportStatus::Pending).await
    }

    async fn add(&self, report: &mut Report) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO reports (
                reporter_id, reported_user_id, reason, description, status, created_at,
                reviewed_at, reviewed_by, resolved_action, review_notes, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(report.reporter_id().get())
        .bind(report.reported_user_id().get())
        .bind(report.reason().as_str())
        .bind(report.description())
        .bind(report.status().as_str())
        .bind(to_text(report.created_at()))
        .bind(report.reviewed_at().map(to_text))
        .bind(report.reviewed_by().map(UserId::get))
        .bind(report.resolved_action().map(|a| a.severity() as i64))
        .bind(report.review_notes());
        let result = run!(self.session, query, execute)?;

        report.mark_stored(ReportId(result.last_insert_rowid()), 0);
        self.session.wrote(result.rows_affected());
        Ok(())
    }

    async fn update(&self, report: &mut Report) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE reports SET
                description = ?,
                status = ?,
                reviewed_at = ?,
                reviewed_by = ?,
                resolved_action = ?,
                review_notes = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(report.description())
        .bind(report.status().as_str())
        .bind(report.reviewed_at().map(to_text))
        .bind(report.reviewed_by().map(UserId::get))
        .bind(report.resolved_action().map(|a| a.severity() as i64))
        .bind(report.review_notes())
        .bind(report.id().get())
        .bind(report.version() as i64);
        let result = run!(self.session, query, execute)?;

        if result.rows_affected() == 0 {
            return Err(self
                .session
                .update_miss("reports", "report", report.id().get(), report.version())
                .await);
        }

        report.mark_stored(report.id(), report.version() + 1);
        self.session.wrote(result.rows_affected());
        Ok(())
    }

    async fn get_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) AS count FROM reports WHERE reported_user_id = ? AND status != ?",
            reported_user_id,
        )
        .await
    }

    async fn get_serious_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError> {
        let serious: Vec<String> = ReportReason::ALL
            .iter()
            .filter(|r| r.is_serious())
            .map(|r| format!("'{}'", r.as_str()))
            .collect();
        let sql = format!(
            "SELECT COUNT(*) AS count FROM reports \
             WHERE reported_user_id = ? AND status != ? AND reason IN ({})",
            serious.join(", ")
        );
        self.count(&sql, reported_user_id).await
    }
}

// ============================================================================
// BLOCKS
// ============================================================================

const BLOCK_COLUMNS: &str =
    "id, blocker_id, blocked_user_id, reason, created_at, revoked_at, is_active, version";

pub struct SqliteBlockRepository {
    session: Arc<Session>,
}

impl SqliteBlockRepository {
    async fn fetch(&self, filter: &str, params: &[Param<'_>]) -> Result<Vec<Block>, StoreError> {
        let sql = format!("SELECT {} FROM blocks {}", BLOCK_COLUMNS, filter);
        let rows = self.session.fetch(&sql, params).await?;
        collect(rows, block_from_row)
    }
}

#[async_trait]
impl BlockRepository for SqliteBlockRepository {
    async fn get_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        let blocks = self.fetch("WHERE id = ?", &[Param::Int(id.get())]).await?;
        Ok(blocks.into_iter().next())
    }

    async fn get_active_block(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<Option<Block>, StoreError> {
        let blocks = self
            .fetch(
                "WHERE blocker_id = ? AND blocked_user_id = ? AND is_active = 1 ORDER BY id DESC LIMIT 1",
                &[Param::Int(blocker_id.get()), Param::Int(blocked_user_id.get())],
            )
            .await?;
        Ok(blocks.into_iter().next())
    }

    async fn get_blocks_by_user(&self, blocker_id: UserId) -> Result<Vec<Block>, StoreError> {
        self.fetch("WHERE blocker_id = ? ORDER BY id ASC", &[Param::Int(blocker_id.get())])
            .await
    }

    async fn get_blocks_for_user(&self, blocked_user_id: UserId) -> Result<Vec<Block>, StoreError> {
        self.fetch(
            "WHERE blocked_user_id = ? ORDER BY id ASC",
            &[Param::Int(blocked_user_id.get())],
        )
        .await
    }

    async fn add(&self, block: &mut Block) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO blocks (blocker_id, blocked_user_id, reason, created_at, revoked_at, is_active, version)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(block.blocker_id().get())
        .bind(block.blocked_user_id().get())
        .bind(block.reason())
        .bind(to_text(block.created_at()))
        .bind(block.revoked_at().map(to_text))
        .bind(block.is_active());
        let result = run!(self.session, query, execute)?;

        block.mark_stored(BlockId(result.last_insert_rowid()), 0);
        self.session.wrote(result.rows_affected());
        Ok(())
    }

    async fn update(&self, block: &mut Block) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE blocks SET
                reason = ?,
                revoked_at = ?,
                is_active = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(block.reason())
        .bind(block.revoked_at().map(to_text))
        .bind(block.is_active())
        .bind(block.id().get())
        .bind(block.version() as i64);
        let result = run!(self.session, query, execute)?;

        if result.rows_affected() == 0 {
            return Err(self
                .session
                .update_miss("blocks", "block", block.id().get(), block.version())
                .await);
        }

        block.mark_stored(block.id(), block.version() + 1);
        self.session.wrote(result.rows_affected());
        Ok(())
    }

    async fn exists_active_block(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .get_active_block(blocker_id, blocked_user_id)
            .await?
            .is_some())
    }
}

// ============================================================================
// CASES
// ============================================================================

const CASE_COLUMNS: &str = "id, target_user_id, report_ids, priority, status, created_at, \
     assigned_at, assigned_to, resolved_at, final_action, resolution, version";

pub struct SqliteCaseRepository {
    session: Arc<Session>,
}

impl SqliteCaseRepository {
    async fn fetch(
        &self,
        filter: &str,
        params: &[Param<'_>],
    ) -> Result<Vec<ModerationCase>, StoreError> {
        let sql = format!("SELECT {} FROM moderation_cases {}", CASE_COLUMNS, filter);
        let rows = self.session.fetch(&sql, params).await?;
        collect(rows, case_from_row)
    }
}

#[async_trait]
impl ModerationCaseRepository for SqliteCaseRepository {
    async fn get_by_id(&self, id: CaseId) -> Result<Option<ModerationCase>, StoreError> {
        let cases = self.fetch("WHERE id = ?", &[Param::Int(id.get())]).await?;
        Ok(cases.into_iter().next())
    }

    async fn get_cases_for_user(
        &self,
        target_user_id: UserId,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        self.fetch(
            "WHERE target_user_id = ? ORDER BY id ASC",
            &[Param::Int(target_user_id.get())],
        )
        .await
    }

    async fn get_cases_by_status(
        &self,
        status: CaseStatus,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        self.fetch("WHERE status = ? ORDER BY id ASC", &[Param::Text(status.as_str())])
            .await
    }

    async fn get_assigned_cases(
        &self,
        moderator_id: UserId,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        self.fetch(
            "WHERE assigned_to = ? ORDER BY id ASC",
            &[Param::Int(moderator_id.get())],
        )
        .await
    }

    async fn get_cases_by_priority(
        &self,
        priority: CasePriority,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        self.fetch(
            "WHERE priority = ? ORDER BY id ASC",
            &[Param::Text(priority.as_str())],
        )
        .await
    }

    async fn add(&self, case: &mut ModerationCase) -> Result<(), StoreError> {
        let report_ids = serde_json::to_string(case.report_ids()).map_err(storage)?;

        let query = sqlx::query(
            r#"
            INSERT INTO moderation_cases (
                target_user_id, report_ids, priority, status, created_at, assigned_at,
                assigned_to, resolved_at, final_action, resolution, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(case.target_user_id().get())
        .bind(report_ids)
        .bind(case.priority().as_str())
        .bind(case.status().as_str())
        .bind(to_text(case.created_at()))
        .bind(case.assigned_at().map(to_text))
        .bind(case.assigned_to().map(UserId::get))
        .bind(case.resolved_at().map(to_text))
        .bind(case.final_action().map(|a| a.severity() as i64))
        .bind(case.resolution());
        let result = run!(self.session, query, execute)?;

        case.mark_stored(CaseId(result.last_insert_rowid()), 0);
        self.session.wrote(result.rows_affected());
        Ok(())
    }

    async fn update(&self, case: &mut ModerationCase) -> Result<(), StoreError> {
        let report_ids = serde_json::to_string(case.report_ids()).map_err(storage)?;

        let query = sqlx::query(
            r#"
            UPDATE moderation_cases SET
                report_ids = ?,
                priority = ?,
                status = ?,
                assigned_at = ?,
                assigned_to = ?,
                resolved_at = ?,
                final_action = ?,
                resolution = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(report_ids)
        .bind(case.priority().as_str())
        .bind(case.status().as_str())
        .bind(case.assigned_at().map(to_text))
        .bind(case.assigned_to().map(UserId::get))
        .bind(case.resolved_at().map(to_text))
        .bind(case.final_action().map(|a| a.severity() as i64))
        .bind(case.resolution())
        .bind(case.id().get())
        .bind(case.version() as i64);
        let result = run!(self.session, query, execute)?;

        if result.rows_affected() == 0 {
            return Err(self
                .session
                .update_miss("moderation_cases", "moderation case", case.id().get(), case.version())
                .await);
        }

        case.mark_stored(case.id(), case.version() + 1);
        self.session.wrote(result.rows_affected());
        Ok(())
    }
}
