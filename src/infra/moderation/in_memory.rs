// In-memory implementation of the moderation storage ports.
//
// Shared state lives in DashMaps behind an Arc, so every unit of work handed
// out by one `InMemoryModerationStore` sees the same data. Writes made inside
// a transaction are staged on the unit of work and only reach the shared maps
// on commit, after every staged update's base version is re-checked and every
// staged row is checked against the uniqueness rules (one active block per
// pair, one open case per target). Outside a transaction, writes go straight
// to the shared maps under the same checks.

use crate::core::moderation::{
    Block, BlockId, BlockRepository, CaseId, CasePriority, CaseStatus, ModerationCase,
    ModerationCaseRepository, Report, ReportId, ReportRepository, ReportStatus, StoreError,
    UnitOfWork, UnitOfWorkFactory, UserId,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// ENTITY PLUMBING
// ============================================================================

/// What the generic table code needs to know about each stored entity.
trait StoredEntity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Ord + Display + Send + Sync;

    const KIND: &'static str;

    fn key(&self) -> Self::Id;
    fn row_version(&self) -> u64;
    fn stamp(&mut self, id: Self::Id, version: u64);
    fn id_from(raw: i64) -> Self::Id;
    fn table(state: &SharedState) -> &Table<Self>;
    fn staged(staging: &mut Staging) -> &mut HashMap<Self::Id, Staged<Self>>;

    /// True if `self` and `other` may not be stored side by side.
    fn clashes_with(&self, _other: &Self) -> bool {
        false
    }
}

impl StoredEntity for Report {
    type Id = ReportId;
    const KIND: &'static str = "report";

    fn key(&self) -> ReportId {
        self.id()
    }
    fn row_version(&self) -> u64 {
        self.version()
    }
    fn stamp(&mut self, id: ReportId, version: u64) {
        self.mark_stored(id, version);
    }
    fn id_from(raw: i64) -> ReportId {
        ReportId(raw)
    }
    fn table(state: &SharedState) -> &Table<Self> {
        &state.reports
    }
    fn staged(staging: &mut Staging) -> &mut HashMap<ReportId, Staged<Self>> {
        &mut staging.reports
    }
}

impl StoredEntity for Block {
    type Id = BlockId;
    const KIND: &'static str = "block";

    fn key(&self) -> BlockId {
        self.id()
    }
    fn row_version(&self) -> u64 {
        self.version()
    }
    fn stamp(&mut self, id: BlockId, version: u64) {
        self.mark_stored(id, version);
    }
    fn id_from(raw: i64) -> BlockId {
        BlockId(raw)
    }
    fn table(state: &SharedState) -> &Table<Self> {
        &state.blocks
    }
    fn staged(staging: &mut Staging) -> &mut HashMap<BlockId, Staged<Self>> {
        &mut staging.blocks
    }
    fn clashes_with(&self, other: &Self) -> bool {
        self.is_active()
            && other.is_active()
            && self.blocker_id() == other.blocker_id()
            && self.blocked_user_id() == other.blocked_user_id()
    }
}

impl StoredEntity for ModerationCase {
    type Id = CaseId;
    const KIND: &'static str = "moderation case";

    fn key(&self) -> CaseId {
        self.id()
    }
    fn row_version(&self) -> u64 {
        self.version()
    }
    fn stamp(&mut self, id: CaseId, version: u64) {
        self.mark_stored(id, version);
    }
    fn id_from(raw: i64) -> CaseId {
        CaseId(raw)
    }
    fn table(state: &SharedState) -> &Table<Self> {
        &state.cases
    }
    fn staged(staging: &mut Staging) -> &mut HashMap<CaseId, Staged<Self>> {
        &mut staging.cases
    }
    fn clashes_with(&self, other: &Self) -> bool {
        self.status() == CaseStatus::Open
            && other.status() == CaseStatus::Open
            && self.target_user_id() == other.target_user_id()
    }
}

struct Table<E: StoredEntity> {
    rows: DashMap<E::Id, E>,
    next_id: AtomicI64,
}

impl<E: StoredEntity> Table<E> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> E::Id {
        E::id_from(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

struct SharedState {
    reports: Table<Report>,
    blocks: Table<Block>,
    cases: Table<ModerationCase>,
    /// Serializes commits and direct writes so version checks and applies are atomic.
    write_lock: Mutex<()>,
}

/// A pending write. `base_version` is the shared version the update started from,
/// or `None` for rows inserted in this transaction.
struct Staged<E> {
    base_version: Option<u64>,
    entity: E,
}

#[derive(Default)]
struct Staging {
    reports: HashMap<ReportId, Staged<Report>>,
    blocks: HashMap<BlockId, Staged<Block>>,
    cases: HashMap<CaseId, Staged<ModerationCase>>,
}

// ============================================================================
// SESSION
// ============================================================================

/// State shared by one unit of work and its three repositories.
struct Session {
    state: Arc<SharedState>,
    staging: Mutex<Option<Staging>>,
    writes: AtomicU64,
}

impl Session {
    async fn get<E: StoredEntity>(&self, id: E::Id) -> Option<E> {
        let mut staging = self.staging.lock().await;
        if let Some(staged) = staging.as_mut().and_then(|s| E::staged(s).get(&id)) {
            return Some(staged.entity.clone());
        }
        E::table(&self.state).rows.get(&id).map(|row| row.value().clone())
    }

    /// Committed rows overlaid with this unit of work's staged rows, in id order.
    async fn list<E: StoredEntity>(&self, filter: impl Fn(&E) -> bool) -> Vec<E> {
        let mut merged: BTreeMap<E::Id, E> = E::table(&self.state)
            .rows
            .iter()
            .map(|row| (*row.key(), row.value().clone()))
            .collect();

        let mut staging = self.staging.lock().await;
        if let Some(staging) = staging.as_mut() {
            for (id, staged) in E::staged(staging).iter() {
                merged.insert(*id, staged.entity.clone());
            }
        }

        merged.into_values().filter(|e| filter(e)).collect()
    }

    async fn add<E: StoredEntity>(&self, entity: &mut E) -> Result<(), StoreError> {
        let table = E::table(&self.state);
        let id = table.allocate_id();
        entity.stamp(id, 0);

        let mut staging = self.staging.lock().await;
        match staging.as_mut() {
            Some(staging) => {
                E::staged(staging).insert(
                    id,
                    Staged {
                        base_version: None,
                        entity: entity.clone(),
                    },
                );
            }
            None => {
                let _guard = self.state.write_lock.lock().await;
                check_unique(table, entity, |_| false)?;
                table.rows.insert(id, entity.clone());
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update<E: StoredEntity>(&self, entity: &mut E) -> Result<(), StoreError> {
        let id = entity.key();
        let table = E::table(&self.state);

        let mut staging = self.staging.lock().await;
        match staging.as_mut() {
            Some(staging) => {
                let staged = E::staged(staging);
                let (current, base_version) = match staged.get(&id) {
                    Some(existing) => (existing.entity.row_version(), existing.base_version),
                    None => {
                        let version = table
                            .rows
                            .get(&id)
                            .map(|row| row.row_version())
                            .ok_or_else(|| not_found::<E>(id))?;
                        (version, Some(version))
                    }
                };
                check_version::<E>(id, current, entity.row_version())?;

                entity.stamp(id, current + 1);
                staged.insert(
                    id,
                    Staged {
                        base_version,
                        entity: entity.clone(),
                    },
                );
            }
            None => {
                let _guard = self.state.write_lock.lock().await;
                check_unique(table, entity, |_| false)?;
                let mut row = table.rows.get_mut(&id).ok_or_else(|| not_found::<E>(id))?;
                let current = row.row_version();
                check_version::<E>(id, current, entity.row_version())?;

                entity.stamp(id, current + 1);
                *row = entity.clone();
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn not_found<E: StoredEntity>(id: E::Id) -> StoreError {
    StoreError::NotFound(format!("{} {}", E::KIND, id))
}

fn check_version<E: StoredEntity>(id: E::Id, stored: u64, expected: u64) -> Result<(), StoreError> {
    if stored != expected {
        return Err(StoreError::Conflict(format!(
            "{} {} is at version {}, update was based on version {}",
            E::KIND,
            id,
            stored,
            expected
        )));
    }
    Ok(())
}

/// Fail if any staged update's base row moved on since it was read.
fn verify_staged<E: StoredEntity>(state: &SharedState, staging: &mut Staging) -> Result<(), StoreError> {
    let table = E::table(state);
    for (id, staged) in E::staged(staging).iter() {
        if let Some(base) = staged.base_version {
            let stored = table
                .rows
                .get(id)
                .map(|row| row.row_version())
                .ok_or_else(|| not_found::<E>(*id))?;
            check_version::<E>(*id, stored, base)?;
        }
    }
    Ok(())
}

/// Fail if `entity` clashes with a committed row. Rows for which `skip` holds
/// are being rewritten in the same transaction and are left out.
fn check_unique<E: StoredEntity>(
    table: &Table<E>,
    entity: &E,
    skip: impl Fn(&E::Id) -> bool,
) -> Result<(), StoreError> {
    let clash = table
        .rows
        .iter()
        .find(|row| {
            *row.key() != entity.key() && !skip(row.key()) && entity.clashes_with(row.value())
        })
        .map(|row| *row.key());

    match clash {
        Some(other) => Err(StoreError::Conflict(format!(
            "{} {} clashes with {} {}",
            E::KIND,
            entity.key(),
            E::KIND,
            other
        ))),
        None => Ok(()),
    }
}

/// Fail if any staged row clashes with what other units of work committed.
fn verify_unique<E: StoredEntity>(state: &SharedState, staging: &mut Staging) -> Result<(), StoreError> {
    let table = E::table(state);
    let staged = &*E::staged(staging);
    for entry in staged.values() {
        check_unique(table, &entry.entity, |id| staged.contains_key(id))?;
    }
    Ok(())
}

fn apply_staged<E: StoredEntity>(state: &SharedState, staging: &mut Staging) {
    let table = E::table(state);
    for (id, staged) in E::staged(staging).drain() {
        table.rows.insert(id, staged.entity);
    }
}

// ============================================================================
// STORE (FACTORY)
// ============================================================================

/// Shared in-memory moderation data. Cloning shares the same maps.
#[derive(Clone)]
pub struct InMemoryModerationStore {
    state: Arc<SharedState>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                reports: Table::new(),
                blocks: Table::new(),
                cases: Table::new(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// A unit of work over this store.
    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        let session = Arc::new(Session {
            state: Arc::clone(&self.state),
            staging: Mutex::new(None),
            writes: AtomicU64::new(0),
        });

        InMemoryUnitOfWork {
            reports: InMemoryReportRepository {
                session: Arc::clone(&session),
            },
            blocks: InMemoryBlockRepository {
                session: Arc::clone(&session),
            },
            cases: InMemoryCaseRepository {
                session: Arc::clone(&session),
            },
            session,
        }
    }
}

impl Default for InMemoryModerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryModerationStore {
    type Work = InMemoryUnitOfWork;

    async fn create(&self) -> Result<InMemoryUnitOfWork, StoreError> {
        Ok(self.unit_of_work())
    }
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

pub struct InMemoryUnitOfWork {
    session: Arc<Session>,
    reports: InMemoryReportRepository,
    blocks: InMemoryBlockRepository,
    cases: InMemoryCaseRepository,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
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
        let mut staging = self.session.staging.lock().await;
        if staging.is_some() {
            return Err(StoreError::Storage("transaction already in progress".into()));
        }
        *staging = Some(Staging::default());
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut staging = self
            .session
            .staging
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::Storage("no transaction in progress".into()))?;

        let state = &self.session.state;
        let _guard = state.write_lock.lock().await;

        verify_staged::<Report>(state, &mut staging)?;
        verify_staged::<Block>(state, &mut staging)?;
        verify_staged::<ModerationCase>(state, &mut staging)?;
        verify_unique::<Block>(state, &mut staging)?;
        verify_unique::<ModerationCase>(state, &mut staging)?;

        apply_staged::<Report>(state, &mut staging);
        apply_staged::<Block>(state, &mut staging);
        apply_staged::<ModerationCase>(state, &mut staging);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        if let Some(discarded) = self.session.staging.lock().await.take() {
            let count = discarded.reports.len() + discarded.blocks.len() + discarded.cases.len();
            tracing::debug!(discarded = count, "In-memory transaction rolled back");
        }
        self.session.writes.store(0, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// REPOSITORIES
// ============================================================================

pub struct InMemoryReportRepository {
    session: Arc<Session>,
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn get_by_id(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        Ok(self.session.get::<Report>(id).await)
    }

    async fn get_reports_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<Vec<Report>, StoreError> {
        let mut reports = self
            .session
            .list::<Report>(|r| r.reported_user_id() == reported_user_id)
            .await;
        reports.reverse();
        Ok(reports)
    }

    async fn get_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>, StoreError> {
        Ok(self.session.list::<Report>(|r| r.status() == status).await)
    }

    async fn get_pending_reports(&self) -> Result<Vec<Report>, StoreError> {
        self.get_reports_by_status(ReportStatus::Pending).await
    }

    async fn add(&self, report: &mut Report) -> Result<(), StoreError> {
        self.session.add(report).await
    }

    async fn update(&self, report: &mut Report) -> Result<(), StoreError> {
        self.session.update(report).await
    }

    async fn get_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError> {
        let reports = self
            .session
            .list::<Report>(|r| {
                r.reported_user_id() == reported_user_id && r.status() != ReportStatus::Dismissed
            })
            .await;
        Ok(reports.len() as u64)
    }

    async fn get_serious_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError> {
        let reports = self
            .session
            .list::<Report>(|r| {
                r.reported_user_id() == reported_user_id
                    && r.status() != ReportStatus::Dismissed
                    && r.reason().is_serious()
            })
            .await;
        Ok(reports.len() as u64)
    }
}

pub struct InMemoryBlockRepository {
    session: Arc<Session>,
}

#[async_trait]
impl BlockRepository for InMemoryBlockRepository {
    async fn get_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        Ok(self.session.get::<Block>(id).await)
    }

    async fn get_active_block(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<Option<Block>, StoreError> {
        let blocks = self
            .session
            .list::<Block>(|b| {
                b.is_active()
                    && b.blocker_id() == blocker_id
                    && b.blocked_user_id() == blocked_user_id
            })
            .await;
        Ok(blocks.into_iter().next())
    }

    async fn get_blocks_by_user(&self, blocker_id: UserId) -> Result<Vec<Block>, StoreError> {
        Ok(self.session.list::<Block>(|b| b.blocker_id() == blocker_id).await)
    }

    async fn get_blocks_for_user(&self, blocked_user_id: UserId) -> Result<Vec<Block>, StoreError> {
        Ok(self
            .session
            .list::<Block>(|b| b.blocked_user_id() == blocked_user_id)
            .await)
    }

    async fn add(&self, block: &mut Block) -> Result<(), StoreError> {
        self.session.add(block).await
    }

    async fn update(&self, block: &mut Block) -> Result<(), StoreError> {
        self.session.update(block).await
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

pub struct InMemoryCaseRepository {
    session: Arc<Session>,
}

#[async_trait]
impl ModerationCaseRepository for InMemoryCaseRepository {
    async fn get_by_id(&self, id: CaseId) -> Result<Option<ModerationCase>, StoreError> {
        Ok(self.session.get::<ModerationCase>(id).await)
    }

    async fn get_cases_for_user(
        &self,
        target_user_id: UserId,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        Ok(self
            .session
            .list::<ModerationCase>(|c| c.target_user_id() == target_user_id)
            .await)
    }

    async fn get_cases_by_status(
        &self,
        status: CaseStatus,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        Ok(self
            .session
            .list::<ModerationCase>(|c| c.status() == status)
            .await)
    }

    async fn get_assigned_cases(
        &self,
        moderator_id: UserId,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        Ok(self
            .session
            .list::<ModerationCase>(|c| c.assigned_to() == Some(moderator_id))
            .await)
    }

    async fn get_cases_by_priority(
        &self,
        priority: CasePriority,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        Ok(self
            .session
            .list::<ModerationCase>(|c| c.priority() == priority)
            .await)
    }

    async fn add(&self, case: &mut ModerationCase) -> Result<(), StoreError> {
        self.session.add(case).await
    }

    async fn update(&self, case: &mut ModerationCase) -> Result<(), StoreError> {
        self.session.update(case).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ReportReason;

    fn uid(v: i64) -> UserId {
        UserId::new(v).unwrap()
    }

    fn spam(reporter: i64, reported: i64) -> Report {
        Report::new(uid(reporter), uid(reported), ReportReason::Spam, None).unwrap()
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_ids() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();

        let mut first = spam(1, 2);
        let mut second = spam(3, 2);
        work.reports().add(&mut first).await.unwrap();
        work.reports().add(&mut second).await.unwrap();

        assert_eq!(first.id(), ReportId(1));
        assert_eq!(second.id(), ReportId(2));
        assert_eq!(work.save_changes().await.unwrap(), 2);
        assert_eq!(work.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reports_for_user_newest_first() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();
        for reporter in 1..=3 {
            work.reports().add(&mut spam(reporter + 10, 2)).await.unwrap();
        }
        work.reports().add(&mut spam(1, 9)).await.unwrap();

        let reports = work.reports().get_reports_for_user(uid(2)).await.unwrap();
        let ids: Vec<i64> = reports.iter().map(|r| r.id().get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_staged_writes_hidden_until_commit() {
        let store = InMemoryModerationStore::new();
        let writer = store.unit_of_work();
        let reader = store.unit_of_work();

        writer.begin_transaction().await.unwrap();
        let mut report = spam(1, 2);
        writer.reports().add(&mut report).await.unwrap();

        // Visible to the writer, invisible to everyone else.
        assert!(writer.reports().get_by_id(report.id()).await.unwrap().is_some());
        assert!(reader.reports().get_by_id(report.id()).await.unwrap().is_none());
        assert_eq!(
            writer
                .reports()
                .get_active_reports_count_for_user(uid(2))
                .await
                .unwrap(),
            1
        );

        writer.commit().await.unwrap();
        assert!(reader.reports().get_by_id(report.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();

        work.begin_transaction().await.unwrap();
        let mut block = Block::new(uid(1), uid(2), None).unwrap();
        work.blocks().add(&mut block).await.unwrap();
        work.rollback().await.unwrap();

        assert!(!work.blocks().exists_active_block(uid(1), uid(2)).await.unwrap());
        assert_eq!(work.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryModerationStore::new();
        let setup = store.unit_of_work();
        let mut case = ModerationCase::new(uid(2), CasePriority::Low);
        setup.cases().add(&mut case).await.unwrap();

        let mut first = setup.cases().get_by_id(case.id()).await.unwrap().unwrap();
        let mut second = first.clone();

        first.assign_to(uid(10)).unwrap();
        setup.cases().update(&mut first).await.unwrap();
        assert_eq!(first.version(), 1);

        second.assign_to(uid(11)).unwrap();
        let err = setup.cases().update(&mut second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = setup.cases().get_by_id(case.id()).await.unwrap().unwrap();
        assert_eq!(stored.assigned_to(), Some(uid(10)));
    }

    #[tokio::test]
    async fn test_commit_rejects_update_when_base_moved() {
        let store = InMemoryModerationStore::new();
        let setup = store.unit_of_work();
        let mut case = ModerationCase::new(uid(2), CasePriority::Low);
        setup.cases().add(&mut case).await.unwrap();

        let slow = store.unit_of_work();
        slow.begin_transaction().await.unwrap();
        let mut slow_case = slow.cases().get_by_id(case.id()).await.unwrap().unwrap();
        slow_case.assign_to(uid(20)).unwrap();
        slow.cases().update(&mut slow_case).await.unwrap();

        // Another moderator commits first.
        let fast = store.unit_of_work();
        let mut fast_case = fast.cases().get_by_id(case.id()).await.unwrap().unwrap();
        fast_case.assign_to(uid(21)).unwrap();
        fast.cases().update(&mut fast_case).await.unwrap();

        assert!(matches!(slow.commit().await, Err(StoreError::Conflict(_))));
        let stored = setup.cases().get_by_id(case.id()).await.unwrap().unwrap();
        assert_eq!(stored.assigned_to(), Some(uid(21)));
    }

    #[tokio::test]
    async fn test_update_unknown_row_is_not_found() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();
        let mut report = spam(1, 2);
        report.mark_stored(ReportId(77), 0);
        assert!(matches!(
            work.reports().update(&mut report).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();
        work.begin_transaction().await.unwrap();
        assert!(work.begin_transaction().await.is_err());
        work.commit().await.unwrap();
        assert!(work.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_block_queries() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();
        let mut a = Block::new(uid(1), uid(2), None).unwrap();
        let mut b = Block::new(uid(1), uid(3), None).unwrap();
        let mut c = Block::new(uid(4), uid(2), None).unwrap();
        for block in [&mut a, &mut b, &mut c] {
            work.blocks().add(block).await.unwrap();
        }

        assert_eq!(work.blocks().get_blocks_by_user(uid(1)).await.unwrap().len(), 2);
        assert_eq!(work.blocks().get_blocks_for_user(uid(2)).await.unwrap().len(), 2);

        a.revoke().unwrap();
        work.blocks().update(&mut a).await.unwrap();
        assert!(work.blocks().get_active_block(uid(1), uid(2)).await.unwrap().is_none());
        assert!(work.blocks().get_by_id(a.id()).await.unwrap().unwrap().is_revoked());
    }

    #[tokio::test]
    async fn test_overlapping_blocks_for_same_pair_one_commit_wins() {
        let store = InMemoryModerationStore::new();
        let first = store.unit_of_work();
        let second = store.unit_of_work();
        first.begin_transaction().await.unwrap();
        second.begin_transaction().await.unwrap();

        // Both checked before either committed.
        for work in [&first, &second] {
            assert!(!work.blocks().exists_active_block(uid(1), uid(2)).await.unwrap());
            let mut block = Block::new(uid(1), uid(2), None).unwrap();
            work.blocks().add(&mut block).await.unwrap();
        }

        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));
        second.rollback().await.unwrap();

        let view = store.unit_of_work();
        let blocks = view.blocks().get_blocks_by_user(uid(1)).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_active());
    }

    #[tokio::test]
    async fn test_overlapping_reports_open_one_case_per_target() {
        let store = InMemoryModerationStore::new();
        let first = store.unit_of_work();
        let second = store.unit_of_work();
        first.begin_transaction().await.unwrap();
        second.begin_transaction().await.unwrap();

        // Each unit of work files a violence report and, finding no open case,
        // opens one.
        for (work, reporter) in [(&first, 10), (&second, 11)] {
            let mut report =
                Report::new(uid(reporter), uid(2), ReportReason::Violence, None).unwrap();
            work.reports().add(&mut report).await.unwrap();
            assert_eq!(
                work.reports()
                    .get_active_reports_count_for_user(uid(2))
                    .await
                    .unwrap(),
                1
            );
            assert!(work
                .cases()
                .get_cases_by_status(CaseStatus::Open)
                .await
                .unwrap()
                .is_empty());

            let mut case = ModerationCase::new(uid(2), CasePriority::Critical);
            case.add_report(report.id()).unwrap();
            work.cases().add(&mut case).await.unwrap();
        }

        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));
        second.rollback().await.unwrap();

        let view = store.unit_of_work();
        assert_eq!(view.reports().get_reports_for_user(uid(2)).await.unwrap().len(), 1);
        let cases = view.cases().get_cases_for_user(uid(2)).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].report_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_duplicate_active_block_conflicts() {
        let store = InMemoryModerationStore::new();
        let work = store.unit_of_work();
        let mut first = Block::new(uid(1), uid(2), None).unwrap();
        work.blocks().add(&mut first).await.unwrap();

        let mut duplicate = Block::new(uid(1), uid(2), None).unwrap();
        assert!(matches!(
            work.blocks().add(&mut duplicate).await,
            Err(StoreError::Conflict(_))
        ));

        // Once the first is revoked the pair may be blocked again.
        first.revoke().unwrap();
        work.blocks().update(&mut first).await.unwrap();
        let mut again = Block::new(uid(1), uid(2), None).unwrap();
        work.blocks().add(&mut again).await.unwrap();
        assert_eq!(work.blocks().get_blocks_by_user(uid(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_may_close_and_reopen_case_for_target() {
        let store = InMemoryModerationStore::new();
        let setup = store.unit_of_work();
        let mut old = ModerationCase::new(uid(2), CasePriority::Low);
        setup.cases().add(&mut old).await.unwrap();

        let work = store.unit_of_work();
        work.begin_transaction().await.unwrap();
        let mut taken = work.cases().get_by_id(old.id()).await.unwrap().unwrap();
        taken.assign_to(uid(30)).unwrap();
        work.cases().update(&mut taken).await.unwrap();
        let mut fresh = ModerationCase::new(uid(2), CasePriority::Low);
        work.cases().add(&mut fresh).await.unwrap();
        work.commit().await.unwrap();

        let open = setup.cases().get_cases_by_status(CaseStatus::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id(), fresh.id());
    }
}
