pub mod in_memory;
pub mod sqlite_moderation_store;

pub use in_memory::{
    InMemoryBlockRepository, InMemoryCaseRepository, InMemoryModerationStore,
    InMemoryReportRepository, InMemoryUnitOfWork,
};
pub use sqlite_moderation_store::{
    SqliteBlockRepository, SqliteCaseRepository, SqliteModerationStore, SqliteReportRepository,
    SqliteUnitOfWork,
};
