// Trust & moderation policy engine.
//
// - `core/` = Business logic: value objects, entities, policy, storage ports
// - `infra/` = Implementations of the storage ports (in-memory, SQLite)
// - `config` = Environment-driven settings for the sweeper binary

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub mod config;

pub use crate::core::moderation::{
    ModerationError, ModerationPolicyService, ModerationService, PolicyConfig,
};
pub use crate::infra::moderation::{InMemoryModerationStore, SqliteModerationStore};
