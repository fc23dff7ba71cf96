// Core moderation module - trust & safety business logic.
//
// Value objects, the Report/Block/ModerationCase entities, the policy engine,
// the storage ports, and the service that ties them together.

pub mod block;
pub mod moderation_case;
pub mod moderation_models;
pub mod moderation_policy;
pub mod moderation_service;
pub mod moderation_store;
pub mod report;

pub use block::*;
pub use moderation_case::*;
pub use moderation_models::*;
pub use moderation_policy::*;
pub use moderation_service::*;
pub use moderation_store::*;
pub use report::*;
