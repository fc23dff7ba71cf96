// The infra module contains implementations of core traits.

#[path = "moderation/mod.rs"]
pub mod moderation;
