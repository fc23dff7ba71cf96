// The core module contains all business logic.
// Nothing here knows about SQLite or any other storage engine.

#[path = "moderation/mod.rs"]
pub mod moderation;
