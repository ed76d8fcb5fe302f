pub mod directory;
pub mod follow;
pub mod group_store;
pub mod message_store;

pub use directory::PgDirectory;
pub use follow::PgFollowGate;
pub use group_store::PgGroupStore;
pub use message_store::PgMessageStore;
