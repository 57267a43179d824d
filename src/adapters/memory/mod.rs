//! In-memory adapters.
//!
//! Implement the storage ports without a database, for tests and local
//! development. Row locking is emulated with per-key async mutexes.

mod keyed_locks;
mod ledger_store;
mod member_directory;
mod webhook_event_repository;

pub use keyed_locks::{KeyedLockGuard, KeyedLocks};
pub use ledger_store::InMemoryLedgerStore;
pub use member_directory::InMemoryMemberDirectory;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
