//! SQLite persistence for the vigil alerting engine.
//!
//! Two stores share one database file: [`RuleStore`] holds the rule
//! population (rules serialize into a `config_json` column) and
//! [`SqliteClaimStore`] implements the shard lease CAS with a single
//! conditional write.

pub mod claim_store;
pub mod error;
pub mod rule_store;


pub use claim_store::SqliteClaimStore;
pub use error::{Result, StorageError};
pub use rule_store::RuleStore;
