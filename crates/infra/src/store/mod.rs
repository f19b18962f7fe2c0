//! Persistence boundary for workflows and requisitions.
//!
//! Implementations must provide atomic multi-row commits, unique requisition
//! numbers, compare-and-set on the requisition state, and explicit cascade
//! of items and ledger rows on delete.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    RequisitionChange, RequisitionFilter, RequisitionStore, Store, StoreError, StoreResult,
    WorkflowStore,
};
