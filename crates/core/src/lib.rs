//! `wareflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the shared error model, aggregate/entity markers and the
//! `Money` value object used for requisition cost math.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    ApprovalId, CatalogItemId, RequisitionId, RequisitionItemId, UnitId, UserId, WorkflowId,
    WorkflowStepId,
};
pub use value_object::{Money, ValueObject};
