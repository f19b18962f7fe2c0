use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wareflow_core::{RequisitionId, UserId, WorkflowId};
use wareflow_requisitions::{
    ApprovalEntry, ApprovalWorkflow, ExpectedState, Priority, Requisition, RequisitionStatus,
};

/// Persistence failure.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, permissions).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Compare-and-set mismatch, or a delete blocked by a reference.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requisition number already taken; the caller retries with a new one.
    #[error("requisition number '{0}' already exists")]
    DuplicateNumber(String),

    #[error("not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Optional filters for listing requisitions. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
    pub priority: Option<Priority>,
    pub department: Option<String>,
    pub requested_by: Option<UserId>,
}

impl RequisitionFilter {
    pub fn matches(&self, requisition: &Requisition) -> bool {
        self.status.is_none_or(|s| s == requisition.status)
            && self.priority.is_none_or(|p| p == requisition.priority)
            && self
                .department
                .as_deref()
                .is_none_or(|d| requisition.department.as_deref() == Some(d))
            && self.requested_by.is_none_or(|u| u == requisition.requested_by)
    }
}

/// One atomic write against a requisition.
///
/// The header, the full item set and the optional ledger row are written
/// together, and only if the stored row still matches `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequisitionChange {
    pub expected: ExpectedState,
    pub requisition: Requisition,
    pub ledger_entry: Option<ApprovalEntry>,
}

/// Workflow definitions.
#[async_trait::async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist header and steps together.
    async fn insert_workflow(&self, workflow: ApprovalWorkflow) -> StoreResult<()>;

    /// Header only; steps are immutable.
    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    /// `Conflict` while any requisition references the workflow.
    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()>;

    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<Option<ApprovalWorkflow>>;

    /// All workflows, ordered by name.
    async fn list_workflows(&self) -> StoreResult<Vec<ApprovalWorkflow>>;
}

/// Requisitions with their items and ledger.
#[async_trait::async_trait]
pub trait RequisitionStore: Send + Sync {
    /// `DuplicateNumber` when the number is taken.
    async fn insert_requisition(&self, requisition: Requisition) -> StoreResult<()>;

    async fn get_requisition(&self, id: RequisitionId) -> StoreResult<Option<Requisition>>;

    /// Newest first.
    async fn list_requisitions(&self, filter: &RequisitionFilter) -> StoreResult<Vec<Requisition>>;

    /// Apply `change` atomically. Returns the stored snapshot with its new
    /// revision, or `Conflict` if the row moved since `change.expected`.
    async fn commit(&self, change: RequisitionChange) -> StoreResult<Requisition>;

    /// Remove header, items and ledger rows, guarded like `commit`.
    async fn delete_requisition(&self, id: RequisitionId, expected: ExpectedState) -> StoreResult<()>;

    /// Ledger rows in insertion order.
    async fn ledger(&self, id: RequisitionId) -> StoreResult<Vec<ApprovalEntry>>;
}

/// Both halves of the persistence boundary, usable as `Arc<dyn Store>`.
pub trait Store: WorkflowStore + RequisitionStore {}

impl<S> Store for S where S: WorkflowStore + RequisitionStore + ?Sized {}

#[async_trait::async_trait]
impl<S> WorkflowStore for Arc<S>
where
    S: WorkflowStore + ?Sized,
{
    async fn insert_workflow(&self, workflow: ApprovalWorkflow) -> StoreResult<()> {
        (**self).insert_workflow(workflow).await
    }

    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        (**self).update_workflow(workflow).await
    }

    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()> {
        (**self).delete_workflow(id).await
    }

    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<Option<ApprovalWorkflow>> {
        (**self).get_workflow(id).await
    }

    async fn list_workflows(&self) -> StoreResult<Vec<ApprovalWorkflow>> {
        (**self).list_workflows().await
    }
}

#[async_trait::async_trait]
impl<S> RequisitionStore for Arc<S>
where
    S: RequisitionStore + ?Sized,
{
    async fn insert_requisition(&self, requisition: Requisition) -> StoreResult<()> {
        (**self).insert_requisition(requisition).await
    }

    async fn get_requisition(&self, id: RequisitionId) -> StoreResult<Option<Requisition>> {
        (**self).get_requisition(id).await
    }

    async fn list_requisitions(&self, filter: &RequisitionFilter) -> StoreResult<Vec<Requisition>> {
        (**self).list_requisitions(filter).await
    }

    async fn commit(&self, change: RequisitionChange) -> StoreResult<Requisition> {
        (**self).commit(change).await
    }

    async fn delete_requisition(&self, id: RequisitionId, expected: ExpectedState) -> StoreResult<()> {
        (**self).delete_requisition(id, expected).await
    }

    async fn ledger(&self, id: RequisitionId) -> StoreResult<Vec<ApprovalEntry>> {
        (**self).ledger(id).await
    }
}
