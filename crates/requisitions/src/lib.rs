//! `wareflow-requisitions`: requisition approval domain.
//!
//! Pure domain code: workflow definitions, the requisition aggregate and its
//! cost math, the approval state machine, the ledger, quantity reconciliation
//! and issuance planning. Persistence and orchestration live in
//! `wareflow-infra`.

pub mod access;
pub mod events;
pub mod issuance;
pub mod ledger;
pub mod number;
pub mod reconcile;
pub mod requisition;
pub mod state_machine;
pub mod workflow;

pub use events::RequisitionEvent;
pub use issuance::{FulfillmentStatus, IssueLine, IssueMode, IssuePlan, IssueRequest};
pub use ledger::{ApprovalAction, ApprovalEntry, ApprovedQuantity, StepSummary};
pub use number::RequisitionNumber;
pub use requisition::{
    NewRequisition, NewRequisitionItem, Priority, Requisition, RequisitionItem, RequisitionStatus,
    RequisitionUpdate,
};
pub use state_machine::{
    ApprovalDecision, Command, Effect, ExpectedState, QuorumPolicy, RequisitionState,
    STALE_STATE, Transition, TransitionContext,
};
pub use workflow::{
    ApprovalWorkflow, NewWorkflow, NewWorkflowStep, WorkflowStep, WorkflowSummary,
    WorkflowUpdate,
};
