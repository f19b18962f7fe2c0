use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{RequisitionId, UserId, WorkflowId};
use wareflow_events::Event;

use crate::issuance::{FulfillmentStatus, IssueLine};
use crate::ledger::ApprovalAction;
use crate::number::RequisitionNumber;
use crate::requisition::RequisitionStatus;

/// Event: RequisitionCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCreated {
    pub requisition_id: RequisitionId,
    pub number: RequisitionNumber,
    pub requested_by: UserId,
    pub workflow_id: WorkflowId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionSubmitted {
    pub requisition_id: RequisitionId,
    pub round: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalRecorded.
///
/// One per approver action; `new_status`/`new_step` describe where the
/// requisition landed after the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecorded {
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub action: ApprovalAction,
    pub step_order: u32,
    pub new_status: RequisitionStatus,
    pub new_step: u32,
    pub partial: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsIssued {
    pub requisition_id: RequisitionId,
    pub issued_by: UserId,
    pub lines: Vec<IssueLine>,
    pub fulfillment: FulfillmentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionDeleted {
    pub requisition_id: RequisitionId,
    pub occurred_at: DateTime<Utc>,
}

/// Notifications published after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionEvent {
    RequisitionCreated(RequisitionCreated),
    RequisitionSubmitted(RequisitionSubmitted),
    ApprovalRecorded(ApprovalRecorded),
    ItemsIssued(ItemsIssued),
    RequisitionDeleted(RequisitionDeleted),
}

impl RequisitionEvent {
    pub fn requisition_id(&self) -> RequisitionId {
        match self {
            RequisitionEvent::RequisitionCreated(e) => e.requisition_id,
            RequisitionEvent::RequisitionSubmitted(e) => e.requisition_id,
            RequisitionEvent::ApprovalRecorded(e) => e.requisition_id,
            RequisitionEvent::ItemsIssued(e) => e.requisition_id,
            RequisitionEvent::RequisitionDeleted(e) => e.requisition_id,
        }
    }
}

impl Event for RequisitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::RequisitionCreated(_) => "requisitions.requisition.created",
            RequisitionEvent::RequisitionSubmitted(_) => "requisitions.requisition.submitted",
            RequisitionEvent::ApprovalRecorded(e) => match e.new_status {
                RequisitionStatus::Approved => "requisitions.requisition.approved",
                RequisitionStatus::Rejected => "requisitions.requisition.rejected",
                RequisitionStatus::Draft => "requisitions.requisition.returned",
                _ => "requisitions.requisition.step_approved",
            },
            RequisitionEvent::ItemsIssued(_) => "requisitions.requisition.items_issued",
            RequisitionEvent::RequisitionDeleted(_) => "requisitions.requisition.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequisitionEvent::RequisitionCreated(e) => e.occurred_at,
            RequisitionEvent::RequisitionSubmitted(e) => e.occurred_at,
            RequisitionEvent::ApprovalRecorded(e) => e.occurred_at,
            RequisitionEvent::ItemsIssued(e) => e.occurred_at,
            RequisitionEvent::RequisitionDeleted(e) => e.occurred_at,
        }
    }
}
