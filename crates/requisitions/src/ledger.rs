//! Approval ledger: append-only record of every approver action.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_auth::Role;
use wareflow_core::{
    ApprovalId, DomainError, RequisitionId, RequisitionItemId, UserId, WorkflowStepId,
};

use crate::workflow::WorkflowStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
    Returned,
}

impl ApprovalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalAction::Approved => "approved",
            ApprovalAction::Rejected => "rejected",
            ApprovalAction::Returned => "returned",
        }
    }
}

impl FromStr for ApprovalAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ApprovalAction::Approved),
            "rejected" => Ok(ApprovalAction::Rejected),
            "returned" => Ok(ApprovalAction::Returned),
            other => Err(DomainError::validation(format!(
                "unknown approval action '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item quantity chosen by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedQuantity {
    pub item_id: RequisitionItemId,
    pub quantity: i64,
}

impl ApprovedQuantity {
    pub fn new(item_id: RequisitionItemId, quantity: i64) -> Self {
        Self { item_id, quantity }
    }
}

/// One ledger row. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub id: ApprovalId,
    pub requisition_id: RequisitionId,
    pub workflow_step_id: WorkflowStepId,
    pub step_order: u32,
    /// Submission round the action belongs to.
    pub round: u32,
    pub approver_id: UserId,
    pub approver_role: Role,
    pub action: ApprovalAction,
    pub comments: Option<String>,
    /// Set when the approver trimmed at least one item below its request.
    pub partial: bool,
    pub approved_quantities: Vec<ApprovedQuantity>,
    pub created_at: DateTime<Utc>,
}

/// Order rows for display: timestamp first, insertion order on ties.
pub fn history(mut entries: Vec<ApprovalEntry>) -> Vec<ApprovalEntry> {
    // stable sort keeps insertion order for equal timestamps
    entries.sort_by_key(|e| e.created_at);
    entries
}

/// Rows recorded at `step_order` during `round`.
pub fn votes_at<'a>(
    entries: &'a [ApprovalEntry],
    round: u32,
    step_order: u32,
) -> impl Iterator<Item = &'a ApprovalEntry> + 'a {
    entries
        .iter()
        .filter(move |e| e.round == round && e.step_order == step_order)
}

pub fn has_voted(entries: &[ApprovalEntry], round: u32, step_order: u32, approver: UserId) -> bool {
    votes_at(entries, round, step_order).any(|e| e.approver_id == approver)
}

/// Distinct approvers that approved at `step_order` during `round`.
pub fn approvals_at(entries: &[ApprovalEntry], round: u32, step_order: u32) -> u32 {
    let mut approvers: Vec<UserId> = votes_at(entries, round, step_order)
        .filter(|e| e.action == ApprovalAction::Approved)
        .map(|e| e.approver_id)
        .collect();
    approvers.sort();
    approvers.dedup();
    approvers.len() as u32
}

/// Per-step action counts across the whole history of a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step_order: u32,
    pub approver_role: Role,
    pub required_approvers: u32,
    pub approved: u32,
    pub rejected: u32,
    pub returned: u32,
}

pub fn step_summaries(steps: &[WorkflowStep], entries: &[ApprovalEntry]) -> Vec<StepSummary> {
    let mut summaries: Vec<StepSummary> = steps
        .iter()
        .map(|step| {
            let mut summary = StepSummary {
                step_order: step.step_order,
                approver_role: step.approver_role.clone(),
                required_approvers: step.required_approvers,
                approved: 0,
                rejected: 0,
                returned: 0,
            };
            for entry in entries.iter().filter(|e| e.step_order == step.step_order) {
                match entry.action {
                    ApprovalAction::Approved => summary.approved += 1,
                    ApprovalAction::Rejected => summary.rejected += 1,
                    ApprovalAction::Returned => summary.returned += 1,
                }
            }
            summary
        })
        .collect();
    summaries.sort_by_key(|s| s.step_order);
    summaries
}
