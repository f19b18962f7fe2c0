//! Requisition aggregate: header + owned line items, with derived cost totals.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{
    AggregateRoot, CatalogItemId, DomainError, DomainResult, Entity, Money, RequisitionId,
    RequisitionItemId, UnitId, UserId, WorkflowId,
};

use crate::number::RequisitionNumber;
use crate::state_machine::{ExpectedState, RequisitionState};

/// Persisted requisition status. Stored as a fixed lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    PendingApproval,
    Approved,
    Rejected,
}

impl RequisitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequisitionStatus::Draft => "draft",
            RequisitionStatus::Submitted => "submitted",
            RequisitionStatus::PendingApproval => "pending_approval",
            RequisitionStatus::Approved => "approved",
            RequisitionStatus::Rejected => "rejected",
        }
    }

    /// Waiting on an approver.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RequisitionStatus::Submitted | RequisitionStatus::PendingApproval
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequisitionStatus::Approved | RequisitionStatus::Rejected)
    }
}

impl FromStr for RequisitionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RequisitionStatus::Draft),
            "submitted" => Ok(RequisitionStatus::Submitted),
            "pending_approval" => Ok(RequisitionStatus::PendingApproval),
            "approved" => Ok(RequisitionStatus::Approved),
            "rejected" => Ok(RequisitionStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown requisition status '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(DomainError::validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// Requisition line item.
///
/// Name/description/cost are a snapshot taken at creation; later catalog edits
/// never flow back into recorded items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: RequisitionItemId,
    pub requisition_id: RequisitionId,
    /// Position within the requisition (1-based).
    pub line_no: u32,
    pub inventory_id: Option<CatalogItemId>,
    pub item_name: String,
    pub description: Option<String>,
    pub quantity_requested: i64,
    pub unit_id: Option<UnitId>,
    pub estimated_unit_cost: Money,
    pub total_estimated_cost: Money,
    pub notes: Option<String>,
    /// Cap set by a partial approval; `None` means the full request stands.
    pub quantity_approved: Option<i64>,
    pub quantity_fulfilled: i64,
}

impl Entity for RequisitionItem {
    type Id = RequisitionItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl RequisitionItem {
    /// Quantity that may be issued in total.
    pub fn issuable_cap(&self) -> i64 {
        self.quantity_approved.unwrap_or(self.quantity_requested)
    }

    /// Quantity still waiting to be issued.
    pub fn remaining(&self) -> i64 {
        (self.issuable_cap() - self.quantity_fulfilled).max(0)
    }
}

/// Line item input.
///
/// Items pointing at a catalog entry may leave name, unit and cost empty; the
/// service fills them from the catalog before the requisition is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisitionItem {
    pub inventory_id: Option<CatalogItemId>,
    #[serde(default)]
    pub item_name: String,
    pub description: Option<String>,
    pub quantity_requested: i64,
    pub unit_id: Option<UnitId>,
    /// Smallest currency unit.
    pub estimated_unit_cost: Option<i64>,
    pub notes: Option<String>,
}

impl NewRequisitionItem {
    pub fn new(item_name: impl Into<String>, quantity_requested: i64, estimated_unit_cost: i64) -> Self {
        Self {
            inventory_id: None,
            item_name: item_name.into(),
            description: None,
            quantity_requested,
            unit_id: None,
            estimated_unit_cost: Some(estimated_unit_cost),
            notes: None,
        }
    }

    /// Item to be prefilled from the catalog entry `inventory_id`.
    pub fn from_catalog(inventory_id: CatalogItemId, quantity_requested: i64) -> Self {
        Self {
            inventory_id: Some(inventory_id),
            item_name: String::new(),
            description: None,
            quantity_requested,
            unit_id: None,
            estimated_unit_cost: None,
            notes: None,
        }
    }
}

/// Input for creating a draft requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub title: String,
    pub description: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub workflow_id: WorkflowId,
    pub justification: Option<String>,
    pub required_date: Option<NaiveDate>,
    pub items: Vec<NewRequisitionItem>,
}

/// Draft edit. `None` leaves a field untouched; `items: Some(..)` replaces the
/// whole item set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub priority: Option<Priority>,
    pub workflow_id: Option<WorkflowId>,
    pub justification: Option<String>,
    pub required_date: Option<NaiveDate>,
    pub items: Option<Vec<NewRequisitionItem>>,
}

/// Aggregate root: Requisition (header + items).
///
/// Ledger rows are owned by the requisition too, but loaded separately since
/// they are append-only history rather than mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub number: RequisitionNumber,
    pub title: String,
    pub description: Option<String>,
    pub requested_by: UserId,
    pub department: Option<String>,
    pub priority: Priority,
    pub status: RequisitionStatus,
    pub workflow_id: WorkflowId,
    /// 1-based; meaningless once the status is terminal.
    pub current_step: u32,
    /// Submission counter; ledger rows are grouped by the round they belong to.
    pub round: u32,
    /// Bumped on every committed change; part of the compare-and-set guard.
    pub revision: u64,
    pub total_estimated_cost: Money,
    pub justification: Option<String>,
    pub required_date: Option<NaiveDate>,
    pub items: Vec<RequisitionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl AggregateRoot for Requisition {
    type Id = RequisitionId;
    type Child = RequisitionItem;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn children(&self) -> &[RequisitionItem] {
        &self.items
    }
}

/// Σ(quantity_requested × estimated_unit_cost).
pub fn total_cost(items: &[RequisitionItem]) -> DomainResult<Money> {
    Money::sum(
        items
            .iter()
            .map(|i| i.estimated_unit_cost.times(i.quantity_requested))
            .collect::<DomainResult<Vec<_>>>()?,
    )
}

fn build_items(
    requisition_id: RequisitionId,
    inputs: Vec<NewRequisitionItem>,
) -> DomainResult<Vec<RequisitionItem>> {
    if inputs.is_empty() {
        return Err(DomainError::validation(
            "Requisition must contain at least one item",
        ));
    }

    inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let line = idx + 1;
            let name = input.item_name.trim();
            if name.is_empty() {
                return Err(DomainError::validation(format!(
                    "Item {line}: name is required"
                )));
            }
            if input.quantity_requested <= 0 {
                return Err(DomainError::validation(format!(
                    "Item {line}: quantity must be greater than zero"
                )));
            }
            let Some(cost) = input.estimated_unit_cost else {
                return Err(DomainError::validation(format!(
                    "Item {line}: unit cost is required"
                )));
            };
            let unit_cost = Money::from_minor(cost).map_err(|_| {
                DomainError::validation(format!("Item {line}: unit cost cannot be negative"))
            })?;
            Ok(RequisitionItem {
                id: RequisitionItemId::new(),
                requisition_id,
                line_no: line as u32,
                inventory_id: input.inventory_id,
                item_name: name.to_string(),
                description: input.description,
                quantity_requested: input.quantity_requested,
                unit_id: input.unit_id,
                estimated_unit_cost: unit_cost,
                total_estimated_cost: unit_cost.times(input.quantity_requested)?,
                notes: input.notes,
                quantity_approved: None,
                quantity_fulfilled: 0,
            })
        })
        .collect()
}

impl Requisition {
    /// Validate input and build a new draft.
    pub fn draft(
        input: NewRequisition,
        requested_by: UserId,
        number: RequisitionNumber,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("Title is required"));
        }

        let id = RequisitionId::new();
        let items = build_items(id, input.items)?;
        let total_estimated_cost = total_cost(&items)?;

        Ok(Self {
            id,
            number,
            title: title.to_string(),
            description: input.description,
            requested_by,
            department: input.department,
            priority: input.priority,
            status: RequisitionStatus::Draft,
            workflow_id: input.workflow_id,
            current_step: 1,
            round: 0,
            revision: 0,
            total_estimated_cost,
            justification: input.justification,
            required_date: input.required_date,
            items,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
        })
    }

    /// Draft edit. Ownership and status are enforced here as well as in the
    /// service so the aggregate can never be edited outside of draft.
    pub fn apply_update(&mut self, update: RequisitionUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != RequisitionStatus::Draft {
            return Err(DomainError::conflict("Only draft requisitions can be edited"));
        }

        if let Some(title) = update.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(DomainError::validation("Title is required"));
            }
            self.title = title.to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(department) = update.department {
            self.department = Some(department);
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(workflow_id) = update.workflow_id {
            self.workflow_id = workflow_id;
        }
        if let Some(justification) = update.justification {
            self.justification = Some(justification);
        }
        if let Some(required_date) = update.required_date {
            self.required_date = Some(required_date);
        }
        if let Some(items) = update.items {
            self.items = build_items(self.id, items)?;
        }

        self.total_estimated_cost = total_cost(&self.items)?;
        self.updated_at = now;
        Ok(())
    }

    /// Tagged view of the persisted (status, current_step) pair.
    pub fn state(&self) -> RequisitionState {
        RequisitionState::from_parts(self.status, self.current_step)
    }

    /// Compare-and-set guard describing the state this snapshot was read at.
    pub fn expected_state(&self) -> ExpectedState {
        ExpectedState {
            status: self.status,
            current_step: self.current_step,
            revision: self.revision,
        }
    }

    pub fn item(&self, id: RequisitionItemId) -> Option<&RequisitionItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn fulfillment(&self) -> crate::issuance::FulfillmentStatus {
        crate::issuance::FulfillmentStatus::of(&self.items)
    }
}
