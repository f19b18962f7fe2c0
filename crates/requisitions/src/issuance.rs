//! Post-approval stock issuance against the approved caps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{DomainError, DomainResult, RequisitionItemId};

use crate::requisition::{Requisition, RequisitionItem, RequisitionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueMode {
    /// Issue everything still outstanding.
    Full,
    /// Issue the listed amounts, clamped to what is outstanding.
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLine {
    pub item_id: RequisitionItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub mode: IssueMode,
    #[serde(default)]
    pub quantities: Vec<IssueLine>,
}

impl IssueRequest {
    pub fn full() -> Self {
        Self {
            mode: IssueMode::Full,
            quantities: Vec::new(),
        }
    }

    pub fn partial(quantities: Vec<IssueLine>) -> Self {
        Self {
            mode: IssueMode::Partial,
            quantities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    PartiallyFulfilled,
    Fulfilled,
}

impl FulfillmentStatus {
    pub fn of(items: &[RequisitionItem]) -> Self {
        if !items.is_empty() && items.iter().all(|i| i.quantity_fulfilled >= i.issuable_cap()) {
            FulfillmentStatus::Fulfilled
        } else if items.iter().any(|i| i.quantity_fulfilled > 0) {
            FulfillmentStatus::PartiallyFulfilled
        } else {
            FulfillmentStatus::Unfulfilled
        }
    }
}

/// Amounts to add to `quantity_fulfilled`, one line per touched item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePlan {
    pub lines: Vec<IssueLine>,
}

/// Work out what an issue request releases. Does not mutate anything.
pub fn plan(requisition: &Requisition, request: &IssueRequest) -> DomainResult<IssuePlan> {
    if requisition.status != RequisitionStatus::Approved {
        return Err(DomainError::conflict(
            "Only approved requisitions can be issued",
        ));
    }
    if requisition.items.iter().all(|i| i.remaining() == 0) {
        return Err(DomainError::conflict("All items have already been issued"));
    }

    let lines: Vec<IssueLine> = match request.mode {
        IssueMode::Full => requisition
            .items
            .iter()
            .filter(|i| i.remaining() > 0)
            .map(|i| IssueLine {
                item_id: i.id,
                quantity: i.remaining(),
            })
            .collect(),
        IssueMode::Partial => {
            let mut lines = Vec::with_capacity(request.quantities.len());
            for line in &request.quantities {
                let Some(item) = requisition.item(line.item_id) else {
                    return Err(DomainError::validation(format!(
                        "Item {} does not belong to this requisition",
                        line.item_id
                    )));
                };
                if line.quantity < 0 {
                    return Err(DomainError::validation(format!(
                        "Issued quantity for '{}' cannot be negative",
                        item.item_name
                    )));
                }
                let already: i64 = lines
                    .iter()
                    .filter(|l: &&IssueLine| l.item_id == item.id)
                    .map(|l| l.quantity)
                    .sum();
                let quantity = line.quantity.min(item.remaining() - already);
                if quantity > 0 {
                    lines.push(IssueLine {
                        item_id: item.id,
                        quantity,
                    });
                }
            }
            lines
        }
    };

    if lines.is_empty() {
        return Err(DomainError::validation("Nothing to issue"));
    }
    Ok(IssuePlan { lines })
}

/// Add the planned amounts to the snapshot.
pub fn apply(requisition: &mut Requisition, plan: &IssuePlan, now: DateTime<Utc>) {
    for line in &plan.lines {
        if let Some(item) = requisition.items.iter_mut().find(|i| i.id == line.item_id) {
            item.quantity_fulfilled += line.quantity;
        }
    }
    requisition.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requisition::NewRequisitionItem;
    use crate::requisition::tests::draft_with;

    fn approved() -> Requisition {
        let mut req = draft_with(vec![
            NewRequisitionItem::new("A", 10, 100),
            NewRequisitionItem::new("B", 5, 20),
        ]);
        req.status = RequisitionStatus::Approved;
        req
    }

    fn line(item_id: RequisitionItemId, quantity: i64) -> IssueLine {
        IssueLine { item_id, quantity }
    }

    #[test]
    fn only_approved_requisitions_can_be_issued() {
        let mut req = approved();
        req.status = RequisitionStatus::PendingApproval;
        assert!(matches!(
            plan(&req, &IssueRequest::full()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn partial_approval_caps_issuance() {
        let mut req = approved();
        req.items[0].quantity_approved = Some(4);
        req.items[1].quantity_approved = Some(5);

        let p = plan(&req, &IssueRequest::full()).unwrap();
        assert_eq!(p.lines, vec![line(req.items[0].id, 4), line(req.items[1].id, 5)]);
        apply(&mut req, &p, Utc::now());
        assert_eq!(req.fulfillment(), FulfillmentStatus::Fulfilled);

        let err = plan(&req, &IssueRequest::full()).unwrap_err();
        assert_eq!(err, DomainError::conflict("All items have already been issued"));
    }

    #[test]
    fn partial_issue_clamps_and_accumulates() {
        let mut req = approved();
        let (a, b) = (req.items[0].id, req.items[1].id);

        let p = plan(&req, &IssueRequest::partial(vec![line(a, 3)])).unwrap();
        apply(&mut req, &p, Utc::now());
        assert_eq!(req.fulfillment(), FulfillmentStatus::PartiallyFulfilled);

        let p = plan(&req, &IssueRequest::partial(vec![line(a, 100), line(b, 5)])).unwrap();
        assert_eq!(p.lines, vec![line(a, 7), line(b, 5)]);
        apply(&mut req, &p, Utc::now());
        assert_eq!(req.items[0].quantity_fulfilled, 10);
        assert_eq!(req.fulfillment(), FulfillmentStatus::Fulfilled);
    }

    #[test]
    fn repeated_lines_for_one_item_share_the_remainder() {
        let req = approved();
        let a = req.items[0].id;
        let p = plan(&req, &IssueRequest::partial(vec![line(a, 6), line(a, 6)])).unwrap();
        assert_eq!(p.lines, vec![line(a, 6), line(a, 4)]);
    }

    #[test]
    fn invalid_partial_requests_are_rejected() {
        let mut req = approved();
        let a = req.items[0].id;
        for request in [
            IssueRequest::partial(vec![line(a, -1)]),
            IssueRequest::partial(vec![line(RequisitionItemId::new(), 1)]),
            IssueRequest::partial(vec![line(a, 0)]),
            IssueRequest::partial(vec![]),
        ] {
            assert!(matches!(
                plan(&req, &request),
                Err(DomainError::Validation(_))
            ));
        }

        // fully issued item clamps to zero
        req.items[0].quantity_fulfilled = 10;
        assert!(matches!(
            plan(&req, &IssueRequest::partial(vec![line(a, 2)])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn fulfillment_starts_unfulfilled() {
        assert_eq!(approved().fulfillment(), FulfillmentStatus::Unfulfilled);
    }
}
