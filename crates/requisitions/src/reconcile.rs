//! Reconciles approver-supplied quantities against the requested ones.

use wareflow_core::{DomainError, DomainResult};

use crate::ledger::ApprovedQuantity;
use crate::requisition::RequisitionItem;

/// Result of reconciling an approval's quantities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Final cap for every item, in item order.
    pub quantities: Vec<ApprovedQuantity>,
    /// At least one item ends below its requested quantity.
    pub partial: bool,
}

/// Merge `overrides` into the items' current caps.
///
/// Items without an override keep their current cap. An override may lower a
/// cap set by an earlier step but never raise it, so a later approver cannot
/// undo an earlier cut.
pub fn approved_quantities(
    items: &[RequisitionItem],
    overrides: &[ApprovedQuantity],
) -> DomainResult<Reconciled> {
    for (idx, o) in overrides.iter().enumerate() {
        if overrides[..idx].iter().any(|prev| prev.item_id == o.item_id) {
            return Err(DomainError::validation(format!(
                "Item {} appears more than once",
                o.item_id
            )));
        }
        let Some(item) = items.iter().find(|i| i.id == o.item_id) else {
            return Err(DomainError::validation(format!(
                "Item {} does not belong to this requisition",
                o.item_id
            )));
        };
        if o.quantity < 0 {
            return Err(DomainError::validation(format!(
                "Approved quantity for '{}' cannot be negative",
                item.item_name
            )));
        }
        if o.quantity > item.quantity_requested {
            return Err(DomainError::validation(format!(
                "Approved quantity for '{}' exceeds the requested {}",
                item.item_name, item.quantity_requested
            )));
        }
        if o.quantity > item.issuable_cap() {
            return Err(DomainError::validation(format!(
                "Approved quantity for '{}' exceeds the {} approved at an earlier step",
                item.item_name,
                item.issuable_cap()
            )));
        }
    }

    let quantities: Vec<ApprovedQuantity> = items
        .iter()
        .map(|item| {
            let quantity = overrides
                .iter()
                .find(|o| o.item_id == item.id)
                .map(|o| o.quantity)
                .unwrap_or_else(|| item.issuable_cap());
            ApprovedQuantity::new(item.id, quantity)
        })
        .collect();

    if quantities.iter().all(|q| q.quantity == 0) {
        return Err(DomainError::validation(
            "At least one item must be approved with a quantity above zero",
        ));
    }

    let partial = items
        .iter()
        .zip(&quantities)
        .any(|(item, q)| q.quantity < item.quantity_requested);

    Ok(Reconciled { quantities, partial })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requisition::NewRequisitionItem;
    use crate::requisition::tests::draft_with;
    use wareflow_core::RequisitionItemId;

    fn two_items() -> Vec<RequisitionItem> {
        draft_with(vec![
            NewRequisitionItem::new("A", 10, 100),
            NewRequisitionItem::new("B", 5, 20),
        ])
        .items
    }

    #[test]
    fn untouched_items_keep_their_request() {
        let items = two_items();
        let r = approved_quantities(&items, &[ApprovedQuantity::new(items[0].id, 4)]).unwrap();
        assert!(r.partial);
        assert_eq!(r.quantities[0].quantity, 4);
        assert_eq!(r.quantities[1].quantity, 5);
    }

    #[test]
    fn full_quantities_are_not_partial() {
        let items = two_items();
        let r = approved_quantities(&items, &[]).unwrap();
        assert!(!r.partial);
    }

    #[test]
    fn later_override_can_only_lower_an_earlier_cap() {
        let mut items = two_items();
        items[0].quantity_approved = Some(4);
        let err = approved_quantities(&items, &[ApprovedQuantity::new(items[0].id, 7)]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let r = approved_quantities(&items, &[ApprovedQuantity::new(items[0].id, 2)]).unwrap();
        assert_eq!(r.quantities[0].quantity, 2);

        // no override: the earlier cap stands
        let r = approved_quantities(&items, &[]).unwrap();
        assert_eq!(r.quantities[0].quantity, 4);
        assert!(r.partial);
    }

    #[test]
    fn rejects_bad_overrides() {
        let items = two_items();
        let cases = [
            vec![ApprovedQuantity::new(items[0].id, -1)],
            vec![ApprovedQuantity::new(items[0].id, 11)],
            vec![ApprovedQuantity::new(RequisitionItemId::new(), 1)],
            vec![
                ApprovedQuantity::new(items[0].id, 1),
                ApprovedQuantity::new(items[0].id, 2),
            ],
            vec![
                ApprovedQuantity::new(items[0].id, 0),
                ApprovedQuantity::new(items[1].id, 0),
            ],
        ];
        for overrides in cases {
            assert!(matches!(
                approved_quantities(&items, &overrides),
                Err(DomainError::Validation(_))
            ));
        }
    }
}
