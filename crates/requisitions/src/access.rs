//! Who may see and touch a requisition.
//!
//! Requisitions an actor cannot see are reported as not found, so these
//! predicates double as existence checks at the service boundary.

use wareflow_auth::{Actor, Role};

use crate::ledger::{self, ApprovalEntry};
use crate::requisition::Requisition;

/// Admins see everything, owners see their own, and approvers see what is
/// currently waiting on their role.
///
/// `pending_role` is the approver role of the requisition's current step.
pub fn can_view(actor: &Actor, requisition: &Requisition, pending_role: Option<&Role>) -> bool {
    actor.is_admin()
        || actor.id == requisition.requested_by
        || (requisition.status.is_active() && pending_role == Some(&actor.role))
}

/// Owner, admin, or the configured issuer role.
pub fn can_issue(actor: &Actor, requisition: &Requisition, issuer_role: Option<&Role>) -> bool {
    actor.is_admin()
        || actor.id == requisition.requested_by
        || issuer_role.is_some_and(|role| role == &actor.role)
}

/// Waiting on `actor`: active, routed to their role (any role for admins), and
/// not yet voted on by them in the current round.
pub fn is_pending_for(
    actor: &Actor,
    requisition: &Requisition,
    pending_role: Option<&Role>,
    ledger: &[ApprovalEntry],
) -> bool {
    if !requisition.status.is_active() {
        return false;
    }
    let routed = actor.is_admin() || pending_role == Some(&actor.role);
    routed
        && !ledger::has_voted(
            ledger,
            requisition.round,
            requisition.current_step,
            actor.id,
        )
}
