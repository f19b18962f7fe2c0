//! Requisition lifecycle as an explicit, pure transition function.
//!
//! ```text
//! Draft --submit--> Submitted{1}
//! Submitted{n} | PendingApproval{n}
//!     --approve (quorum met, n < last)--> PendingApproval{n+1}
//!     --approve (quorum met, n = last)--> Approved{n}
//!     --approve (quorum not met)-------> PendingApproval{n}
//!     --reject-------------------------> Rejected{n}
//!     --return-------------------------> Draft (step 1)
//! ```
//!
//! Nothing here touches storage. The caller loads a snapshot, calls
//! [`transition`], applies the result with [`apply`] and commits it together
//! with the ledger row under an [`ExpectedState`] guard.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_auth::{Actor, authorize_role};
use wareflow_core::{ApprovalId, DomainError, DomainResult, RequisitionId};

use crate::ledger::{self, ApprovalAction, ApprovalEntry, ApprovedQuantity};
use crate::reconcile;
use crate::requisition::{Requisition, RequisitionItem, RequisitionStatus};
use crate::workflow::WorkflowStep;

/// Conflict message used whenever a snapshot no longer matches storage.
pub const STALE_STATE: &str = "state changed, retry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequisitionState {
    Draft,
    Submitted { step: u32 },
    PendingApproval { step: u32 },
    Approved { step: u32 },
    Rejected { step: u32 },
}

impl RequisitionState {
    pub fn from_parts(status: RequisitionStatus, current_step: u32) -> Self {
        let step = current_step;
        match status {
            RequisitionStatus::Draft => RequisitionState::Draft,
            RequisitionStatus::Submitted => RequisitionState::Submitted { step },
            RequisitionStatus::PendingApproval => RequisitionState::PendingApproval { step },
            RequisitionStatus::Approved => RequisitionState::Approved { step },
            RequisitionStatus::Rejected => RequisitionState::Rejected { step },
        }
    }

    pub fn status(self) -> RequisitionStatus {
        match self {
            RequisitionState::Draft => RequisitionStatus::Draft,
            RequisitionState::Submitted { .. } => RequisitionStatus::Submitted,
            RequisitionState::PendingApproval { .. } => RequisitionStatus::PendingApproval,
            RequisitionState::Approved { .. } => RequisitionStatus::Approved,
            RequisitionState::Rejected { .. } => RequisitionStatus::Rejected,
        }
    }

    /// Persisted current_step. Drafts always sit at step 1.
    pub fn step(self) -> u32 {
        match self {
            RequisitionState::Draft => 1,
            RequisitionState::Submitted { step }
            | RequisitionState::PendingApproval { step }
            | RequisitionState::Approved { step }
            | RequisitionState::Rejected { step } => step,
        }
    }

    /// Step awaiting an approver, if any.
    pub fn active_step(self) -> Option<u32> {
        match self {
            RequisitionState::Submitted { step } | RequisitionState::PendingApproval { step } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Compare-and-set guard for a commit.
///
/// `revision` is bumped by every commit, so two writers holding the same
/// snapshot cannot both succeed even when neither changes (status, step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedState {
    pub status: RequisitionStatus,
    pub current_step: u32,
    pub revision: u64,
}

impl ExpectedState {
    pub fn matches(&self, requisition: &Requisition) -> bool {
        requisition.status == self.status
            && requisition.current_step == self.current_step
            && requisition.revision == self.revision
    }
}

/// How many approvals clear a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// `required_approvers` distinct approvals per step.
    #[default]
    RequireQuorum,
    /// The first approval clears the step regardless of `required_approvers`.
    FirstApproval,
}

impl QuorumPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            QuorumPolicy::RequireQuorum => "quorum",
            QuorumPolicy::FirstApproval => "first_approval",
        }
    }

    pub fn required(self, step: &WorkflowStep) -> u32 {
        match self {
            QuorumPolicy::RequireQuorum => step.required_approvers.max(1),
            QuorumPolicy::FirstApproval => 1,
        }
    }
}

impl FromStr for QuorumPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quorum" | "require_quorum" => Ok(QuorumPolicy::RequireQuorum),
            "first_approval" | "first" => Ok(QuorumPolicy::FirstApproval),
            other => Err(DomainError::validation(format!(
                "unknown quorum policy '{other}'"
            ))),
        }
    }
}

/// Approver input for `act`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub action: ApprovalAction,
    pub comments: Option<String>,
    /// Only meaningful for `approved`.
    #[serde(default)]
    pub quantities: Vec<ApprovedQuantity>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            action: ApprovalAction::Approved,
            comments: None,
            quantities: Vec::new(),
        }
    }

    pub fn reject(comments: impl Into<String>) -> Self {
        Self {
            action: ApprovalAction::Rejected,
            comments: Some(comments.into()),
            quantities: Vec::new(),
        }
    }

    pub fn return_to_draft(comments: Option<String>) -> Self {
        Self {
            action: ApprovalAction::Returned,
            comments,
            quantities: Vec::new(),
        }
    }

    pub fn with_quantities(mut self, quantities: Vec<ApprovedQuantity>) -> Self {
        self.quantities = quantities;
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit,
    Act(ApprovalDecision),
}

/// Everything `transition` needs that is not part of the state itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub actor: &'a Actor,
    pub requisition_id: RequisitionId,
    /// Round of the current submission (0 before the first submit).
    pub round: u32,
    /// Workflow step matching the current step, resolved by the caller.
    pub step: Option<&'a WorkflowStep>,
    pub step_count: u32,
    pub items: &'a [RequisitionItem],
    pub ledger: &'a [ApprovalEntry],
    pub policy: QuorumPolicy,
    pub now: DateTime<Utc>,
}

/// Header side effects of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RecordSubmitted { at: DateTime<Utc>, round: u32 },
    RecordApproved { at: DateTime<Utc> },
    RecordRejected { at: DateTime<Utc> },
    SetApprovedQuantities(Vec<ApprovedQuantity>),
    ResetApprovedQuantities,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: RequisitionState,
    pub to: RequisitionState,
    pub ledger_entry: Option<ApprovalEntry>,
    pub effects: Vec<Effect>,
    pub partial: bool,
}

pub fn transition(
    state: RequisitionState,
    command: Command,
    ctx: &TransitionContext<'_>,
) -> DomainResult<Transition> {
    match command {
        Command::Submit => submit(state, ctx),
        Command::Act(decision) => act(state, decision, ctx),
    }
}

fn submit(state: RequisitionState, ctx: &TransitionContext<'_>) -> DomainResult<Transition> {
    if state != RequisitionState::Draft {
        return Err(DomainError::conflict(
            "Only draft requisitions can be submitted",
        ));
    }

    Ok(Transition {
        from: state,
        to: RequisitionState::Submitted { step: 1 },
        ledger_entry: None,
        effects: vec![Effect::RecordSubmitted {
            at: ctx.now,
            round: ctx.round + 1,
        }],
        partial: false,
    })
}

fn act(
    state: RequisitionState,
    decision: ApprovalDecision,
    ctx: &TransitionContext<'_>,
) -> DomainResult<Transition> {
    let Some(current) = state.active_step() else {
        return Err(DomainError::conflict(format!(
            "Requisition is {} and not awaiting approval",
            state.status()
        )));
    };
    let step = match ctx.step {
        Some(step) if step.step_order == current => step,
        _ => return Err(DomainError::conflict(STALE_STATE)),
    };

    authorize_role(ctx.actor, &step.approver_role)?;

    if ledger::has_voted(ctx.ledger, ctx.round, current, ctx.actor.id) {
        return Err(DomainError::conflict("already acted at this step"));
    }

    let comments = decision
        .comments
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut effects = Vec::new();
    let mut partial = false;
    let mut snapshot = Vec::new();

    let to = match decision.action {
        ApprovalAction::Approved => {
            if !decision.quantities.is_empty() {
                let reconciled = reconcile::approved_quantities(ctx.items, &decision.quantities)?;
                partial = reconciled.partial;
                snapshot = reconciled.quantities.clone();
                effects.push(Effect::SetApprovedQuantities(reconciled.quantities));
            }

            let approvals = ledger::approvals_at(ctx.ledger, ctx.round, current) + 1;
            if approvals < ctx.policy.required(step) {
                RequisitionState::PendingApproval { step: current }
            } else if current >= ctx.step_count {
                effects.push(Effect::RecordApproved { at: ctx.now });
                RequisitionState::Approved { step: current }
            } else {
                RequisitionState::PendingApproval { step: current + 1 }
            }
        }
        ApprovalAction::Rejected => {
            if comments.is_none() {
                return Err(DomainError::validation(
                    "Comments are required when rejecting",
                ));
            }
            effects.push(Effect::RecordRejected { at: ctx.now });
            RequisitionState::Rejected { step: current }
        }
        ApprovalAction::Returned => {
            effects.push(Effect::ResetApprovedQuantities);
            RequisitionState::Draft
        }
    };

    let entry = ApprovalEntry {
        id: ApprovalId::new(),
        requisition_id: ctx.requisition_id,
        workflow_step_id: step.id,
        step_order: current,
        round: ctx.round,
        approver_id: ctx.actor.id,
        approver_role: ctx.actor.role.clone(),
        action: decision.action,
        comments,
        partial,
        approved_quantities: snapshot,
        created_at: ctx.now,
    };

    Ok(Transition {
        from: state,
        to,
        ledger_entry: Some(entry),
        effects,
        partial,
    })
}

/// Apply a transition to the in-memory snapshot before committing it.
pub fn apply(requisition: &mut Requisition, transition: &Transition, now: DateTime<Utc>) {
    requisition.status = transition.to.status();
    requisition.current_step = transition.to.step();
    requisition.updated_at = now;

    for effect in &transition.effects {
        match effect {
            Effect::RecordSubmitted { at, round } => {
                requisition.submitted_at = Some(*at);
                requisition.round = *round;
            }
            Effect::RecordApproved { at } => requisition.approved_at = Some(*at),
            Effect::RecordRejected { at } => requisition.rejected_at = Some(*at),
            Effect::SetApprovedQuantities(quantities) => {
                for q in quantities {
                    if let Some(item) = requisition.items.iter_mut().find(|i| i.id == q.item_id) {
                        item.quantity_approved = Some(q.quantity);
                    }
                }
            }
            Effect::ResetApprovedQuantities => {
                for item in &mut requisition.items {
                    item.quantity_approved = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wareflow_auth::Role;
    use wareflow_core::{UserId, WorkflowId, WorkflowStepId};

    use crate::requisition::NewRequisitionItem;
    use crate::requisition::tests::draft_with;

    fn steps(roles: &[(&'static str, u32)]) -> Vec<WorkflowStep> {
        let workflow_id = WorkflowId::new();
        roles
            .iter()
            .enumerate()
            .map(|(idx, (role, quorum))| WorkflowStep {
                id: WorkflowStepId::new(),
                workflow_id,
                step_order: idx as u32 + 1,
                approver_role: Role::new(*role),
                required_approvers: *quorum,
                is_parallel: false,
            })
            .collect()
    }

    /// Run one command against `req`, appending any ledger row to `ledger`.
    fn run(
        req: &mut Requisition,
        ledger: &mut Vec<ApprovalEntry>,
        steps: &[WorkflowStep],
        actor: &Actor,
        command: Command,
        policy: QuorumPolicy,
    ) -> DomainResult<Transition> {
        let now = Utc::now();
        let ctx = TransitionContext {
            actor,
            requisition_id: req.id,
            round: req.round,
            step: steps.iter().find(|s| s.step_order == req.current_step),
            step_count: steps.len() as u32,
            items: &req.items,
            ledger: ledger.as_slice(),
            policy,
            now,
        };
        let t = transition(req.state(), command, &ctx)?;
        apply(req, &t, now);
        if let Some(entry) = &t.ledger_entry {
            ledger.push(entry.clone());
        }
        Ok(t)
    }

    fn submitted(steps: &[WorkflowStep]) -> (Requisition, Vec<ApprovalEntry>, Actor) {
        let mut req = draft_with(vec![
            NewRequisitionItem::new("A", 10, 100),
            NewRequisitionItem::new("B", 5, 20),
        ]);
        let owner = Actor::new(req.requested_by, Role::USER);
        let mut ledger = Vec::new();
        run(&mut req, &mut ledger, steps, &owner, Command::Submit, QuorumPolicy::default()).unwrap();
        (req, ledger, owner)
    }

    fn manager() -> Actor {
        Actor::new(UserId::new(), Role::MANAGER)
    }

    fn admin() -> Actor {
        Actor::new(UserId::new(), Role::ADMIN)
    }

    #[test]
    fn submit_moves_draft_to_step_one() {
        let steps = steps(&[("manager", 1)]);
        let (req, ledger, _) = submitted(&steps);
        assert_eq!(req.state(), RequisitionState::Submitted { step: 1 });
        assert_eq!(req.round, 1);
        assert!(req.submitted_at.is_some());
        assert!(ledger.is_empty());
    }

    #[test]
    fn submit_is_not_idempotent() {
        let steps = steps(&[("manager", 1)]);
        let (mut req, mut ledger, owner) = submitted(&steps);
        let err = run(&mut req, &mut ledger, &steps, &owner, Command::Submit, QuorumPolicy::default())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::conflict("Only draft requisitions can be submitted")
        );
    }

    #[test]
    fn standard_two_step_approval() {
        let steps = steps(&[("manager", 1), ("admin", 1)]);
        let (mut req, mut ledger, _) = submitted(&steps);
        let policy = QuorumPolicy::default();

        let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::approve()), policy).unwrap();
        assert_eq!(t.to, RequisitionState::PendingApproval { step: 2 });

        let t = run(&mut req, &mut ledger, &steps, &admin(), Command::Act(ApprovalDecision::approve()), policy).unwrap();
        assert_eq!(t.to, RequisitionState::Approved { step: 2 });
        assert_eq!(req.current_step, 2);
        assert!(req.approved_at.is_some());
        assert_eq!(ledger.len(), 2);
        assert!(ledger.iter().all(|e| e.action == ApprovalAction::Approved));

        // approved is terminal
        for decision in [
            ApprovalDecision::approve(),
            ApprovalDecision::reject("too late"),
            ApprovalDecision::return_to_draft(None),
        ] {
            let err = run(&mut req, &mut ledger, &steps, &admin(), Command::Act(decision), policy)
                .unwrap_err();
            assert!(matches!(err, DomainError::Conflict(_)));
        }
        assert_eq!(req.status, RequisitionStatus::Approved);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn acting_on_a_draft_is_a_conflict() {
        let steps = steps(&[("manager", 1)]);
        let mut req = draft_with(vec![NewRequisitionItem::new("A", 1, 100)]);
        let mut ledger = Vec::new();

        let err = run(&mut req, &mut ledger, &steps, &admin(), Command::Act(ApprovalDecision::approve()), QuorumPolicy::default())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::conflict("Requisition is draft and not awaiting approval")
        );
        assert_eq!(req.status, RequisitionStatus::Draft);
        assert!(ledger.is_empty());
    }

    #[test]
    fn wrong_role_is_a_permission_error() {
        let steps = steps(&[("manager", 1)]);
        let (mut req, mut ledger, owner) = submitted(&steps);
        let err = run(&mut req, &mut ledger, &steps, &owner, Command::Act(ApprovalDecision::approve()), QuorumPolicy::default())
            .unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));
        assert_eq!(req.status, RequisitionStatus::Submitted);
    }

    #[test]
    fn reject_requires_comments_and_is_terminal() {
        let steps = steps(&[("manager", 1), ("admin", 1)]);
        let (mut req, mut ledger, _) = submitted(&steps);
        let policy = QuorumPolicy::default();

        let err = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::reject("  ")), policy)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::reject("over budget")), policy).unwrap();
        assert_eq!(t.to, RequisitionState::Rejected { step: 1 });
        assert!(req.rejected_at.is_some());
        assert_eq!(ledger[0].comments.as_deref(), Some("over budget"));

        let err = run(&mut req, &mut ledger, &steps, &admin(), Command::Act(ApprovalDecision::approve()), policy)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn return_goes_back_to_draft_and_resubmit_restarts() {
        let steps = steps(&[("manager", 1), ("admin", 1)]);
        let (mut req, mut ledger, owner) = submitted(&steps);
        let policy = QuorumPolicy::default();
        let first = req.items[0].id;

        let approve = ApprovalDecision::approve().with_quantities(vec![ApprovedQuantity::new(first, 4)]);
        run(&mut req, &mut ledger, &steps, &manager(), Command::Act(approve), policy).unwrap();
        assert_eq!(req.items[0].quantity_approved, Some(4));

        let t = run(&mut req, &mut ledger, &steps, &admin(), Command::Act(ApprovalDecision::return_to_draft(Some("split it".into()))), policy).unwrap();
        assert_eq!(t.to, RequisitionState::Draft);
        assert_eq!(req.current_step, 1);
        assert!(req.items.iter().all(|i| i.quantity_approved.is_none()));

        run(&mut req, &mut ledger, &steps, &owner, Command::Submit, policy).unwrap();
        assert_eq!(req.state(), RequisitionState::Submitted { step: 1 });
        assert_eq!(req.round, 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn same_approver_cannot_vote_twice_in_a_round() {
        let steps = steps(&[("manager", 2)]);
        let (mut req, mut ledger, _) = submitted(&steps);
        let policy = QuorumPolicy::RequireQuorum;
        let m1 = manager();

        let t = run(&mut req, &mut ledger, &steps, &m1, Command::Act(ApprovalDecision::approve()), policy).unwrap();
        assert_eq!(t.to, RequisitionState::PendingApproval { step: 1 });

        let err = run(&mut req, &mut ledger, &steps, &m1, Command::Act(ApprovalDecision::approve()), policy)
            .unwrap_err();
        assert_eq!(err, DomainError::conflict("already acted at this step"));

        let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::approve()), policy).unwrap();
        assert_eq!(t.to, RequisitionState::Approved { step: 1 });
    }

    #[test]
    fn first_approval_policy_ignores_quorum() {
        let steps = steps(&[("manager", 3)]);
        let (mut req, mut ledger, _) = submitted(&steps);
        let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::approve()), QuorumPolicy::FirstApproval).unwrap();
        assert_eq!(t.to, RequisitionState::Approved { step: 1 });
    }

    #[test]
    fn previous_round_votes_do_not_block() {
        let steps = steps(&[("manager", 1)]);
        let (mut req, mut ledger, owner) = submitted(&steps);
        let policy = QuorumPolicy::default();
        let m = manager();

        run(&mut req, &mut ledger, &steps, &m, Command::Act(ApprovalDecision::return_to_draft(None)), policy).unwrap();
        run(&mut req, &mut ledger, &steps, &owner, Command::Submit, policy).unwrap();
        let t = run(&mut req, &mut ledger, &steps, &m, Command::Act(ApprovalDecision::approve()), policy).unwrap();
        assert_eq!(t.to, RequisitionState::Approved { step: 1 });
    }

    #[test]
    fn partial_flag_follows_quantities() {
        let steps = steps(&[("manager", 1)]);
        let (mut req, mut ledger, _) = submitted(&steps);
        let (a, b) = (req.items[0].id, req.items[1].id);
        let decision = ApprovalDecision::approve().with_quantities(vec![
            ApprovedQuantity::new(a, 4),
            ApprovedQuantity::new(b, 5),
        ]);
        let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(decision), QuorumPolicy::default()).unwrap();
        assert!(t.partial);
        assert!(ledger[0].partial);
        assert_eq!(ledger[0].approved_quantities.len(), 2);
        assert_eq!(req.items[0].issuable_cap(), 4);
        assert_eq!(req.items[1].issuable_cap(), 5);
    }

    #[test]
    fn stale_step_is_a_conflict() {
        let steps = steps(&[("manager", 1), ("admin", 1)]);
        let (req, _, _) = submitted(&steps);
        let m = manager();
        let ctx = TransitionContext {
            actor: &m,
            requisition_id: req.id,
            round: req.round,
            step: Some(&steps[1]),
            step_count: 2,
            items: &req.items,
            ledger: &[],
            policy: QuorumPolicy::default(),
            now: Utc::now(),
        };
        let err = transition(req.state(), Command::Act(ApprovalDecision::approve()), &ctx).unwrap_err();
        assert_eq!(err, DomainError::conflict(STALE_STATE));
    }

    #[test]
    fn quorum_policy_parses_config_values() {
        assert_eq!("quorum".parse::<QuorumPolicy>().unwrap(), QuorumPolicy::RequireQuorum);
        assert_eq!(
            "First_Approval".parse::<QuorumPolicy>().unwrap(),
            QuorumPolicy::FirstApproval
        );
        assert!("majority".parse::<QuorumPolicy>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: with single-approver steps, each approval advances the
        /// step by exactly one until the last, which approves in place.
        #[test]
        fn approvals_walk_every_step(step_count in 1usize..6) {
            let roles: Vec<(&'static str, u32)> = (0..step_count).map(|_| ("manager", 1)).collect();
            let steps = steps(&roles);
            let (mut req, mut ledger, _) = submitted(&steps);

            for n in 1..=step_count as u32 {
                prop_assert_eq!(req.current_step, n);
                let t = run(&mut req, &mut ledger, &steps, &manager(), Command::Act(ApprovalDecision::approve()), QuorumPolicy::default()).unwrap();
                if n == step_count as u32 {
                    prop_assert_eq!(t.to, RequisitionState::Approved { step: n });
                } else {
                    prop_assert_eq!(t.to, RequisitionState::PendingApproval { step: n + 1 });
                }
            }
            prop_assert_eq!(req.status, RequisitionStatus::Approved);
            prop_assert_eq!(req.current_step, step_count as u32);
            prop_assert_eq!(ledger.len(), step_count);
        }
    }
}
