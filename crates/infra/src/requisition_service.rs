//! Requisition orchestration: load → decide (pure domain) → commit → publish.
//!
//! Every mutating operation follows the same pipeline:
//!
//! 1. Load the requisition snapshot (and its workflow/ledger where needed)
//! 2. Check visibility and ownership
//! 3. Run the pure domain decision (`transition`, `apply_update`, `issuance::plan`)
//! 4. Commit header + items + ledger row under the snapshot's `ExpectedState`
//! 5. Publish a `RequisitionEvent` (best-effort, after the commit)

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wareflow_auth::{Actor, Role, ensure_owner};
use wareflow_core::{DomainError, RequisitionId, WorkflowId};
use wareflow_events::{EventBus, EventEnvelope};
use wareflow_requisitions::events::{
    ApprovalRecorded, ItemsIssued, RequisitionCreated, RequisitionDeleted, RequisitionSubmitted,
};
use wareflow_requisitions::state_machine::{self, transition};
use wareflow_requisitions::{
    ApprovalDecision, ApprovalEntry, ApprovalWorkflow, Command, FulfillmentStatus, IssueLine,
    IssueRequest, NewRequisition, QuorumPolicy, Requisition, RequisitionEvent, RequisitionNumber,
    RequisitionStatus, RequisitionUpdate, StepSummary, TransitionContext, access, issuance, ledger,
};

use crate::catalog::{InventoryCatalog, prefill_items};
use crate::config::InfraConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{RequisitionChange, RequisitionFilter, RequisitionStore, StoreError, WorkflowStore};

pub const AGGREGATE_TYPE: &str = "requisitions.requisition";

pub type RequisitionEnvelope = EventEnvelope<RequisitionEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRequisition {
    pub id: RequisitionId,
    pub number: RequisitionNumber,
}

/// Everything shown on a requisition's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionDetail {
    pub requisition: Requisition,
    pub workflow_name: String,
    pub steps: Vec<StepSummary>,
    pub history: Vec<ApprovalEntry>,
    pub fulfillment: FulfillmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub new_status: RequisitionStatus,
    pub new_step: u32,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueOutcome {
    pub issued: Vec<IssueLine>,
    pub fulfillment: FulfillmentStatus,
}

pub struct RequisitionService<S, C, B> {
    store: S,
    catalog: C,
    bus: B,
    quorum_policy: QuorumPolicy,
    number_attempts: u32,
    issuer_role: Option<Role>,
}

impl<S, C, B> RequisitionService<S, C, B>
where
    S: WorkflowStore + RequisitionStore,
    C: InventoryCatalog,
    B: EventBus<RequisitionEnvelope>,
{
    pub fn new(store: S, catalog: C, bus: B, config: &InfraConfig) -> Self {
        Self {
            store,
            catalog,
            bus,
            quorum_policy: config.quorum_policy,
            number_attempts: config.number_attempts.max(1),
            issuer_role: config.issuer_role.clone(),
        }
    }

    /// Create a draft. The number is generated under the store's uniqueness
    /// check and regenerated on collision.
    #[instrument(skip(self, actor, input), fields(actor = %actor, workflow_id = %input.workflow_id), err)]
    pub async fn create_requisition(
        &self,
        actor: &Actor,
        mut input: NewRequisition,
    ) -> ServiceResult<CreatedRequisition> {
        self.active_workflow(input.workflow_id).await?;
        input.items = prefill_items(&self.catalog, input.items).await?;

        let now = Utc::now();
        let mut requisition =
            Requisition::draft(input, actor.id, RequisitionNumber::generate(now, 0), now)?;

        for attempt in 0..self.number_attempts {
            requisition.number = RequisitionNumber::generate(now, attempt);
            match self.store.insert_requisition(requisition.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        requisition_id = %requisition.id,
                        number = %requisition.number,
                        "requisition created"
                    );
                    self.publish(RequisitionEvent::RequisitionCreated(RequisitionCreated {
                        requisition_id: requisition.id,
                        number: requisition.number.clone(),
                        requested_by: requisition.requested_by,
                        workflow_id: requisition.workflow_id,
                        occurred_at: now,
                    }));
                    return Ok(CreatedRequisition {
                        id: requisition.id,
                        number: requisition.number,
                    });
                }
                Err(StoreError::DuplicateNumber(number)) => {
                    tracing::debug!(%number, attempt, "requisition number taken, retrying");
                }
                Err(err) => return Err(self.write_error(err)),
            }
        }

        tracing::warn!(attempts = self.number_attempts, "no free requisition number");
        Err(ServiceError::Conflict(
            "could not allocate a unique requisition number".to_string(),
        ))
    }

    #[instrument(skip(self, actor), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn get_requisition(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> ServiceResult<RequisitionDetail> {
        let (requisition, workflow) = self.load_visible(actor, id).await?;
        let entries = self.store.ledger(id).await?;

        let (workflow_name, steps) = match &workflow {
            Some(w) => (w.name.clone(), ledger::step_summaries(&w.steps, &entries)),
            None => (String::new(), Vec::new()),
        };

        Ok(RequisitionDetail {
            fulfillment: requisition.fulfillment(),
            requisition,
            workflow_name,
            steps,
            history: ledger::history(entries),
        })
    }

    /// Admins see everything; everyone else sees their own requisitions plus
    /// those currently waiting on their role.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub async fn list_requisitions(
        &self,
        actor: &Actor,
        filter: RequisitionFilter,
    ) -> ServiceResult<Vec<Requisition>> {
        let rows = self.store.list_requisitions(&filter).await?;
        if actor.is_admin() {
            return Ok(rows);
        }

        let mut workflows = WorkflowCache::default();
        let mut visible = Vec::with_capacity(rows.len());
        for requisition in rows {
            let pending_role = self.pending_role(&mut workflows, &requisition).await?;
            if access::can_view(actor, &requisition, pending_role.as_ref()) {
                visible.push(requisition);
            }
        }
        Ok(visible)
    }

    /// Edit a draft. Only the requester may, and only while it is a draft;
    /// anything else looks like an unknown id.
    #[instrument(skip(self, actor, update), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn update_requisition(
        &self,
        actor: &Actor,
        id: RequisitionId,
        mut update: RequisitionUpdate,
    ) -> ServiceResult<Requisition> {
        let mut requisition = self.load_owned_draft(actor, id).await?;

        if let Some(workflow_id) = update.workflow_id {
            self.active_workflow(workflow_id).await?;
        }
        if let Some(items) = update.items.take() {
            update.items = Some(prefill_items(&self.catalog, items).await?);
        }

        let expected = requisition.expected_state();
        requisition.apply_update(update, Utc::now())?;
        self.commit(RequisitionChange {
            expected,
            requisition,
            ledger_entry: None,
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn delete_requisition(&self, actor: &Actor, id: RequisitionId) -> ServiceResult<()> {
        let requisition = self.load_owned_draft(actor, id).await?;
        self.store
            .delete_requisition(id, requisition.expected_state())
            .await
            .map_err(|e| self.write_error(e))?;

        tracing::info!("requisition deleted");
        self.publish(RequisitionEvent::RequisitionDeleted(RequisitionDeleted {
            requisition_id: id,
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    /// Draft → Submitted at step 1. Owner only; admins get no bypass here.
    #[instrument(skip(self, actor), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn submit_requisition(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> ServiceResult<ActionOutcome> {
        let (mut requisition, _) = self.load_visible(actor, id).await?;
        ensure_owner(actor, requisition.requested_by)?;

        let now = Utc::now();
        let ctx = TransitionContext {
            actor,
            requisition_id: id,
            round: requisition.round,
            step: None,
            step_count: 0,
            items: &requisition.items,
            ledger: &[],
            policy: self.quorum_policy,
            now,
        };
        let t = transition(requisition.state(), Command::Submit, &ctx)?;
        let expected = requisition.expected_state();
        state_machine::apply(&mut requisition, &t, now);

        let stored = self
            .commit(RequisitionChange {
                expected,
                requisition,
                ledger_entry: None,
            })
            .await?;

        tracing::info!(round = stored.round, "requisition submitted");
        self.publish(RequisitionEvent::RequisitionSubmitted(RequisitionSubmitted {
            requisition_id: id,
            round: stored.round,
            occurred_at: now,
        }));
        Ok(ActionOutcome {
            new_status: stored.status,
            new_step: stored.current_step,
            partial: false,
        })
    }

    /// Record an approver's decision at the current step.
    ///
    /// Always appends exactly one ledger row, atomically with the resulting
    /// state change.
    #[instrument(
        skip(self, actor, decision),
        fields(actor = %actor, requisition_id = %id, action = %decision.action),
        err
    )]
    pub async fn act_on_requisition(
        &self,
        actor: &Actor,
        id: RequisitionId,
        decision: ApprovalDecision,
    ) -> ServiceResult<ActionOutcome> {
        let mut requisition = self
            .store
            .get_requisition(id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let workflow = self
            .store
            .get_workflow(requisition.workflow_id)
            .await?
            .ok_or_else(|| ServiceError::Conflict("workflow no longer exists".to_string()))?;
        let entries = self.store.ledger(id).await?;

        let now = Utc::now();
        let action = decision.action;
        let ctx = TransitionContext {
            actor,
            requisition_id: id,
            round: requisition.round,
            step: workflow.step(requisition.current_step),
            step_count: workflow.step_count(),
            items: &requisition.items,
            ledger: &entries,
            policy: self.quorum_policy,
            now,
        };
        let t = transition(requisition.state(), Command::Act(decision), &ctx)?;
        let from_step = t.from.step();
        let expected = requisition.expected_state();
        state_machine::apply(&mut requisition, &t, now);

        let stored = self
            .commit(RequisitionChange {
                expected,
                requisition,
                ledger_entry: t.ledger_entry.clone(),
            })
            .await?;

        tracing::info!(
            from = ?t.from,
            to = ?t.to,
            partial = t.partial,
            "approval recorded"
        );
        self.publish(RequisitionEvent::ApprovalRecorded(ApprovalRecorded {
            requisition_id: id,
            approver_id: actor.id,
            action,
            step_order: from_step,
            new_status: stored.status,
            new_step: stored.current_step,
            partial: t.partial,
            occurred_at: now,
        }));

        Ok(ActionOutcome {
            new_status: stored.status,
            new_step: stored.current_step,
            partial: t.partial,
        })
    }

    /// Active requisitions routed to the actor's role (any role for admins)
    /// that the actor has not yet voted on in the current round. Oldest
    /// submission first.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub async fn list_pending_for_actor(&self, actor: &Actor) -> ServiceResult<Vec<Requisition>> {
        let mut active = Vec::new();
        for status in [RequisitionStatus::Submitted, RequisitionStatus::PendingApproval] {
            let filter = RequisitionFilter {
                status: Some(status),
                ..Default::default()
            };
            active.extend(self.store.list_requisitions(&filter).await?);
        }

        let mut workflows = WorkflowCache::default();
        let mut pending = Vec::new();
        for requisition in active {
            let pending_role = self.pending_role(&mut workflows, &requisition).await?;
            let entries = self.store.ledger(requisition.id).await?;
            if access::is_pending_for(actor, &requisition, pending_role.as_ref(), &entries) {
                pending.push(requisition);
            }
        }
        pending.sort_by_key(|r| (r.submitted_at, r.created_at));
        Ok(pending)
    }

    /// Release approved stock, fully or partially.
    #[instrument(skip(self, actor, request), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn issue_items(
        &self,
        actor: &Actor,
        id: RequisitionId,
        request: IssueRequest,
    ) -> ServiceResult<IssueOutcome> {
        let mut requisition = match self.load_visible(actor, id).await {
            Ok((requisition, _)) => requisition,
            // the issuer role handles stock for everyone without seeing the queue
            Err(ServiceError::NotFound) if self.issuer_role.as_ref() == Some(&actor.role) => self
                .store
                .get_requisition(id)
                .await?
                .ok_or(ServiceError::NotFound)?,
            Err(err) => return Err(err),
        };
        if !access::can_issue(actor, &requisition, self.issuer_role.as_ref()) {
            return Err(ServiceError::Permission(
                "only the requester, an admin or the issuer role may issue items".to_string(),
            ));
        }

        let plan = issuance::plan(&requisition, &request)?;
        let expected = requisition.expected_state();
        let now = Utc::now();
        issuance::apply(&mut requisition, &plan, now);

        let stored = self
            .commit(RequisitionChange {
                expected,
                requisition,
                ledger_entry: None,
            })
            .await?;
        let fulfillment = stored.fulfillment();

        tracing::info!(lines = plan.lines.len(), ?fulfillment, "items issued");
        self.publish(RequisitionEvent::ItemsIssued(ItemsIssued {
            requisition_id: id,
            issued_by: actor.id,
            lines: plan.lines.clone(),
            fulfillment,
            occurred_at: now,
        }));

        Ok(IssueOutcome {
            issued: plan.lines,
            fulfillment,
        })
    }

    /// Ledger rows by time, then insertion.
    #[instrument(skip(self, actor), fields(actor = %actor, requisition_id = %id), err)]
    pub async fn history(&self, actor: &Actor, id: RequisitionId) -> ServiceResult<Vec<ApprovalEntry>> {
        self.load_visible(actor, id).await?;
        Ok(ledger::history(self.store.ledger(id).await?))
    }

    async fn active_workflow(&self, id: WorkflowId) -> ServiceResult<ApprovalWorkflow> {
        match self.store.get_workflow(id).await? {
            Some(workflow) if workflow.is_active => Ok(workflow),
            _ => Err(DomainError::validation("Workflow not found or inactive").into()),
        }
    }

    /// Load a requisition the actor may see, with its workflow.
    async fn load_visible(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> ServiceResult<(Requisition, Option<ApprovalWorkflow>)> {
        let requisition = self
            .store
            .get_requisition(id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let workflow = self.store.get_workflow(requisition.workflow_id).await?;
        let pending_role = workflow
            .as_ref()
            .and_then(|w| w.step(requisition.current_step))
            .map(|s| &s.approver_role);

        if !access::can_view(actor, &requisition, pending_role) {
            return Err(ServiceError::NotFound);
        }
        Ok((requisition, workflow))
    }

    async fn load_owned_draft(&self, actor: &Actor, id: RequisitionId) -> ServiceResult<Requisition> {
        let requisition = self
            .store
            .get_requisition(id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if requisition.requested_by != actor.id || requisition.status != RequisitionStatus::Draft {
            return Err(ServiceError::NotFound);
        }
        Ok(requisition)
    }

    async fn pending_role(
        &self,
        cache: &mut WorkflowCache,
        requisition: &Requisition,
    ) -> ServiceResult<Option<Role>> {
        if !requisition.status.is_active() {
            return Ok(None);
        }
        if !cache.contains_key(&requisition.workflow_id) {
            let workflow = self.store.get_workflow(requisition.workflow_id).await?;
            cache.insert(requisition.workflow_id, workflow);
        }
        Ok(cache
            .get(&requisition.workflow_id)
            .and_then(Option::as_ref)
            .and_then(|w| w.step(requisition.current_step))
            .map(|s| s.approver_role.clone()))
    }

    async fn commit(&self, change: RequisitionChange) -> ServiceResult<Requisition> {
        self.store
            .commit(change)
            .await
            .map_err(|e| self.write_error(e))
    }

    fn write_error(&self, err: StoreError) -> ServiceError {
        if let StoreError::Conflict(reason) = &err {
            tracing::warn!(%reason, "write rejected");
        }
        err.into()
    }

    fn publish(&self, event: RequisitionEvent) {
        let event_type = wareflow_events::Event::event_type(&event);
        let envelope = EventEnvelope::wrap(*event.requisition_id().as_uuid(), AGGREGATE_TYPE, event);
        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(event_type, error = ?err, "event publication failed after commit");
        }
    }
}

type WorkflowCache = HashMap<WorkflowId, Option<ApprovalWorkflow>>;

