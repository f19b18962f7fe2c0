use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use wareflow_core::{RequisitionId, WorkflowId};
use wareflow_requisitions::{ApprovalEntry, ApprovalWorkflow, ExpectedState, Requisition, STALE_STATE};

use super::r#trait::{
    RequisitionChange, RequisitionFilter, RequisitionStore, StoreError, StoreResult, WorkflowStore,
};

#[derive(Debug, Default)]
struct State {
    workflows: HashMap<WorkflowId, ApprovalWorkflow>,
    requisitions: HashMap<RequisitionId, Requisition>,
    ledger: HashMap<RequisitionId, Vec<ApprovalEntry>>,
}

/// In-memory workflow + requisition store.
///
/// Intended for tests/dev. Every write runs inside one write-lock critical
/// section, which is what makes commits atomic and the reference check on
/// workflow delete race-free.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn check_expected(stored: &Requisition, expected: &ExpectedState) -> StoreResult<()> {
    if expected.matches(stored) {
        Ok(())
    } else {
        Err(StoreError::Conflict(STALE_STATE.to_string()))
    }
}

#[async_trait::async_trait]
impl WorkflowStore for InMemoryStore {
    async fn insert_workflow(&self, workflow: ApprovalWorkflow) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.workflows.contains_key(&workflow.id) {
            return Err(StoreError::Conflict(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        state.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state
            .workflows
            .get_mut(&workflow.id)
            .ok_or(StoreError::NotFound)?;
        stored.name = workflow.name.clone();
        stored.description = workflow.description.clone();
        stored.is_active = workflow.is_active;
        stored.updated_at = workflow.updated_at;
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.workflows.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let references = state
            .requisitions
            .values()
            .filter(|r| r.workflow_id == id)
            .count();
        if references > 0 {
            return Err(StoreError::Conflict(format!(
                "workflow is used by {references} requisition(s)"
            )));
        }
        state.workflows.remove(&id);
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<Option<ApprovalWorkflow>> {
        Ok(self.read()?.workflows.get(&id).cloned())
    }

    async fn list_workflows(&self) -> StoreResult<Vec<ApprovalWorkflow>> {
        let mut workflows: Vec<ApprovalWorkflow> = self.read()?.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(workflows)
    }
}

#[async_trait::async_trait]
impl RequisitionStore for InMemoryStore {
    async fn insert_requisition(&self, requisition: Requisition) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .requisitions
            .values()
            .any(|r| r.number == requisition.number)
        {
            return Err(StoreError::DuplicateNumber(requisition.number.to_string()));
        }
        if !state.workflows.contains_key(&requisition.workflow_id) {
            return Err(StoreError::Conflict(format!(
                "workflow {} no longer exists",
                requisition.workflow_id
            )));
        }
        state.ledger.insert(requisition.id, Vec::new());
        state.requisitions.insert(requisition.id, requisition);
        Ok(())
    }

    async fn get_requisition(&self, id: RequisitionId) -> StoreResult<Option<Requisition>> {
        Ok(self.read()?.requisitions.get(&id).cloned())
    }

    async fn list_requisitions(&self, filter: &RequisitionFilter) -> StoreResult<Vec<Requisition>> {
        let mut rows: Vec<Requisition> = self
            .read()?
            .requisitions
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn commit(&self, change: RequisitionChange) -> StoreResult<Requisition> {
        let RequisitionChange {
            expected,
            mut requisition,
            ledger_entry,
        } = change;

        let mut state = self.write()?;
        let stored = state
            .requisitions
            .get(&requisition.id)
            .ok_or(StoreError::NotFound)?;
        check_expected(stored, &expected)?;

        if stored.workflow_id != requisition.workflow_id
            && !state.workflows.contains_key(&requisition.workflow_id)
        {
            return Err(StoreError::Conflict(format!(
                "workflow {} no longer exists",
                requisition.workflow_id
            )));
        }

        requisition.revision = expected.revision + 1;
        if let Some(entry) = ledger_entry {
            state.ledger.entry(requisition.id).or_default().push(entry);
        }
        state.requisitions.insert(requisition.id, requisition.clone());
        Ok(requisition)
    }

    async fn delete_requisition(&self, id: RequisitionId, expected: ExpectedState) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.requisitions.get(&id).ok_or(StoreError::NotFound)?;
        check_expected(stored, &expected)?;
        state.requisitions.remove(&id);
        state.ledger.remove(&id);
        Ok(())
    }

    async fn ledger(&self, id: RequisitionId) -> StoreResult<Vec<ApprovalEntry>> {
        Ok(self.read()?.ledger.get(&id).cloned().unwrap_or_default())
    }
}
