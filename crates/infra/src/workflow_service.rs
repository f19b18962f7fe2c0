//! Workflow definition store operations.

use chrono::Utc;
use tracing::instrument;

use wareflow_core::WorkflowId;
use wareflow_requisitions::{ApprovalWorkflow, NewWorkflow, WorkflowSummary, WorkflowUpdate};

use crate::error::{ServiceError, ServiceResult};
use crate::store::WorkflowStore;

pub struct WorkflowService<S> {
    store: S,
}

impl<S> WorkflowService<S>
where
    S: WorkflowStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and persist a workflow with its steps.
    #[instrument(skip(self, input), fields(name = %input.name, steps = input.steps.len()), err)]
    pub async fn create(&self, input: NewWorkflow) -> ServiceResult<ApprovalWorkflow> {
        let workflow = ApprovalWorkflow::define(input, Utc::now())?;
        self.store.insert_workflow(workflow.clone()).await?;
        tracing::info!(workflow_id = %workflow.id, "workflow created");
        Ok(workflow)
    }

    /// Header-only edit; steps never change after creation.
    #[instrument(skip(self, update), fields(workflow_id = %id), err)]
    pub async fn update(&self, id: WorkflowId, update: WorkflowUpdate) -> ServiceResult<ApprovalWorkflow> {
        let mut workflow = self.get(id).await?;
        workflow.apply_update(update, Utc::now())?;
        self.store.update_workflow(&workflow).await?;
        Ok(workflow)
    }

    #[instrument(skip(self), fields(workflow_id = %id), err)]
    pub async fn delete(&self, id: WorkflowId) -> ServiceResult<()> {
        match self.store.delete_workflow(id).await {
            Ok(()) => {
                tracing::info!("workflow deleted");
                Ok(())
            }
            Err(err) => {
                let err = ServiceError::from(err);
                if let ServiceError::Conflict(reason) = &err {
                    tracing::warn!(%reason, "workflow delete refused");
                }
                Err(err)
            }
        }
    }

    /// Workflow with steps ordered by `step_order`.
    pub async fn get(&self, id: WorkflowId) -> ServiceResult<ApprovalWorkflow> {
        let mut workflow = self
            .store
            .get_workflow(id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        workflow.steps.sort_by_key(|s| s.step_order);
        Ok(workflow)
    }

    /// Active workflows with their step counts, ordered by name.
    pub async fn list(&self) -> ServiceResult<Vec<WorkflowSummary>> {
        let mut summaries: Vec<WorkflowSummary> = self
            .store
            .list_workflows()
            .await?
            .iter()
            .filter(|w| w.is_active)
            .map(ApprovalWorkflow::summary)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use wareflow_auth::Role;
    use wareflow_requisitions::NewWorkflowStep;

    fn service() -> WorkflowService<InMemoryStore> {
        WorkflowService::new(InMemoryStore::new())
    }

    fn standard() -> NewWorkflow {
        NewWorkflow {
            name: "Standard Approval".to_string(),
            description: Some("manager then admin".to_string()),
            steps: vec![
                NewWorkflowStep::for_role(Role::MANAGER),
                NewWorkflowStep::for_role(Role::ADMIN),
            ],
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let svc = service();
        let created = svc.create(standard()).await.unwrap();
        let loaded = svc.get(created.id).await.unwrap();
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[0].approver_role, Role::MANAGER);
        assert_eq!(loaded.steps[1].step_order, 2);
    }

    #[tokio::test]
    async fn invalid_definitions_are_rejected() {
        let svc = service();
        let mut no_steps = standard();
        no_steps.steps.clear();
        assert!(matches!(
            svc.create(no_steps).await,
            Err(ServiceError::Validation(_))
        ));

        let mut blank = standard();
        blank.name = "   ".to_string();
        assert!(matches!(svc.create(blank).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn list_shows_active_workflows_by_name() {
        let svc = service();
        let mut b = standard();
        b.name = "Bulk".to_string();
        let bulk = svc.create(b).await.unwrap();
        let mut a = standard();
        a.name = "Adhoc".to_string();
        a.steps.truncate(1);
        svc.create(a).await.unwrap();
        let retired = svc.create(standard()).await.unwrap();
        svc.update(
            retired.id,
            WorkflowUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let list = svc.list().await.unwrap();
        let names: Vec<&str> = list.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Adhoc", "Bulk"]);
        assert_eq!(list[0].step_count, 1);
        assert_eq!(list[1].id, bulk.id);
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids() {
        let svc = service();
        let unknown = WorkflowId::new();
        assert_eq!(
            svc.update(unknown, WorkflowUpdate::default()).await,
            Err(ServiceError::NotFound)
        );
        assert_eq!(svc.delete(unknown).await, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn blank_rename_is_rejected() {
        let svc = service();
        let wf = svc.create(standard()).await.unwrap();
        let err = svc
            .update(
                wf.id,
                WorkflowUpdate {
                    name: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
