//! Approval workflow definitions: a named, ordered list of role-gated steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_auth::Role;
use wareflow_core::{AggregateRoot, DomainError, DomainResult, Entity, WorkflowId, WorkflowStepId};

/// One stage of a workflow, tied to the role allowed to act on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: WorkflowStepId,
    pub workflow_id: WorkflowId,
    /// 1-based, contiguous within the workflow.
    pub step_order: u32,
    pub approver_role: Role,
    /// Distinct approvals needed before the step is cleared.
    pub required_approvers: u32,
    pub is_parallel: bool,
}

impl Entity for WorkflowStep {
    type Id = WorkflowStepId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: ApprovalWorkflow.
///
/// Steps are fixed at creation; only header fields can change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRoot for ApprovalWorkflow {
    type Id = WorkflowId;
    type Child = WorkflowStep;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn children(&self) -> &[WorkflowStep] {
        &self.steps
    }
}

/// Input for a single step of a new workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowStep {
    /// Defaults to the step's position (1-based) when omitted.
    pub step_order: Option<u32>,
    pub approver_role: Role,
    pub required_approvers: Option<u32>,
    #[serde(default)]
    pub is_parallel: bool,
}

impl NewWorkflowStep {
    pub fn for_role(role: impl Into<Role>) -> Self {
        Self {
            step_order: None,
            approver_role: role.into(),
            required_approvers: None,
            is_parallel: false,
        }
    }

    pub fn with_quorum(mut self, required_approvers: u32) -> Self {
        self.required_approvers = Some(required_approvers);
        self
    }
}

/// Input for `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<NewWorkflowStep>,
}

/// Header-only edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// List row: an active workflow plus its computed step count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub step_count: usize,
}

impl ApprovalWorkflow {
    /// Validate a definition and build the aggregate with fresh ids.
    pub fn define(input: NewWorkflow, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Workflow name is required"));
        }
        if input.steps.is_empty() {
            return Err(DomainError::validation(
                "Workflow must have at least one step",
            ));
        }

        let id = WorkflowId::new();
        let mut steps = Vec::with_capacity(input.steps.len());
        for (idx, step) in input.steps.into_iter().enumerate() {
            if step.approver_role.is_blank() {
                return Err(DomainError::validation(format!(
                    "Step {} has no approver role",
                    idx + 1
                )));
            }
            let required_approvers = step.required_approvers.unwrap_or(1);
            if required_approvers == 0 {
                return Err(DomainError::validation(format!(
                    "Step {} must require at least one approver",
                    idx + 1
                )));
            }
            steps.push(WorkflowStep {
                id: WorkflowStepId::new(),
                workflow_id: id,
                step_order: step.step_order.unwrap_or(idx as u32 + 1),
                approver_role: step.approver_role,
                required_approvers,
                is_parallel: step.is_parallel,
            });
        }

        steps.sort_by_key(|s| s.step_order);
        for (idx, step) in steps.iter().enumerate() {
            if step.step_order != idx as u32 + 1 {
                return Err(DomainError::validation(
                    "Step orders must be contiguous and start at 1",
                ));
            }
        }

        Ok(Self {
            id,
            name: name.to_string(),
            description: input.description,
            is_active: true,
            steps,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a header edit. Steps are never touched.
    pub fn apply_update(&mut self, update: WorkflowUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("Workflow name is required"));
            }
            self.name = name.to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn step(&self, step_order: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    pub fn is_last_step(&self, step_order: u32) -> bool {
        step_order == self.step_count()
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
            step_count: self.steps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> NewWorkflow {
        NewWorkflow {
            name: "Standard Approval".to_string(),
            description: Some("manager then admin".to_string()),
            steps: vec![
                NewWorkflowStep::for_role("manager"),
                NewWorkflowStep::for_role("admin"),
            ],
        }
    }

    #[test]
    fn define_assigns_default_orders_and_quorum() {
        let wf = ApprovalWorkflow::define(standard(), Utc::now()).unwrap();
        assert_eq!(wf.step_count(), 2);
        assert_eq!(wf.steps[0].step_order, 1);
        assert_eq!(wf.steps[0].approver_role, Role::MANAGER);
        assert_eq!(wf.steps[1].step_order, 2);
        assert!(wf.steps.iter().all(|s| s.required_approvers == 1));
        assert!(wf.steps.iter().all(|s| s.workflow_id == wf.id));
        assert!(wf.is_active);
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut input = standard();
        input.name = "   ".to_string();
        let err = ApprovalWorkflow::define(input, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("Workflow name is required"));
    }

    #[test]
    fn empty_steps_are_rejected() {
        let mut input = standard();
        input.steps.clear();
        assert!(matches!(
            ApprovalWorkflow::define(input, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn explicit_orders_are_sorted_and_must_be_contiguous() {
        let mut input = standard();
        input.steps[0].step_order = Some(2);
        input.steps[1].step_order = Some(1);
        let wf = ApprovalWorkflow::define(input, Utc::now()).unwrap();
        assert_eq!(wf.steps[0].approver_role, Role::ADMIN);

        let mut gap = standard();
        gap.steps[1].step_order = Some(3);
        assert!(ApprovalWorkflow::define(gap, Utc::now()).is_err());
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let mut input = standard();
        input.steps[0] = NewWorkflowStep::for_role("manager").with_quorum(0);
        assert!(ApprovalWorkflow::define(input, Utc::now()).is_err());
    }

    #[test]
    fn update_changes_header_only() {
        let mut wf = ApprovalWorkflow::define(standard(), Utc::now()).unwrap();
        let steps_before = wf.steps.clone();
        wf.apply_update(
            WorkflowUpdate {
                name: Some("Fast track".to_string()),
                description: None,
                is_active: Some(false),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(wf.name, "Fast track");
        assert!(!wf.is_active);
        assert_eq!(wf.steps, steps_before);
        assert_eq!(wf.summary().step_count, 2);
    }

    #[test]
    fn last_step_lookup() {
        let wf = ApprovalWorkflow::define(standard(), Utc::now()).unwrap();
        assert!(!wf.is_last_step(1));
        assert!(wf.is_last_step(2));
        assert!(wf.step(3).is_none());
    }
}
