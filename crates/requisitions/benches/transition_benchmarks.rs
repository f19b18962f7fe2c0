use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use wareflow_auth::{Actor, Role};
use wareflow_core::{UserId, WorkflowId, WorkflowStepId};
use wareflow_requisitions::state_machine::{self, transition};
use wareflow_requisitions::{
    ApprovalDecision, ApprovalEntry, ApprovedQuantity, Command, NewRequisition,
    NewRequisitionItem, Priority, QuorumPolicy, Requisition, RequisitionNumber,
    TransitionContext, WorkflowStep,
};

fn steps(count: u32) -> Vec<WorkflowStep> {
    let workflow_id = WorkflowId::new();
    (1..=count)
        .map(|step_order| WorkflowStep {
            id: WorkflowStepId::new(),
            workflow_id,
            step_order,
            approver_role: Role::MANAGER,
            required_approvers: 1,
            is_parallel: false,
        })
        .collect()
}

fn submitted_requisition(item_count: usize, workflow_id: WorkflowId) -> Requisition {
    let now = Utc::now();
    let items = (0..item_count)
        .map(|i| NewRequisitionItem::new(format!("item-{i}"), 10, 250))
        .collect();
    let mut req = Requisition::draft(
        NewRequisition {
            title: "Bench requisition".to_string(),
            description: None,
            department: None,
            priority: Priority::Medium,
            workflow_id,
            justification: None,
            required_date: None,
            items,
        },
        UserId::new(),
        RequisitionNumber::generate(now, 0),
        now,
    )
    .unwrap();

    let owner = Actor::new(req.requested_by, Role::USER);
    let ctx = TransitionContext {
        actor: &owner,
        requisition_id: req.id,
        round: req.round,
        step: None,
        step_count: 0,
        items: &req.items,
        ledger: &[],
        policy: QuorumPolicy::default(),
        now,
    };
    let t = transition(req.state(), Command::Submit, &ctx).unwrap();
    state_machine::apply(&mut req, &t, now);
    req
}

fn bench_single_approval(c: &mut Criterion) {
    let mut group = c.benchmark_group("approve_transition");

    for item_count in [1usize, 10, 100] {
        let steps = steps(3);
        let req = submitted_requisition(item_count, steps[0].workflow_id);
        let approver = Actor::new(UserId::new(), Role::MANAGER);
        let quantities: Vec<ApprovedQuantity> = req
            .items
            .iter()
            .map(|i| ApprovedQuantity::new(i.id, i.quantity_requested / 2))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("partial_quantities", item_count),
            &item_count,
            |b, _| {
                b.iter(|| {
                    let ctx = TransitionContext {
                        actor: &approver,
                        requisition_id: req.id,
                        round: req.round,
                        step: steps.first(),
                        step_count: steps.len() as u32,
                        items: &req.items,
                        ledger: &[],
                        policy: QuorumPolicy::default(),
                        now: Utc::now(),
                    };
                    let decision =
                        ApprovalDecision::approve().with_quantities(black_box(quantities.clone()));
                    transition(req.state(), Command::Act(decision), &ctx).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_full_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("approval_walk");

    for step_count in [1u32, 5, 20] {
        let steps = steps(step_count);
        let base = submitted_requisition(5, steps[0].workflow_id);

        group.bench_with_input(
            BenchmarkId::new("steps", step_count),
            &step_count,
            |b, _| {
                b.iter(|| {
                    let mut req = base.clone();
                    let mut ledger: Vec<ApprovalEntry> = Vec::new();
                    while let Some(current) = req.state().active_step() {
                        let approver = Actor::new(UserId::new(), Role::MANAGER);
                        let now = Utc::now();
                        let ctx = TransitionContext {
                            actor: &approver,
                            requisition_id: req.id,
                            round: req.round,
                            step: steps.iter().find(|s| s.step_order == current),
                            step_count,
                            items: &req.items,
                            ledger: &ledger,
                            policy: QuorumPolicy::default(),
                            now,
                        };
                        let t = transition(req.state(), Command::Act(ApprovalDecision::approve()), &ctx)
                            .unwrap();
                        state_machine::apply(&mut req, &t, now);
                        ledger.extend(t.ledger_entry);
                    }
                    black_box(req)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_approval, bench_full_walk);
criterion_main!(benches);
