//! Postgres-backed workflow and requisition store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation on `requisitions_number_key`) | `23505` | `DuplicateNumber` | Number collision on insert |
//! | Database (any other unique violation) | `23505` | `Conflict` | Duplicate id, duplicate step order |
//! | Database (foreign key violation) | `23503` | `Conflict` | Workflow deleted or still referenced |
//! | Database (other) | Any other | `Backend` | Check constraints, syntax, ... |
//! | PoolClosed / Io / other | N/A | `Backend` | Connection failures |
//!
//! ## Compare-and-set
//!
//! `commit` issues `UPDATE requisitions ... WHERE id AND status AND
//! current_step AND revision` inside the transaction that also rewrites the
//! items and appends the ledger row. Zero affected rows rolls everything back
//! and reports a conflict.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use wareflow_auth::Role;
use wareflow_core::{
    ApprovalId, CatalogItemId, Money, RequisitionId, RequisitionItemId, UnitId, UserId,
    WorkflowId, WorkflowStepId,
};
use wareflow_requisitions::{
    ApprovalEntry, ApprovalWorkflow, ApprovedQuantity, ExpectedState, Requisition,
    RequisitionItem, STALE_STATE, WorkflowStep,
};

use super::r#trait::{
    RequisitionChange, RequisitionFilter, RequisitionStore, StoreError, StoreResult, WorkflowStore,
};

/// Postgres store. Cheap to clone; shares the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_steps(&self, workflow_ids: &[Uuid]) -> StoreResult<Vec<WorkflowStep>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, step_order, approver_role, required_approvers, is_parallel
            FROM workflow_steps
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, step_order ASC
            "#,
        )
        .bind(workflow_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_steps", e))?;

        rows.iter()
            .map(|row| StepRow::from_row(row).map(WorkflowStep::from).map_err(decode_error))
            .collect()
    }

    async fn load_items(&self, requisition_ids: &[Uuid]) -> StoreResult<Vec<RequisitionItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, requisition_id, line_no, inventory_id, item_name, description,
                   quantity_requested, unit_id, estimated_unit_cost, total_estimated_cost,
                   notes, quantity_approved, quantity_fulfilled
            FROM requisition_items
            WHERE requisition_id = ANY($1)
            ORDER BY requisition_id, line_no ASC
            "#,
        )
        .bind(requisition_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        rows.iter()
            .map(|row| ItemRow::from_row(row).map(RequisitionItem::from).map_err(decode_error))
            .collect()
    }

    /// Attach items to their headers.
    async fn hydrate(&self, rows: Vec<PgRow>) -> StoreResult<Vec<Requisition>> {
        let mut requisitions = rows
            .iter()
            .map(|row| {
                RequisitionRow::from_row(row)
                    .map_err(decode_error)
                    .and_then(Requisition::try_from)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let ids: Vec<Uuid> = requisitions.iter().map(|r| *r.id.as_uuid()).collect();
        let mut items = self.load_items(&ids).await?;
        for requisition in &mut requisitions {
            let (mine, rest): (Vec<_>, Vec<_>) = items
                .into_iter()
                .partition(|i| i.requisition_id == requisition.id);
            requisition.items = mine;
            items = rest;
        }
        Ok(requisitions)
    }
}

#[async_trait::async_trait]
impl WorkflowStore for PostgresStore {
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id), err)]
    async fn insert_workflow(&self, workflow: ApprovalWorkflow) -> StoreResult<()> {
        let mut tx = begin(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO approval_workflows (id, name, description, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(workflow.id.as_uuid())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_workflow", e))?;

        for step in &workflow.steps {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps
                    (id, workflow_id, step_order, approver_role, required_approvers, is_parallel)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(step.id.as_uuid())
            .bind(workflow.id.as_uuid())
            .bind(step.step_order as i32)
            .bind(step.approver_role.as_str())
            .bind(step.required_approvers as i32)
            .bind(step.is_parallel)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_workflow_step", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id), err)]
    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE approval_workflows
            SET name = $2, description = $3, is_active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(workflow.id.as_uuid())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_workflow", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(workflow_id = %id), err)]
    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()> {
        let mut tx = begin(&self.pool).await?;

        let exists = sqlx::query("SELECT id FROM approval_workflows WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_workflow", e))?;
        if exists.is_none() {
            rollback(tx).await?;
            return Err(StoreError::NotFound);
        }

        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM requisitions WHERE workflow_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("count_references", e))?;
        if references > 0 {
            rollback(tx).await?;
            return Err(StoreError::Conflict(format!(
                "workflow is used by {references} requisition(s)"
            )));
        }

        sqlx::query("DELETE FROM workflow_steps WHERE workflow_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_workflow_steps", e))?;
        sqlx::query("DELETE FROM approval_workflows WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_workflow", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(workflow_id = %id), err)]
    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<Option<ApprovalWorkflow>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, is_active, created_at, updated_at
            FROM approval_workflows
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_workflow", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut workflow: ApprovalWorkflow = WorkflowRow::from_row(&row).map_err(decode_error)?.into();
        workflow.steps = self.load_steps(&[*id.as_uuid()]).await?;
        Ok(Some(workflow))
    }

    #[instrument(skip(self), err)]
    async fn list_workflows(&self) -> StoreResult<Vec<ApprovalWorkflow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, is_active, created_at, updated_at
            FROM approval_workflows
            ORDER BY name ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_workflows", e))?;

        let mut workflows = rows
            .iter()
            .map(|row| WorkflowRow::from_row(row).map(ApprovalWorkflow::from).map_err(decode_error))
            .collect::<StoreResult<Vec<_>>>()?;

        let ids: Vec<Uuid> = workflows.iter().map(|w| *w.id.as_uuid()).collect();
        let steps = self.load_steps(&ids).await?;
        for workflow in &mut workflows {
            workflow.steps = steps
                .iter()
                .filter(|s| s.workflow_id == workflow.id)
                .cloned()
                .collect();
        }
        Ok(workflows)
    }
}

#[async_trait::async_trait]
impl RequisitionStore for PostgresStore {
    #[instrument(
        skip(self, requisition),
        fields(requisition_id = %requisition.id, number = %requisition.number),
        err
    )]
    async fn insert_requisition(&self, requisition: Requisition) -> StoreResult<()> {
        let mut tx = begin(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO requisitions (
                id, number, title, description, requested_by, department, priority,
                status, workflow_id, current_step, round, revision, total_estimated_cost,
                justification, required_date, created_at, updated_at,
                submitted_at, approved_at, rejected_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(requisition.id.as_uuid())
        .bind(requisition.number.as_str())
        .bind(&requisition.title)
        .bind(&requisition.description)
        .bind(requisition.requested_by.as_uuid())
        .bind(&requisition.department)
        .bind(requisition.priority.as_str())
        .bind(requisition.status.as_str())
        .bind(requisition.workflow_id.as_uuid())
        .bind(requisition.current_step as i32)
        .bind(requisition.round as i32)
        .bind(requisition.revision as i64)
        .bind(requisition.total_estimated_cost.minor_units())
        .bind(&requisition.justification)
        .bind(requisition.required_date)
        .bind(requisition.created_at)
        .bind(requisition.updated_at)
        .bind(requisition.submitted_at)
        .bind(requisition.approved_at)
        .bind(requisition.rejected_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_number_collision(&e) {
                StoreError::DuplicateNumber(requisition.number.to_string())
            } else {
                map_sqlx_error("insert_requisition", e)
            }
        })?;

        insert_items(&mut tx, &requisition.items).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(requisition_id = %id), err)]
    async fn get_requisition(&self, id: RequisitionId) -> StoreResult<Option<Requisition>> {
        let rows = sqlx::query(&format!("{SELECT_REQUISITIONS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_requisition", e))?;

        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    #[instrument(skip(self), err)]
    async fn list_requisitions(&self, filter: &RequisitionFilter) -> StoreResult<Vec<Requisition>> {
        let rows = sqlx::query(&format!(
            r#"{SELECT_REQUISITIONS}
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR priority = $2)
              AND ($3::text IS NULL OR department = $3)
              AND ($4::uuid IS NULL OR requested_by = $4)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.priority.map(|p| p.as_str()))
        .bind(filter.department.as_deref())
        .bind(filter.requested_by.map(|u| *u.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requisitions", e))?;

        self.hydrate(rows).await
    }

    #[instrument(
        skip(self, change),
        fields(
            requisition_id = %change.requisition.id,
            expected_status = %change.expected.status,
            expected_step = change.expected.current_step
        ),
        err
    )]
    async fn commit(&self, change: RequisitionChange) -> StoreResult<Requisition> {
        let RequisitionChange {
            expected,
            mut requisition,
            ledger_entry,
        } = change;
        requisition.revision = expected.revision + 1;

        let mut tx = begin(&self.pool).await?;

        let result = sqlx::query(
            r#"
            UPDATE requisitions
            SET title = $5, description = $6, department = $7, priority = $8, status = $9,
                workflow_id = $10, current_step = $11, round = $12, revision = $13,
                total_estimated_cost = $14, justification = $15, required_date = $16,
                updated_at = $17, submitted_at = $18, approved_at = $19, rejected_at = $20
            WHERE id = $1 AND status = $2 AND current_step = $3 AND revision = $4
            "#,
        )
        .bind(requisition.id.as_uuid())
        .bind(expected.status.as_str())
        .bind(expected.current_step as i32)
        .bind(expected.revision as i64)
        .bind(&requisition.title)
        .bind(&requisition.description)
        .bind(&requisition.department)
        .bind(requisition.priority.as_str())
        .bind(requisition.status.as_str())
        .bind(requisition.workflow_id.as_uuid())
        .bind(requisition.current_step as i32)
        .bind(requisition.round as i32)
        .bind(requisition.revision as i64)
        .bind(requisition.total_estimated_cost.minor_units())
        .bind(&requisition.justification)
        .bind(requisition.required_date)
        .bind(requisition.updated_at)
        .bind(requisition.submitted_at)
        .bind(requisition.approved_at)
        .bind(requisition.rejected_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_requisition", e))?;

        if result.rows_affected() == 0 {
            let exists = requisition_exists(&mut tx, requisition.id).await?;
            rollback(tx).await?;
            return Err(if exists {
                StoreError::Conflict(STALE_STATE.to_string())
            } else {
                StoreError::NotFound
            });
        }

        sqlx::query("DELETE FROM requisition_items WHERE requisition_id = $1")
            .bind(requisition.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_items", e))?;
        insert_items(&mut tx, &requisition.items).await?;

        if let Some(entry) = &ledger_entry {
            insert_ledger_entry(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(requisition)
    }

    #[instrument(skip(self), fields(requisition_id = %id), err)]
    async fn delete_requisition(&self, id: RequisitionId, expected: ExpectedState) -> StoreResult<()> {
        let mut tx = begin(&self.pool).await?;

        let row = sqlx::query(
            "SELECT status, current_step, revision FROM requisitions WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_requisition", e))?;

        let Some(row) = row else {
            rollback(tx).await?;
            return Err(StoreError::NotFound);
        };
        let status: String = row.try_get("status").map_err(decode_error)?;
        let current_step: i32 = row.try_get("current_step").map_err(decode_error)?;
        let revision: i64 = row.try_get("revision").map_err(decode_error)?;
        if status != expected.status.as_str()
            || current_step as u32 != expected.current_step
            || revision as u64 != expected.revision
        {
            rollback(tx).await?;
            return Err(StoreError::Conflict(STALE_STATE.to_string()));
        }

        for (operation, sql) in [
            ("delete_ledger", "DELETE FROM requisition_approvals WHERE requisition_id = $1"),
            ("delete_items", "DELETE FROM requisition_items WHERE requisition_id = $1"),
            ("delete_requisition", "DELETE FROM requisitions WHERE id = $1"),
        ] {
            sqlx::query(sql)
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(operation, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(requisition_id = %id), err)]
    async fn ledger(&self, id: RequisitionId) -> StoreResult<Vec<ApprovalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, requisition_id, workflow_step_id, step_order, round, approver_id,
                   approver_role, action, comments, partial, approved_quantities, created_at
            FROM requisition_approvals
            WHERE requisition_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_ledger", e))?;

        rows.iter()
            .map(|row| {
                ApprovalRow::from_row(row)
                    .map_err(decode_error)
                    .and_then(ApprovalEntry::try_from)
            })
            .collect()
    }
}

const SELECT_REQUISITIONS: &str = r#"
    SELECT id, number, title, description, requested_by, department, priority, status,
           workflow_id, current_step, round, revision, total_estimated_cost, justification,
           required_date, created_at, updated_at, submitted_at, approved_at, rejected_at
    FROM requisitions"#;

async fn begin(pool: &PgPool) -> StoreResult<Transaction<'static, Postgres>> {
    pool.begin()
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))
}

async fn rollback(tx: Transaction<'static, Postgres>) -> StoreResult<()> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

async fn requisition_exists(
    tx: &mut Transaction<'static, Postgres>,
    id: RequisitionId,
) -> StoreResult<bool> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM requisitions WHERE id = $1)")
        .bind(id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("requisition_exists", e))
}

async fn insert_items(
    tx: &mut Transaction<'static, Postgres>,
    items: &[RequisitionItem],
) -> StoreResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO requisition_items (
                id, requisition_id, line_no, inventory_id, item_name, description,
                quantity_requested, unit_id, estimated_unit_cost, total_estimated_cost,
                notes, quantity_approved, quantity_fulfilled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.requisition_id.as_uuid())
        .bind(item.line_no as i32)
        .bind(item.inventory_id.map(Uuid::from))
        .bind(&item.item_name)
        .bind(&item.description)
        .bind(item.quantity_requested)
        .bind(item.unit_id.map(Uuid::from))
        .bind(item.estimated_unit_cost.minor_units())
        .bind(item.total_estimated_cost.minor_units())
        .bind(&item.notes)
        .bind(item.quantity_approved)
        .bind(item.quantity_fulfilled)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
    }
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'static, Postgres>,
    entry: &ApprovalEntry,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO requisition_approvals (
            id, requisition_id, workflow_step_id, step_order, round, approver_id,
            approver_role, action, comments, partial, approved_quantities, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.requisition_id.as_uuid())
    .bind(entry.workflow_step_id.as_uuid())
    .bind(entry.step_order as i32)
    .bind(entry.round as i32)
    .bind(entry.approver_id.as_uuid())
    .bind(entry.approver_role.as_str())
    .bind(entry.action.as_str())
    .bind(&entry.comments)
    .bind(entry.partial)
    .bind(Json(&entry.approved_quantities))
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_ledger_entry", e))?;
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}

/// Unique constraint on `requisitions.number` (see the migration).
const NUMBER_CONSTRAINT: &str = "requisitions_number_key";

/// Only a violation of the number constraint is retryable with a fresh number;
/// any other unique violation (a reused id) stays a `Conflict`.
fn is_number_collision(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            violates_number_constraint(db_err.code().as_deref(), db_err.constraint())
        }
        _ => false,
    }
}

fn violates_number_constraint(code: Option<&str>, constraint: Option<&str>) -> bool {
    code == Some("23505") && constraint == Some(NUMBER_CONSTRAINT)
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn invalid_column(column: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("invalid value in column '{column}': {err}"))
}

// SQLx row types

#[derive(Debug)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for WorkflowRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(WorkflowRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<WorkflowRow> for ApprovalWorkflow {
    fn from(row: WorkflowRow) -> Self {
        ApprovalWorkflow {
            id: WorkflowId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            steps: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct StepRow {
    id: Uuid,
    workflow_id: Uuid,
    step_order: i32,
    approver_role: String,
    required_approvers: i32,
    is_parallel: bool,
}

impl<'r> FromRow<'r, PgRow> for StepRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StepRow {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_order: row.try_get("step_order")?,
            approver_role: row.try_get("approver_role")?,
            required_approvers: row.try_get("required_approvers")?,
            is_parallel: row.try_get("is_parallel")?,
        })
    }
}

impl From<StepRow> for WorkflowStep {
    fn from(row: StepRow) -> Self {
        WorkflowStep {
            id: WorkflowStepId::from_uuid(row.id),
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            step_order: row.step_order as u32,
            approver_role: Role::new(row.approver_role),
            required_approvers: row.required_approvers as u32,
            is_parallel: row.is_parallel,
        }
    }
}

#[derive(Debug)]
struct RequisitionRow {
    id: Uuid,
    number: String,
    title: String,
    description: Option<String>,
    requested_by: Uuid,
    department: Option<String>,
    priority: String,
    status: String,
    workflow_id: Uuid,
    current_step: i32,
    round: i32,
    revision: i64,
    total_estimated_cost: i64,
    justification: Option<String>,
    required_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for RequisitionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequisitionRow {
            id: row.try_get("id")?,
            number: row.try_get("number")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            requested_by: row.try_get("requested_by")?,
            department: row.try_get("department")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            workflow_id: row.try_get("workflow_id")?,
            current_step: row.try_get("current_step")?,
            round: row.try_get("round")?,
            revision: row.try_get("revision")?,
            total_estimated_cost: row.try_get("total_estimated_cost")?,
            justification: row.try_get("justification")?,
            required_date: row.try_get("required_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            submitted_at: row.try_get("submitted_at")?,
            approved_at: row.try_get("approved_at")?,
            rejected_at: row.try_get("rejected_at")?,
        })
    }
}

impl TryFrom<RequisitionRow> for Requisition {
    type Error = StoreError;

    fn try_from(row: RequisitionRow) -> Result<Self, Self::Error> {
        Ok(Requisition {
            id: RequisitionId::from_uuid(row.id),
            number: row.number.parse().map_err(|e| invalid_column("number", e))?,
            title: row.title,
            description: row.description,
            requested_by: UserId::from_uuid(row.requested_by),
            department: row.department,
            priority: row.priority.parse().map_err(|e| invalid_column("priority", e))?,
            status: row.status.parse().map_err(|e| invalid_column("status", e))?,
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            current_step: row.current_step as u32,
            round: row.round as u32,
            revision: row.revision as u64,
            total_estimated_cost: Money::from_minor(row.total_estimated_cost)
                .map_err(|e| invalid_column("total_estimated_cost", e))?,
            justification: row.justification,
            required_date: row.required_date,
            items: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            submitted_at: row.submitted_at,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
        })
    }
}

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    requisition_id: Uuid,
    line_no: i32,
    inventory_id: Option<Uuid>,
    item_name: String,
    description: Option<String>,
    quantity_requested: i64,
    unit_id: Option<Uuid>,
    estimated_unit_cost: i64,
    total_estimated_cost: i64,
    notes: Option<String>,
    quantity_approved: Option<i64>,
    quantity_fulfilled: i64,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            requisition_id: row.try_get("requisition_id")?,
            line_no: row.try_get("line_no")?,
            inventory_id: row.try_get("inventory_id")?,
            item_name: row.try_get("item_name")?,
            description: row.try_get("description")?,
            quantity_requested: row.try_get("quantity_requested")?,
            unit_id: row.try_get("unit_id")?,
            estimated_unit_cost: row.try_get("estimated_unit_cost")?,
            total_estimated_cost: row.try_get("total_estimated_cost")?,
            notes: row.try_get("notes")?,
            quantity_approved: row.try_get("quantity_approved")?,
            quantity_fulfilled: row.try_get("quantity_fulfilled")?,
        })
    }
}

impl From<ItemRow> for RequisitionItem {
    fn from(row: ItemRow) -> Self {
        // CHECK constraints keep both amounts non-negative.
        let estimated_unit_cost = Money::from_minor(row.estimated_unit_cost).unwrap_or_default();
        let total_estimated_cost = Money::from_minor(row.total_estimated_cost).unwrap_or_default();
        RequisitionItem {
            id: RequisitionItemId::from_uuid(row.id),
            requisition_id: RequisitionId::from_uuid(row.requisition_id),
            line_no: row.line_no as u32,
            inventory_id: row.inventory_id.map(CatalogItemId::from_uuid),
            item_name: row.item_name,
            description: row.description,
            quantity_requested: row.quantity_requested,
            unit_id: row.unit_id.map(UnitId::from_uuid),
            estimated_unit_cost,
            total_estimated_cost,
            notes: row.notes,
            quantity_approved: row.quantity_approved,
            quantity_fulfilled: row.quantity_fulfilled,
        }
    }
}

#[derive(Debug)]
struct ApprovalRow {
    id: Uuid,
    requisition_id: Uuid,
    workflow_step_id: Uuid,
    step_order: i32,
    round: i32,
    approver_id: Uuid,
    approver_role: String,
    action: String,
    comments: Option<String>,
    partial: bool,
    approved_quantities: Json<Vec<ApprovedQuantity>>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ApprovalRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ApprovalRow {
            id: row.try_get("id")?,
            requisition_id: row.try_get("requisition_id")?,
            workflow_step_id: row.try_get("workflow_step_id")?,
            step_order: row.try_get("step_order")?,
            round: row.try_get("round")?,
            approver_id: row.try_get("approver_id")?,
            approver_role: row.try_get("approver_role")?,
            action: row.try_get("action")?,
            comments: row.try_get("comments")?,
            partial: row.try_get("partial")?,
            approved_quantities: row.try_get("approved_quantities")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ApprovalRow> for ApprovalEntry {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        Ok(ApprovalEntry {
            id: ApprovalId::from_uuid(row.id),
            requisition_id: RequisitionId::from_uuid(row.requisition_id),
            workflow_step_id: WorkflowStepId::from_uuid(row.workflow_step_id),
            step_order: row.step_order as u32,
            round: row.round as u32,
            approver_id: UserId::from_uuid(row.approver_id),
            approver_role: Role::new(row.approver_role),
            action: row.action.parse().map_err(|e| invalid_column("action", e))?,
            comments: row.comments,
            partial: row.partial,
            approved_quantities: row.approved_quantities.0,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_number_constraint_is_a_number_collision() {
        assert!(violates_number_constraint(Some("23505"), Some(NUMBER_CONSTRAINT)));
        assert!(!violates_number_constraint(Some("23505"), Some("requisitions_pkey")));
        assert!(!violates_number_constraint(Some("23505"), None));
        assert!(!violates_number_constraint(Some("23503"), Some(NUMBER_CONSTRAINT)));
    }

    #[test]
    fn non_database_errors_are_not_number_collisions() {
        let err = map_sqlx_error("insert_requisition", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!is_number_collision(&sqlx::Error::PoolClosed));
    }
}
