//! Infrastructure layer: stores, the inventory catalog, configuration and
//! the services that orchestrate the requisition domain.
//!
//! Services load a snapshot, run a pure domain decision from
//! `wareflow-requisitions`, then commit under a compare-and-set guard so that
//! concurrent writers on the same requisition see exactly one winner.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod requisition_service;
pub mod store;
pub mod workflow_service;


pub use bootstrap::{Services, build_services};
pub use config::{InfraConfig, StoreBackend};
pub use error::{ServiceError, ServiceResult};
pub use requisition_service::{
    ActionOutcome, CreatedRequisition, IssueOutcome, RequisitionDetail, RequisitionService,
};
pub use workflow_service::WorkflowService;
