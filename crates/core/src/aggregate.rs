//! Aggregate root trait for the consistency boundaries of the workflow engine.

/// Aggregate root marker + minimal interface.
///
/// An aggregate root owns its child entities: persisting the root persists its
/// children in the same atomic unit, and removing the root removes them. Stores
/// must never expose a child without its root.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Child entity type owned by this root.
    type Child: crate::Entity;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Child entities in their canonical order.
    fn children(&self) -> &[Self::Child];
}
