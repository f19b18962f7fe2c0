//! Inventory catalog collaborator used to prefill requisition items.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use wareflow_core::{CatalogItemId, DomainError, UnitId};
use wareflow_requisitions::NewRequisitionItem;

use crate::error::{ServiceError, ServiceResult};
use crate::store::{StoreError, StoreResult};

/// Point-in-time view of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogItemId,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    /// Smallest currency unit.
    pub unit_price: i64,
    pub base_unit_id: Option<UnitId>,
}

#[async_trait::async_trait]
pub trait InventoryCatalog: Send + Sync {
    async fn lookup(&self, id: CatalogItemId) -> StoreResult<Option<CatalogEntry>>;
}

#[async_trait::async_trait]
impl<C> InventoryCatalog for Arc<C>
where
    C: InventoryCatalog + ?Sized,
{
    async fn lookup(&self, id: CatalogItemId) -> StoreResult<Option<CatalogEntry>> {
        (**self).lookup(id).await
    }
}

/// Catalog backed by a map. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<CatalogItemId, CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CatalogEntry) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .insert(entry.id, entry);
        Ok(())
    }
}

#[async_trait::async_trait]
impl InventoryCatalog for InMemoryCatalog {
    async fn lookup(&self, id: CatalogItemId) -> StoreResult<Option<CatalogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(entries.get(&id).cloned())
    }
}

/// Fill empty name/description/unit/cost fields from the catalog.
///
/// Only fields the caller left empty are filled; explicit values win. The
/// copy is a snapshot and later catalog edits do not touch stored items.
/// A missing catalog entry is an error only when the item lacks a name or a
/// cost of its own; description and unit are optional.
pub async fn prefill_items<C>(
    catalog: &C,
    items: Vec<NewRequisitionItem>,
) -> ServiceResult<Vec<NewRequisitionItem>>
where
    C: InventoryCatalog + ?Sized,
{
    let mut resolved = Vec::with_capacity(items.len());
    for (idx, mut item) in items.into_iter().enumerate() {
        let Some(inventory_id) = item.inventory_id else {
            resolved.push(item);
            continue;
        };
        let needs_required =
            item.item_name.trim().is_empty() || item.estimated_unit_cost.is_none();
        let needs_optional = item.unit_id.is_none() || item.description.is_none();
        if !needs_required && !needs_optional {
            resolved.push(item);
            continue;
        }

        let entry = match catalog.lookup(inventory_id).await? {
            Some(entry) => entry,
            None if needs_required => {
                return Err(ServiceError::from(DomainError::validation(format!(
                    "Item {}: inventory item {} not found",
                    idx + 1,
                    inventory_id
                ))));
            }
            None => {
                tracing::debug!(%inventory_id, "catalog entry gone, keeping caller's item fields");
                resolved.push(item);
                continue;
            }
        };

        if item.item_name.trim().is_empty() {
            item.item_name = entry.name;
        }
        if item.description.is_none() {
            item.description = entry.description;
        }
        if item.unit_id.is_none() {
            item.unit_id = entry.base_unit_id;
        }
        if item.estimated_unit_cost.is_none() {
            item.estimated_unit_cost = Some(entry.unit_price);
        }
        resolved.push(item);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolts() -> CatalogEntry {
        CatalogEntry {
            id: CatalogItemId::new(),
            name: "M8 bolt".to_string(),
            sku: "BLT-M8".to_string(),
            description: Some("zinc plated".to_string()),
            unit_price: 35,
            base_unit_id: Some(UnitId::new()),
        }
    }

    #[tokio::test]
    async fn fills_only_missing_fields() {
        let catalog = InMemoryCatalog::new();
        let entry = bolts();
        catalog.insert(entry.clone()).unwrap();

        let mut explicit = NewRequisitionItem::from_catalog(entry.id, 3);
        explicit.estimated_unit_cost = Some(30);

        let items = prefill_items(
            &catalog,
            vec![NewRequisitionItem::from_catalog(entry.id, 10), explicit],
        )
        .await
        .unwrap();

        assert_eq!(items[0].item_name, "M8 bolt");
        assert_eq!(items[0].estimated_unit_cost, Some(35));
        assert_eq!(items[0].unit_id, entry.base_unit_id);
        assert_eq!(items[1].estimated_unit_cost, Some(30));
    }

    #[tokio::test]
    async fn unknown_catalog_entry_is_a_validation_error() {
        let catalog = InMemoryCatalog::new();
        let err = prefill_items(
            &catalog,
            vec![NewRequisitionItem::from_catalog(CatalogItemId::new(), 1)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn removed_entry_is_fine_when_name_and_cost_are_given() {
        let catalog = InMemoryCatalog::new();
        let mut item = NewRequisitionItem::from_catalog(CatalogItemId::new(), 4);
        item.item_name = "Hex nut".to_string();
        item.estimated_unit_cost = Some(12);

        let items = prefill_items(&catalog, vec![item.clone()]).await.unwrap();
        assert_eq!(items, vec![item]);
    }

    #[tokio::test]
    async fn free_text_items_pass_through() {
        let catalog = InMemoryCatalog::new();
        let item = NewRequisitionItem::new("Custom bracket", 2, 1_500);
        let items = prefill_items(&catalog, vec![item.clone()]).await.unwrap();
        assert_eq!(items, vec![item]);
    }
}
