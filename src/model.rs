//! Data model for the shipment-in-progress.
//!
//! This module defines the structures the engine operates on:
//! - `ItemSnapshot` / `ItemCatalog`: immutable views of catalog items
//! - `SelectionLine`: one validated (item, quantity) input to an allocation run
//! - `BoxLine` / `ShippingBox`: the box model with derived aggregates
//! - `EngineError`: the error taxonomy shared by all commands
//!
//! Aggregates (`weight_g`, `value`) are never tracked incrementally; they are
//! re-derived from the lines after every mutation, which keeps the model
//! immune to staleness at the expected box and line counts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::insurance::InsuranceAssignment;
use crate::types::{BOX_ID_NAMESPACE, BoxDims, Grams, Money, validation};

/// Error taxonomy for allocation and registry commands.
///
/// Every command either fully applies or is fully rejected with one of
/// these; none of them leaves the box set violating an invariant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Input rejected at the point of entry (bad quantity, bad dimension).
    #[error("Validation failed: {0}")]
    Validation(String),
    /// A command that would break a structural invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// An unknown box or item id.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Opaque box identifier, unique within a shipment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "6f2d9b4e-0000-5000-8000-000000000001")]
pub struct BoxId(pub Uuid);

impl BoxId {
    /// Fresh random id, used for boxes created interactively.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for the `index`-th box of an allocation run.
    pub fn for_allocation_index(index: usize) -> Self {
        Self(Uuid::new_v5(
            &BOX_ID_NAMESPACE,
            format!("auto-{index}").as_bytes(),
        ))
    }

    /// Deterministic id for a manual-tool box number.
    pub fn for_manual_box_number(box_number: u32) -> Self {
        Self(Uuid::new_v5(
            &BOX_ID_NAMESPACE,
            format!("manual-{box_number}").as_bytes(),
        ))
    }
}

impl std::fmt::Display for BoxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable snapshot of one catalog item as seen by the engine.
///
/// Owned by the external catalog; the engine never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemSnapshot {
    #[schema(example = "PRT-1042")]
    pub item_id: String,
    #[schema(example = "Bearing housing")]
    pub name: String,
    pub unit_weight_g: Grams,
    pub unit_price: Money,
    pub available_qty: u32,
}

/// One selected (item, quantity) pairing, input to an allocation run.
///
/// Carries the item snapshot inline, as supplied by the catalog collaborator
/// at the engine boundary.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "item_id": "PRT-1042",
    "name": "Bearing housing",
    "unit_weight_g": 3000,
    "unit_price": 12000,
    "available_qty": 4,
    "quantity": 1
}))]
pub struct SelectionLine {
    #[serde(flatten)]
    pub item: ItemSnapshot,
    pub quantity: u32,
}

impl SelectionLine {
    /// Validates the requested quantity against available stock.
    pub fn validate(&self) -> Result<(), EngineError> {
        validation::validate_quantity(self.quantity, self.item.available_qty, &self.item.item_id)
            .map_err(EngineError::Validation)
    }

    /// Total weight of the line in grams.
    ///
    /// Fails with `Validation` if the product does not fit the weight type;
    /// the snapshot magnitudes come from an external catalog and are not
    /// bounded here.
    pub fn weight_g(&self) -> Result<Grams, EngineError> {
        self.item
            .unit_weight_g
            .checked_mul(self.quantity as Grams)
            .ok_or_else(|| overflow_error("Weight", &self.item.item_id))
    }

    /// Total value of the line.
    ///
    /// Fails with `Validation` on overflow, like [`SelectionLine::weight_g`].
    pub fn value(&self) -> Result<Money, EngineError> {
        self.item
            .unit_price
            .checked_mul(self.quantity as Money)
            .ok_or_else(|| overflow_error("Value", &self.item.item_id))
    }
}

fn overflow_error(what: &str, item_id: &str) -> EngineError {
    EngineError::Validation(format!("{} of line '{}' overflows", what, item_id))
}

/// Lookup of item snapshots by id, built once per allocation run.
#[derive(Clone, Debug, Default)]
pub struct ItemCatalog {
    items: HashMap<String, ItemSnapshot>,
}

impl ItemCatalog {
    /// Builds a catalog from selection lines.
    ///
    /// A repeated item id must carry an identical snapshot; diverging
    /// snapshots for the same id are rejected.
    pub fn from_lines(lines: &[SelectionLine]) -> Result<Self, EngineError> {
        let mut items = HashMap::with_capacity(lines.len());
        for line in lines {
            match items.get(&line.item.item_id) {
                Some(existing) if existing != &line.item => {
                    return Err(EngineError::Validation(format!(
                        "Conflicting snapshots for item '{}'",
                        line.item.item_id
                    )));
                }
                _ => {
                    items.insert(line.item.item_id.clone(), line.item.clone());
                }
            }
        }
        Ok(Self { items })
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemSnapshot> {
        self.items.get(item_id)
    }

    /// Snapshot for `item_id`, or `NotFound`.
    pub fn require(&self, item_id: &str) -> Result<&ItemSnapshot, EngineError> {
        self.items
            .get(item_id)
            .ok_or_else(|| EngineError::NotFound(format!("Unknown item '{}'", item_id)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One (item, quantity) pairing within a box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BoxLine {
    #[schema(example = "PRT-1042")]
    pub item_id: String,
    pub quantity: u32,
}

/// A single physical shipping unit.
///
/// `weight_g` and `value` are derived aggregates; call
/// [`ShippingBox::recompute`] after changing `lines` rather than adjusting
/// them in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingBox {
    pub id: BoxId,
    pub lines: Vec<BoxLine>,
    pub dims: BoxDims,
    pub weight_g: Grams,
    pub value: Money,
    pub insurance: Option<InsuranceAssignment>,
}

impl ShippingBox {
    /// Creates an empty box with the given id and default carton dimensions.
    pub fn empty(id: BoxId) -> Self {
        Self {
            id,
            lines: Vec::new(),
            dims: BoxDims::default(),
            weight_g: 0,
            value: 0,
            insurance: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity of `item_id` currently in this box.
    pub fn quantity_of(&self, item_id: &str) -> u32 {
        self.lines
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.quantity)
            .sum()
    }

    /// Re-derives `weight_g` and `value` from the lines.
    ///
    /// Fails with `NotFound` if a line references an item missing from the
    /// catalog; the aggregates are left untouched in that case.
    pub fn recompute(&mut self, catalog: &ItemCatalog) -> Result<(), EngineError> {
        let (weight_g, value) = derive_aggregates(&self.lines, catalog)?;
        self.weight_g = weight_g;
        self.value = value;
        Ok(())
    }
}

/// Sums weight and value over a set of box lines against the catalog.
///
/// Pure helper used by every recompute path, so the "declared value equals
/// freshly summed line value" invariant has a single implementation.
pub fn derive_aggregates(
    lines: &[BoxLine],
    catalog: &ItemCatalog,
) -> Result<(Grams, Money), EngineError> {
    let mut weight_g: Grams = 0;
    let mut value: Money = 0;
    for line in lines {
        let item = catalog.require(&line.item_id)?;
        let line_weight = item
            .unit_weight_g
            .checked_mul(line.quantity as Grams)
            .ok_or_else(|| overflow_error("Weight", &line.item_id))?;
        let line_value = item
            .unit_price
            .checked_mul(line.quantity as Money)
            .ok_or_else(|| overflow_error("Value", &line.item_id))?;
        weight_g = weight_g
            .checked_add(line_weight)
            .ok_or_else(|| overflow_error("Summed weight", &line.item_id))?;
        value = value
            .checked_add(line_value)
            .ok_or_else(|| overflow_error("Summed value", &line.item_id))?;
    }
    Ok((weight_g, value))
}


#[cfg(test)]
mod tests {
    use super::test_support::{line, line_with_stock};
    use super::*;

    #[test]
    fn selection_line_quantity_bounds() {
        assert!(line_with_stock("A", 100, 10, 1, 4).validate().is_ok());
        assert!(line_with_stock("A", 100, 10, 4, 4).validate().is_ok());
        assert!(line_with_stock("A", 100, 10, 0, 4).validate().is_err());
        assert!(line_with_stock("A", 100, 10, 5, 4).validate().is_err());
    }

    #[test]
    fn selection_line_totals() {
        let sel = line("A", 3000, 1500, 2);
        assert_eq!(sel.weight_g().unwrap(), 6000);
        assert_eq!(sel.value().unwrap(), 3000);
    }

    #[test]
    fn selection_line_totals_reject_overflow() {
        let heavy = line("A", Grams::MAX / 2 + 1, 10, 2);
        assert!(matches!(
            heavy.weight_g().unwrap_err(),
            EngineError::Validation(_)
        ));

        let precious = line("B", 10, Money::MAX / 2 + 1, 2);
        assert!(matches!(
            precious.value().unwrap_err(),
            EngineError::Validation(_)
        ));
    }

    #[test]
    fn catalog_rejects_conflicting_snapshots() {
        let a = line("A", 3000, 1500, 1);
        let mut conflicting = line("A", 3000, 1500, 1);
        conflicting.item.unit_price = 9999;
        assert!(ItemCatalog::from_lines(&[a.clone(), a.clone()]).is_ok());
        assert!(ItemCatalog::from_lines(&[a, conflicting]).is_err());
    }

    #[test]
    fn recompute_derives_fresh_aggregates() {
        let lines = vec![line("A", 3000, 1500, 2), line("B", 500, 20_000, 1)];
        let catalog = ItemCatalog::from_lines(&lines).unwrap();

        let mut package = ShippingBox::empty(BoxId::random());
        package.lines.push(BoxLine {
            item_id: "A".to_string(),
            quantity: 2,
        });
        package.lines.push(BoxLine {
            item_id: "B".to_string(),
            quantity: 1,
        });
        package.recompute(&catalog).unwrap();

        assert_eq!(package.weight_g, 6500);
        assert_eq!(package.value, 23_000);
    }

    #[test]
    fn recompute_rejects_unknown_item_and_keeps_aggregates() {
        let catalog = ItemCatalog::from_lines(&[line("A", 3000, 1500, 1)]).unwrap();
        let mut package = ShippingBox::empty(BoxId::random());
        package.lines.push(BoxLine {
            item_id: "ghost".to_string(),
            quantity: 1,
        });
        package.weight_g = 42;
        package.value = 43;

        let err = package.recompute(&catalog).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(package.weight_g, 42);
        assert_eq!(package.value, 43);
    }

    #[test]
    fn derive_aggregates_rejects_overflow() {
        let catalog = ItemCatalog::from_lines(&[line("A", Grams::MAX / 2 + 1, 10, 2)]).unwrap();
        let lines = vec![BoxLine {
            item_id: "A".to_string(),
            quantity: 2,
        }];
        let err = derive_aggregates(&lines, &catalog).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn allocation_ids_are_deterministic() {
        assert_eq!(
            BoxId::for_allocation_index(0),
            BoxId::for_allocation_index(0)
        );
        assert_ne!(
            BoxId::for_allocation_index(0),
            BoxId::for_allocation_index(1)
        );
        assert_eq!(
            BoxId::for_manual_box_number(3),
            BoxId::for_manual_box_number(3)
        );
        assert_ne!(
            BoxId::for_manual_box_number(3),
            BoxId::for_allocation_index(3)
        );
    }
}
