//! The mutable box aggregate for one shipment-in-progress.
//!
//! `BoxRegistry` owns the ordered box list and is the single place where the
//! structural invariants are enforced:
//! - the box count never drops below 1 once allocation has begun
//! - every box's declared value equals its freshly summed line value
//!
//! Commands validate first and mutate second, so a rejected command leaves
//! the registry exactly as it was. After any structural change the affected
//! boxes are fully recomputed (weight, value, insurance) instead of patched
//! incrementally.

use crate::insurance::{self, TierTable};
use crate::model::{BoxId, BoxLine, EngineError, ItemCatalog, ShippingBox};
use crate::types::{BoxDims, Grams, Money};

/// Ordered box list plus the item catalog needed to re-derive aggregates.
#[derive(Clone, Debug)]
pub struct BoxRegistry {
    boxes: Vec<ShippingBox>,
    catalog: ItemCatalog,
    tier_table: TierTable,
}

impl BoxRegistry {
    /// Creates a registry from an allocation run's boxes.
    ///
    /// Annotates every box with its insurance assignment; an empty box list
    /// is rejected since the minimum-box invariant must hold from the start.
    pub fn new(
        boxes: Vec<ShippingBox>,
        catalog: ItemCatalog,
        tier_table: TierTable,
    ) -> Result<Self, EngineError> {
        if boxes.is_empty() {
            return Err(EngineError::InvariantViolation(
                "A shipment needs at least one box".to_string(),
            ));
        }
        let mut registry = Self {
            boxes,
            catalog,
            tier_table,
        };
        registry.recompute()?;
        Ok(registry)
    }

    pub fn boxes(&self) -> &[ShippingBox] {
        &self.boxes
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Total weight across all boxes in grams.
    pub fn total_weight_g(&self) -> Grams {
        self.boxes.iter().map(|b| b.weight_g).sum()
    }

    /// Total declared value across all boxes.
    pub fn total_value(&self) -> Money {
        self.boxes.iter().map(|b| b.value).sum()
    }

    /// Appends a new empty box with default dimensions.
    ///
    /// The insurance assignment is recomputed for zero value. Always
    /// succeeds.
    pub fn add_box(&mut self) -> BoxId {
        let id = BoxId::random();
        let mut package = ShippingBox::empty(id);
        package.insurance = Some(insurance::recommend(0, &self.tier_table));
        self.boxes.push(package);
        id
    }

    /// Removes a box.
    ///
    /// # Returns
    /// `InvariantViolation` if it is the last remaining box, `NotFound` for
    /// an unknown id.
    pub fn remove_box(&mut self, id: BoxId) -> Result<(), EngineError> {
        let index = self.index_of(id)?;
        if self.boxes.len() == 1 {
            return Err(EngineError::InvariantViolation(
                "The last box of a shipment cannot be removed".to_string(),
            ));
        }
        self.boxes.remove(index);
        Ok(())
    }

    /// Duplicates a box under a fresh id.
    ///
    /// Dimensions and lines are copied as of the moment of duplication and
    /// the insurance assignment recomputed. This duplicates allocation, not
    /// inventory; avoiding double-counted stock is the caller's
    /// responsibility.
    pub fn duplicate_box(&mut self, id: BoxId) -> Result<BoxId, EngineError> {
        let index = self.index_of(id)?;
        let mut copy = self.boxes[index].clone();
        copy.id = BoxId::random();
        copy.insurance = Some(insurance::recommend(copy.value, &self.tier_table));
        let new_id = copy.id;
        self.boxes.push(copy);
        Ok(new_id)
    }

    /// Replaces a box's dimensions.
    ///
    /// # Returns
    /// `ValidationError` for a non-positive or non-finite dimension,
    /// `NotFound` for an unknown id.
    pub fn update_dimensions(&mut self, id: BoxId, dims: BoxDims) -> Result<(), EngineError> {
        dims.validate().map_err(EngineError::Validation)?;
        let index = self.index_of(id)?;
        self.boxes[index].dims = dims;
        Ok(())
    }

    /// Moves `quantity` of an item from one box to another.
    ///
    /// Both touched boxes are fully recomputed (weight, value, insurance)
    /// afterwards. All checks run before the first mutation, so a rejected
    /// reassignment leaves both boxes untouched.
    pub fn reassign_line(
        &mut self,
        from: BoxId,
        to: BoxId,
        item_id: &str,
        quantity: u32,
    ) -> Result<(), EngineError> {
        if from == to {
            return Err(EngineError::Validation(
                "Source and target box must differ".to_string(),
            ));
        }
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Reassignment quantity must be at least 1".to_string(),
            ));
        }
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        self.catalog.require(item_id)?;

        let available = self.boxes[from_index].quantity_of(item_id);
        if available < quantity {
            return Err(EngineError::Validation(format!(
                "Box {} holds only {} of '{}', cannot move {}",
                from, available, item_id, quantity
            )));
        }

        take_from_lines(&mut self.boxes[from_index].lines, item_id, quantity);
        add_to_lines(&mut self.boxes[to_index].lines, item_id, quantity);

        self.recompute_box(from_index)?;
        self.recompute_box(to_index)?;
        Ok(())
    }

    /// Re-derives weight, value and insurance for every box.
    ///
    /// This is the consistency mechanism after any structural change; the
    /// registry never trusts incremental deltas.
    pub fn recompute(&mut self) -> Result<(), EngineError> {
        for index in 0..self.boxes.len() {
            self.recompute_box(index)?;
        }
        Ok(())
    }

    /// Quantity of `item_id` across all boxes, for conservation checks.
    pub fn allocated_quantity(&self, item_id: &str) -> u32 {
        self.boxes.iter().map(|b| b.quantity_of(item_id)).sum()
    }

    fn recompute_box(&mut self, index: usize) -> Result<(), EngineError> {
        let package = &mut self.boxes[index];
        package.recompute(&self.catalog)?;
        package.insurance = Some(insurance::recommend(package.value, &self.tier_table));
        Ok(())
    }

    fn index_of(&self, id: BoxId) -> Result<usize, EngineError> {
        self.boxes
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("Unknown box id {}", id)))
    }
}

fn take_from_lines(lines: &mut Vec<BoxLine>, item_id: &str, mut quantity: u32) {
    for line in lines.iter_mut() {
        if line.item_id != item_id || quantity == 0 {
            continue;
        }
        let taken = line.quantity.min(quantity);
        line.quantity -= taken;
        quantity -= taken;
    }
    lines.retain(|line| line.quantity > 0);
}

fn add_to_lines(lines: &mut Vec<BoxLine>, item_id: &str, quantity: u32) {
    match lines.iter_mut().find(|line| line.item_id == item_id) {
        Some(line) => line.quantity += quantity,
        None => lines.push(BoxLine {
            item_id: item_id.to_string(),
            quantity,
        }),
    }
}
