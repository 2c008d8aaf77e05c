//! Greedy box allocation.
//!
//! Partitions selection lines into boxes under a hard per-box weight
//! ceiling. The algorithm is a single deterministic pass in caller-supplied
//! line order: predictability and auditability are valued over packing
//! efficiency, so there is no reordering, no bin-packing search and no
//! splitting of a line across boxes.
//!
//! A line whose own weight exceeds the ceiling is placed whole into its own
//! box, which then legitimately exceeds the ceiling. This mirrors the
//! shipment semantics of the manual process and is surfaced to callers via
//! [`AllocationResult::oversized_box_count`].

use crate::model::{BoxId, BoxLine, EngineError, ItemCatalog, SelectionLine, ShippingBox};
use crate::types::{DEFAULT_WEIGHT_CEILING_G, Grams, Money};

/// Configuration for an allocation run.
#[derive(Clone, Copy, Debug)]
pub struct AllocatorConfig {
    /// Maximum aggregate weight per box before a new box is opened.
    pub weight_ceiling_g: Grams,
}

impl AllocatorConfig {
    /// Creates a configuration with an explicit ceiling.
    ///
    /// # Returns
    /// `Ok(AllocatorConfig)` for a positive ceiling, otherwise `ValidationError`.
    pub fn with_ceiling(weight_ceiling_g: Grams) -> Result<Self, EngineError> {
        if weight_ceiling_g == 0 {
            return Err(EngineError::Validation(
                "Weight ceiling must be greater than 0".to_string(),
            ));
        }
        Ok(Self { weight_ceiling_g })
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            weight_ceiling_g: DEFAULT_WEIGHT_CEILING_G,
        }
    }
}

/// Result of one allocation run.
///
/// Boxes carry derived weight and value but no insurance assignment yet;
/// the advisor annotates them afterwards.
#[derive(Clone, Debug)]
pub struct AllocationResult {
    pub boxes: Vec<ShippingBox>,
    pub catalog: ItemCatalog,
    total_weight_g: Grams,
    total_value: Money,
    oversized_box_count: usize,
}

impl AllocationResult {
    /// Number of boxes produced.
    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Total weight across all boxes, equal to the input line total.
    pub fn total_weight_g(&self) -> Grams {
        self.total_weight_g
    }

    /// Total value across all boxes, equal to the input line total.
    pub fn total_value(&self) -> Money {
        self.total_value
    }

    /// Boxes whose single line alone exceeds the ceiling.
    pub fn oversized_box_count(&self) -> usize {
        self.oversized_box_count
    }
}

/// Partitions selection lines into boxes under the configured ceiling.
///
/// Lines are validated up front (`0 < quantity <= available`); any invalid
/// line rejects the whole run before a box is created. Iteration order is
/// the caller's order, and box ids are derived from the box index, so
/// identical input reproduces identical output.
///
/// # Parameters
/// * `lines` - Selected (item, quantity) pairings, in presentation order
/// * `config` - Ceiling configuration (defaults to 10,000 g)
///
/// # Returns
/// `AllocationResult` with at least one box, or the first validation error.
pub fn allocate(
    lines: &[SelectionLine],
    config: &AllocatorConfig,
) -> Result<AllocationResult, EngineError> {
    if lines.is_empty() {
        return Err(EngineError::Validation(
            "At least one selection line is required".to_string(),
        ));
    }
    for line in lines {
        line.validate()?;
    }
    let catalog = ItemCatalog::from_lines(lines)?;

    let ceiling = config.weight_ceiling_g;
    let mut closed: Vec<(Vec<BoxLine>, Grams, Money)> = Vec::new();
    let mut current_lines: Vec<BoxLine> = Vec::new();
    let mut current_weight: Grams = 0;
    let mut current_value: Money = 0;

    for line in lines {
        let line_weight = line.weight_g()?;
        let line_value = line.value()?;
        let fits = current_weight
            .checked_add(line_weight)
            .is_some_and(|weight| weight <= ceiling);
        if !fits && !current_lines.is_empty() {
            closed.push((
                std::mem::take(&mut current_lines),
                current_weight,
                current_value,
            ));
            current_weight = 0;
            current_value = 0;
        }
        current_lines.push(BoxLine {
            item_id: line.item.item_id.clone(),
            quantity: line.quantity,
        });
        current_weight += line_weight;
        current_value = current_value
            .checked_add(line_value)
            .ok_or_else(|| EngineError::Validation("Box value overflows".to_string()))?;
    }
    if !current_lines.is_empty() {
        closed.push((current_lines, current_weight, current_value));
    }

    let mut total_weight_g: Grams = 0;
    let mut total_value: Money = 0;
    let mut oversized_box_count = 0;
    let mut boxes = Vec::with_capacity(closed.len());
    for (index, (box_lines, weight_g, value)) in closed.into_iter().enumerate() {
        total_weight_g = total_weight_g
            .checked_add(weight_g)
            .ok_or_else(|| EngineError::Validation("Shipment weight overflows".to_string()))?;
        total_value = total_value
            .checked_add(value)
            .ok_or_else(|| EngineError::Validation("Shipment value overflows".to_string()))?;
        if weight_g > ceiling {
            oversized_box_count += 1;
        }
        let mut package = ShippingBox::empty(BoxId::for_allocation_index(index));
        package.lines = box_lines;
        package.weight_g = weight_g;
        package.value = value;
        boxes.push(package);
    }

    Ok(AllocationResult {
        boxes,
        catalog,
        total_weight_g,
        total_value,
        oversized_box_count,
    })
}
