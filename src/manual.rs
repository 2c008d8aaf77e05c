//! Adapter for the external manual-packing tool.
//!
//! The manual tool emits `{ box_number, parts[], dims, total_weight_g }`
//! rows in its own schema. This adapter maps them into the engine's box
//! model so the registry never has to know that schema: deterministic id
//! per box number, parts to box lines, dimensions copied, value summed
//! from the catalog and handed to the insurance advisor.
//!
//! No packing logic lives here. The tool's reported total weight is
//! advisory only; the adapter trusts its own recomputed sum and reports a
//! mismatch instead of failing on one.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::insurance::{self, TierTable};
use crate::model::{BoxId, BoxLine, EngineError, ItemCatalog, ShippingBox, derive_aggregates};
use crate::types::{BoxDims, Grams};

/// One part row inside a manual box.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ManualPart {
    #[schema(example = "PRT-1042")]
    pub item_id: String,
    pub quantity: u32,
}

/// One box as emitted by the manual-packing tool.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "box_number": 1,
    "parts": [{ "item_id": "PRT-1042", "quantity": 2 }],
    "dims": { "length_cm": 45.0, "breadth_cm": 35.0, "height_cm": 30.0 },
    "total_weight_g": 6000
}))]
pub struct ManualBoxInput {
    pub box_number: u32,
    pub parts: Vec<ManualPart>,
    pub dims: BoxDims,
    /// Weight as reported by the tool; advisory, see [`WeightMismatch`].
    pub total_weight_g: Grams,
}

/// A manual box whose reported weight disagrees with the recomputed sum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct WeightMismatch {
    pub box_number: u32,
    pub reported_g: Grams,
    pub computed_g: Grams,
}

/// Result of adapting a manual allocation.
#[derive(Clone, Debug)]
pub struct ManualAdaptation {
    pub boxes: Vec<ShippingBox>,
    pub weight_mismatches: Vec<WeightMismatch>,
}

/// Converts manual-tool output into the engine's box model.
///
/// # Parameters
/// * `inputs` - The tool's box rows, in its order
/// * `catalog` - Item snapshots for every referenced part
/// * `tier_table` - Table for the per-box insurance assignment
///
/// # Returns
/// Boxes with derived aggregates and insurance, or the first error:
/// `ValidationError` for an empty input, a duplicate box number, a bad
/// dimension or a zero part quantity; `NotFound` for an unknown part id.
pub fn adapt(
    inputs: &[ManualBoxInput],
    catalog: &ItemCatalog,
    tier_table: &TierTable,
) -> Result<ManualAdaptation, EngineError> {
    if inputs.is_empty() {
        return Err(EngineError::Validation(
            "Manual allocation must contain at least one box".to_string(),
        ));
    }

    let mut seen_numbers = std::collections::HashSet::new();
    let mut boxes = Vec::with_capacity(inputs.len());
    let mut weight_mismatches = Vec::new();

    for input in inputs {
        if !seen_numbers.insert(input.box_number) {
            return Err(EngineError::Validation(format!(
                "Duplicate manual box number {}",
                input.box_number
            )));
        }
        input.dims.validate().map_err(EngineError::Validation)?;

        let mut lines = Vec::with_capacity(input.parts.len());
        for part in &input.parts {
            if part.quantity == 0 {
                return Err(EngineError::Validation(format!(
                    "Part '{}' in manual box {} has quantity 0",
                    part.item_id, input.box_number
                )));
            }
            catalog.require(&part.item_id)?;
            lines.push(BoxLine {
                item_id: part.item_id.clone(),
                quantity: part.quantity,
            });
        }

        let (weight_g, value) = derive_aggregates(&lines, catalog)?;
        if weight_g != input.total_weight_g {
            weight_mismatches.push(WeightMismatch {
                box_number: input.box_number,
                reported_g: input.total_weight_g,
                computed_g: weight_g,
            });
        }

        let mut package = ShippingBox::empty(BoxId::for_manual_box_number(input.box_number));
        package.lines = lines;
        package.dims = input.dims;
        package.weight_g = weight_g;
        package.value = value;
        package.insurance = Some(insurance::recommend(value, tier_table));
        boxes.push(package);
    }

    Ok(ManualAdaptation {
        boxes,
        weight_mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insurance::TierKind;
    use crate::model::test_support::line;

    fn catalog() -> ItemCatalog {
        ItemCatalog::from_lines(&[line("A", 3000, 15_000, 4), line("B", 500, 100, 10)]).unwrap()
    }

    fn manual_box(box_number: u32, parts: Vec<(&str, u32)>, total_weight_g: Grams) -> ManualBoxInput {
        ManualBoxInput {
            box_number,
            parts: parts
                .into_iter()
                .map(|(item_id, quantity)| ManualPart {
                    item_id: item_id.to_string(),
                    quantity,
                })
                .collect(),
            dims: BoxDims::default(),
            total_weight_g,
        }
    }

    #[test]
    fn adapts_parts_into_insured_boxes() {
        let inputs = vec![
            manual_box(1, vec![("A", 2)], 6000),
            manual_box(2, vec![("B", 3)], 1500),
        ];
        let adaptation = adapt(&inputs, &catalog(), &TierTable::default()).unwrap();

        assert_eq!(adaptation.boxes.len(), 2);
        assert!(adaptation.weight_mismatches.is_empty());

        let first = &adaptation.boxes[0];
        assert_eq!(first.weight_g, 6000);
        assert_eq!(first.value, 30_000);
        let assignment = first.insurance.unwrap();
        assert_eq!(assignment.tier, TierKind::DeclaredValue);
        assert_eq!(assignment.premium, 300);

        let second = &adaptation.boxes[1];
        assert_eq!(second.weight_g, 1500);
        assert_eq!(second.insurance.unwrap().tier, TierKind::None);
    }

    #[test]
    fn ids_are_deterministic_per_box_number() {
        let inputs = vec![manual_box(7, vec![("A", 1)], 3000)];
        let first = adapt(&inputs, &catalog(), &TierTable::default()).unwrap();
        let second = adapt(&inputs, &catalog(), &TierTable::default()).unwrap();
        assert_eq!(first.boxes[0].id, second.boxes[0].id);
        assert_eq!(first.boxes[0].id, BoxId::for_manual_box_number(7));
    }

    #[test]
    fn weight_mismatch_is_flagged_not_fatal() {
        let inputs = vec![manual_box(1, vec![("A", 2)], 5500)];
        let adaptation = adapt(&inputs, &catalog(), &TierTable::default()).unwrap();

        assert_eq!(adaptation.weight_mismatches, vec![WeightMismatch {
            box_number: 1,
            reported_g: 5500,
            computed_g: 6000,
        }]);
        // The recomputed sum wins.
        assert_eq!(adaptation.boxes[0].weight_g, 6000);
    }

    #[test]
    fn unknown_part_is_rejected() {
        let inputs = vec![manual_box(1, vec![("ghost", 1)], 100)];
        let err = adapt(&inputs, &catalog(), &TierTable::default()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn duplicate_box_numbers_are_rejected() {
        let inputs = vec![
            manual_box(1, vec![("A", 1)], 3000),
            manual_box(1, vec![("B", 1)], 500),
        ];
        let err = adapt(&inputs, &catalog(), &TierTable::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn zero_quantity_part_is_rejected() {
        let inputs = vec![manual_box(1, vec![("A", 0)], 0)];
        let err = adapt(&inputs, &catalog(), &TierTable::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = adapt(&[], &catalog(), &TierTable::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn empty_manual_box_is_allowed() {
        // The tool may emit a prepared-but-unfilled box; it adapts to an
        // empty box with zero-value insurance.
        let inputs = vec![manual_box(1, vec![], 0)];
        let adaptation = adapt(&inputs, &catalog(), &TierTable::default()).unwrap();
        assert!(adaptation.boxes[0].is_empty());
        assert_eq!(adaptation.boxes[0].insurance.unwrap().declared_value, 0);
    }
}
