//! Shared primitives for the allocation engine.
//!
//! Weights are integer grams and monetary amounts integer currency units
//! throughout, so conserved sums stay exact. Dimensions are the only
//! floating-point quantity, since they are measurements rather than money.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Weight in grams.
pub type Grams = u64;

/// Monetary amount in minor currency units.
pub type Money = u64;

/// Hard per-box weight ceiling used when the caller supplies none (10 kg).
pub const DEFAULT_WEIGHT_CEILING_G: Grams = 10_000;

/// Debounce window for cost-estimate triggers, in milliseconds.
pub const DEFAULT_ESTIMATE_DEBOUNCE_MS: u64 = 300;

/// Namespace for deterministic (v5) box identifiers.
///
/// Allocator-produced and manually-adapted boxes derive their ids from this
/// namespace so that re-running with identical input reproduces identical
/// output, ids included.
pub const BOX_ID_NAMESPACE: Uuid = Uuid::from_u128(0x9f2c4d6e8a1b4c3d9e5f7a8b6c4d2e1f);

/// Physical box dimensions in centimeters.
///
/// Each dimension must be positive and finite. The default is the standard
/// carton stocked by the warehouse.
///
/// # Examples
/// ```
/// use boxwise::types::BoxDims;
///
/// let dims = BoxDims::new(45.0, 35.0, 30.0).unwrap();
/// assert!(dims.length_cm > 0.0);
/// assert!(BoxDims::new(0.0, 35.0, 30.0).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxDims {
    #[schema(example = 45.0)]
    pub length_cm: f64,
    #[schema(example = 35.0)]
    pub breadth_cm: f64,
    #[schema(example = 30.0)]
    pub height_cm: f64,
}

impl BoxDims {
    pub const STANDARD_CARTON: BoxDims = BoxDims {
        length_cm: 45.0,
        breadth_cm: 35.0,
        height_cm: 30.0,
    };

    /// Creates dimensions after validating every side.
    ///
    /// # Returns
    /// `Ok(BoxDims)` for valid values, otherwise the offending side's error.
    pub fn new(length_cm: f64, breadth_cm: f64, height_cm: f64) -> Result<Self, String> {
        let dims = Self {
            length_cm,
            breadth_cm,
            height_cm,
        };
        dims.validate()?;
        Ok(dims)
    }

    /// Checks that every side is positive and finite.
    pub fn validate(&self) -> Result<(), String> {
        validation::validate_dimension(self.length_cm, "Length")?;
        validation::validate_dimension(self.breadth_cm, "Breadth")?;
        validation::validate_dimension(self.height_cm, "Height")?;
        Ok(())
    }

    /// Volume in cubic centimeters.
    #[inline]
    pub fn volume_cm3(&self) -> f64 {
        self.length_cm * self.breadth_cm * self.height_cm
    }
}

impl Default for BoxDims {
    fn default() -> Self {
        Self::STANDARD_CARTON
    }
}

/// Shared validation helpers.
pub mod validation {
    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        Ok(())
    }

    /// Validates a requested quantity against available stock.
    ///
    /// # Returns
    /// `Ok(())` when `0 < quantity <= available`, otherwise error text
    pub fn validate_quantity(quantity: u32, available: u32, item_id: &str) -> Result<(), String> {
        if quantity == 0 {
            return Err(format!("Quantity for '{}' must be at least 1", item_id));
        }
        if quantity > available {
            return Err(format!(
                "Quantity {} for '{}' exceeds available stock {}",
                quantity, item_id, available
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_carton_is_default_and_valid() {
        let dims = BoxDims::default();
        assert_eq!(dims, BoxDims::STANDARD_CARTON);
        assert!(dims.validate().is_ok());
    }

    #[test]
    fn dims_reject_non_positive_sides() {
        assert!(BoxDims::new(0.0, 35.0, 30.0).is_err());
        assert!(BoxDims::new(45.0, -1.0, 30.0).is_err());
        assert!(BoxDims::new(45.0, 35.0, f64::NAN).is_err());
        assert!(BoxDims::new(45.0, f64::INFINITY, 30.0).is_err());
    }

    #[test]
    fn dims_volume() {
        let dims = BoxDims::new(10.0, 20.0, 30.0).unwrap();
        assert!((dims.volume_cm3() - 6000.0).abs() < 1e-9);
    }

    #[test]
    fn quantity_validation_bounds() {
        assert!(validation::validate_quantity(1, 1, "A").is_ok());
        assert!(validation::validate_quantity(5, 10, "A").is_ok());
        assert!(validation::validate_quantity(0, 10, "A").is_err());
        assert!(validation::validate_quantity(11, 10, "A").is_err());
    }
}
