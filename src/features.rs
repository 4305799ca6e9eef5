//! Engineered ratio and interaction features.
//!
//! The same deriver runs in the training flow and at inference so both see
//! identical formulas. Every denominator carries a 0.1 offset.

use crate::data::{CustomerProfile, NumericAttribute};

/// Offset added to every denominator
pub const DENOMINATOR_OFFSET: f64 = 0.1;

/// Names of the derived features, in column order
pub const DERIVED_FEATURE_NAMES: [&str; 6] = [
    "distance_per_order",
    "devices_per_order",
    "orders_per_year_relationship",
    "recent_dissatisfaction",
    "usage_intensity",
    "rf_score",
];

/// The six features computed from a complete customer profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeatures {
    pub distance_per_order: f64,
    pub devices_per_order: f64,
    pub orders_per_year_relationship: f64,
    pub recent_dissatisfaction: f64,
    pub usage_intensity: f64,
    pub rf_score: f64,
}

impl DerivedFeatures {
    /// Values in the order of [`DERIVED_FEATURE_NAMES`]
    pub fn values(&self) -> [f64; 6] {
        [
            self.distance_per_order,
            self.devices_per_order,
            self.orders_per_year_relationship,
            self.recent_dissatisfaction,
            self.usage_intensity,
            self.rf_score,
        ]
    }
}

/// Stateless feature deriver shared by training and scoring
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureDeriver;

impl FeatureDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Compute the derived features for one customer.
    ///
    /// # Arguments
    /// * `profile` - Customer with every numeric attribute present
    ///
    /// # Returns
    /// * The six derived features; never fails
    pub fn derive(&self, profile: &CustomerProfile) -> DerivedFeatures {
        let orders = profile.numeric(NumericAttribute::OrderCount);
        let complaint = if profile.traits.complained { 1.0 } else { 0.0 };

        DerivedFeatures {
            distance_per_order: ratio(profile.numeric(NumericAttribute::WarehouseToHome), orders),
            devices_per_order: ratio(profile.numeric(NumericAttribute::DeviceCount), orders),
            orders_per_year_relationship: ratio(orders, profile.numeric(NumericAttribute::Tenure)),
            recent_dissatisfaction: complaint
                * (6.0 - profile.numeric(NumericAttribute::SatisfactionScore)),
            usage_intensity: ratio(profile.numeric(NumericAttribute::HourSpendOnApp), orders),
            rf_score: ratio(orders, profile.numeric(NumericAttribute::DaySinceLastOrder)),
        }
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        &DERIVED_FEATURE_NAMES
    }

    pub fn feature_count(&self) -> usize {
        DERIVED_FEATURE_NAMES.len()
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + DENOMINATOR_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CityTier, CustomerTraits, NumericValues};

    fn profile(values: [(NumericAttribute, f64); 10], complained: bool) -> CustomerProfile {
        let mut numerics = NumericValues::filled(0.0);
        for (attr, value) in values {
            numerics.set(attr, value);
        }
        CustomerProfile {
            customer_id: 1,
            numerics,
            traits: CustomerTraits {
                complained,
                preferred_order_category: "Mobile".to_string(),
                preferred_payment_mode: "UPI".to_string(),
                preferred_login_device: "Phone".to_string(),
                city_tier: CityTier::One,
            },
        }
    }

    #[test]
    fn test_derive_formulas() {
        let p = profile(
            [
                (NumericAttribute::Tenure, 9.9),
                (NumericAttribute::WarehouseToHome, 20.0),
                (NumericAttribute::HourSpendOnApp, 3.9),
                (NumericAttribute::DeviceCount, 4.0),
                (NumericAttribute::SatisfactionScore, 2.0),
                (NumericAttribute::AddressCount, 3.0),
                (NumericAttribute::OrderAmountHike, 15.0),
                (NumericAttribute::OrderCount, 3.9),
                (NumericAttribute::DaySinceLastOrder, 1.9),
                (NumericAttribute::CashbackAmount, 150.0),
            ],
            true,
        );
        let derived = FeatureDeriver::new().derive(&p);

        assert!((derived.distance_per_order - 5.0).abs() < 1e-12);
        assert!((derived.devices_per_order - 1.0).abs() < 1e-12);
        assert!((derived.orders_per_year_relationship - 0.39).abs() < 1e-12);
        assert_eq!(derived.recent_dissatisfaction, 4.0);
        assert!((derived.usage_intensity - 0.975).abs() < 1e-12);
        assert!((derived.rf_score - 1.95).abs() < 1e-12);
    }

    #[test]
    fn test_zero_denominators_stay_finite() {
        let p = profile(
            [
                (NumericAttribute::Tenure, 0.0),
                (NumericAttribute::WarehouseToHome, 35.0),
                (NumericAttribute::HourSpendOnApp, 5.0),
                (NumericAttribute::DeviceCount, 6.0),
                (NumericAttribute::SatisfactionScore, 5.0),
                (NumericAttribute::AddressCount, 1.0),
                (NumericAttribute::OrderAmountHike, 11.0),
                (NumericAttribute::OrderCount, 0.0),
                (NumericAttribute::DaySinceLastOrder, 0.0),
                (NumericAttribute::CashbackAmount, 0.0),
            ],
            false,
        );
        let derived = FeatureDeriver::new().derive(&p);

        assert!(derived.values().iter().all(|v| v.is_finite()));
        assert!((derived.distance_per_order - 350.0).abs() < 1e-9);
        assert_eq!(derived.recent_dissatisfaction, 0.0);
    }

    #[test]
    fn test_feature_names_match_values() {
        let deriver = FeatureDeriver::new();
        assert_eq!(deriver.feature_count(), 6);
        assert_eq!(deriver.feature_names()[5], "rf_score");
    }
}
