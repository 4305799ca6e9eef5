//! Median imputation of missing numeric attributes

use crate::data::{CustomerProfile, CustomerRecord, NumericAttribute, NumericValues};
use crate::error::{ChurnError, Result};
use tracing::debug;

/// Per-attribute medians learned on a reference set of customers
#[derive(Debug, Clone, PartialEq)]
pub struct MedianImputer {
    medians: NumericValues<f64>,
}

impl MedianImputer {
    /// Learn the median of every numeric attribute.
    ///
    /// Fails with `MissingValue` when an attribute has no observed value.
    pub fn fit(records: &[CustomerRecord]) -> Result<Self> {
        let mut medians = NumericValues::filled(0.0);

        for attr in NumericAttribute::ALL {
            let observed: Vec<f64> = records.iter().filter_map(|r| r.numeric(attr)).collect();
            let value = median(&observed).ok_or_else(|| ChurnError::MissingValue {
                column: attr.column_name().to_string(),
                reason: format!("has no observed values among {} records", records.len()),
            })?;
            medians.set(attr, value);
        }

        Ok(Self { medians })
    }

    pub fn median(&self, attr: NumericAttribute) -> f64 {
        self.medians.get(attr)
    }

    /// Fill missing values with the learned medians
    pub fn transform(&self, record: &CustomerRecord) -> CustomerProfile {
        let mut numerics = NumericValues::filled(0.0);
        for attr in NumericAttribute::ALL {
            numerics.set(attr, record.numeric(attr).unwrap_or_else(|| self.medians.get(attr)));
        }

        CustomerProfile {
            customer_id: record.customer_id,
            numerics,
            traits: record.traits.clone(),
        }
    }

    pub fn transform_all(&self, records: &[CustomerRecord]) -> Vec<CustomerProfile> {
        for attr in NumericAttribute::ALL {
            let filled = records.iter().filter(|r| r.numeric(attr).is_none()).count();
            if filled > 0 {
                debug!(column = attr.column_name(), filled, median = self.median(attr), "Imputed missing values");
            }
        }
        records.iter().map(|record| self.transform(record)).collect()
    }

    /// Column name and median pairs, for logging
    pub fn medians(&self) -> Vec<(&'static str, f64)> {
        NumericAttribute::ALL
            .into_iter()
            .map(|attr| (attr.column_name(), self.medians.get(attr)))
            .collect()
    }
}

/// Median with the midpoint of the two central values for even counts
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
