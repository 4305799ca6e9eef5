//! Descriptive profile of the training partition: missing values, numeric
//! statistics by churn class and churn shares per category.
//!
//! `diff_rel` compares the two churn classes. For numerics it is the retained
//! statistic over the churned one; for categories the churned share over the
//! retained share.

use crate::data::{CategoricalAttribute, CustomerRecord, NumericAttribute};
use crate::impute::median;
use std::collections::BTreeMap;
use std::fmt;

/// Missing numeric values in one column
#[derive(Debug, Clone, PartialEq)]
pub struct MissingCount {
    pub column: &'static str,
    pub count: usize,
    /// Percentage of rows, 0-100
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Median,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Mean => write!(f, "mean"),
            Statistic::Median => write!(f, "median"),
        }
    }
}

/// One statistic of a numeric column for retained and churned customers
#[derive(Debug, Clone, PartialEq)]
pub struct NumericClassSummary {
    pub column: &'static str,
    pub statistic: Statistic,
    pub retained: f64,
    pub churned: f64,
    pub diff_rel: f64,
}

/// Churn split of the customers sharing one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryChurnShare {
    pub attribute: CategoricalAttribute,
    pub category: String,
    pub customers: usize,
    pub churned_percent: f64,
    pub retained_percent: f64,
    pub diff_rel: f64,
}

/// Descriptive statistics of a labelled partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataProfile {
    pub rows: usize,
    /// Columns with at least one missing value, most incomplete first
    pub missing: Vec<MissingCount>,
    /// Sorted by `diff_rel`, largest first
    pub numeric: Vec<NumericClassSummary>,
    /// Grouped by attribute, each group sorted by `diff_rel`, largest first
    pub categories: Vec<CategoryChurnShare>,
}

impl DataProfile {
    /// Profile labelled records; unlabelled ones only count towards missing values
    pub fn from_records(records: &[CustomerRecord]) -> Self {
        Self {
            rows: records.len(),
            missing: missing_counts(records),
            numeric: numeric_summaries(records),
            categories: category_shares(records),
        }
    }

    pub fn categories_of(&self, attribute: CategoricalAttribute) -> impl Iterator<Item = &CategoryChurnShare> {
        self.categories.iter().filter(move |share| share.attribute == attribute)
    }
}

fn missing_counts(records: &[CustomerRecord]) -> Vec<MissingCount> {
    if records.is_empty() {
        return Vec::new();
    }

    let mut missing: Vec<MissingCount> = NumericAttribute::ALL
        .into_iter()
        .map(|attr| {
            let count = records.iter().filter(|r| r.numeric(attr).is_none()).count();
            MissingCount {
                column: attr.column_name(),
                count,
                percent: count as f64 * 100.0 / records.len() as f64,
            }
        })
        .filter(|m| m.count > 0)
        .collect();
    missing.sort_by(|a, b| b.count.cmp(&a.count));
    missing
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn numeric_summaries(records: &[CustomerRecord]) -> Vec<NumericClassSummary> {
    let mut summaries = Vec::with_capacity(NumericAttribute::ALL.len() * 2);
    for attr in NumericAttribute::ALL {
        let observed = |churned: bool| -> Vec<f64> {
            records
                .iter()
                .filter(|r| r.churned == Some(churned))
                .filter_map(|r| r.numeric(attr))
                .collect()
        };
        let retained = observed(false);
        let churned = observed(true);

        for (statistic, retained, churned) in [
            (Statistic::Mean, mean(&retained), mean(&churned)),
            (
                Statistic::Median,
                median(&retained).unwrap_or(f64::NAN),
                median(&churned).unwrap_or(f64::NAN),
            ),
        ] {
            summaries.push(NumericClassSummary {
                column: attr.column_name(),
                statistic,
                retained,
                churned,
                diff_rel: retained / churned,
            });
        }
    }
    summaries.sort_by(|a, b| b.diff_rel.total_cmp(&a.diff_rel));
    summaries
}

fn category_shares(records: &[CustomerRecord]) -> Vec<CategoryChurnShare> {
    let mut shares = Vec::new();
    for attribute in CategoricalAttribute::ALL {
        // category -> (customers, churned)
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for record in records {
            if let Some(churned) = record.churned {
                let entry = counts.entry(record.traits.category(attribute)).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += usize::from(churned);
            }
        }

        let mut group: Vec<CategoryChurnShare> = counts
            .into_iter()
            .map(|(category, (customers, churned))| {
                let churned_percent = churned as f64 * 100.0 / customers as f64;
                let retained_percent = 100.0 - churned_percent;
                CategoryChurnShare {
                    attribute,
                    category,
                    customers,
                    churned_percent,
                    retained_percent,
                    diff_rel: churned_percent / retained_percent,
                }
            })
            .collect();
        group.sort_by(|a, b| b.diff_rel.total_cmp(&a.diff_rel));
        shares.extend(group);
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CityTier, CustomerTraits, NumericValues};

    fn record(id: i64, tenure: Option<f64>, complained: bool, churned: bool) -> CustomerRecord {
        let mut numerics = NumericValues::filled(Some(1.0));
        numerics.set(NumericAttribute::Tenure, tenure);
        CustomerRecord {
            customer_id: id,
            numerics,
            traits: CustomerTraits {
                complained,
                preferred_order_category: "Mobile".to_string(),
                preferred_payment_mode: "UPI".to_string(),
                preferred_login_device: "Phone".to_string(),
                city_tier: CityTier::One,
            },
            churned: Some(churned),
        }
    }

    fn sample() -> Vec<CustomerRecord> {
        vec![
            record(1, Some(10.0), false, false),
            record(2, Some(20.0), false, false),
            record(3, None, true, false),
            record(4, Some(2.0), true, true),
            record(5, Some(4.0), false, true),
        ]
    }

    #[test]
    fn test_missing_counts() {
        let profile = DataProfile::from_records(&sample());
        assert_eq!(profile.rows, 5);
        assert_eq!(
            profile.missing,
            vec![MissingCount {
                column: "Tenure",
                count: 1,
                percent: 20.0
            }]
        );
    }

    #[test]
    fn test_numeric_summary_by_class() {
        let profile = DataProfile::from_records(&sample());
        let tenure_mean = profile
            .numeric
            .iter()
            .find(|s| s.column == "Tenure" && s.statistic == Statistic::Mean)
            .unwrap();

        assert_eq!(tenure_mean.retained, 15.0);
        assert_eq!(tenure_mean.churned, 3.0);
        assert_eq!(tenure_mean.diff_rel, 5.0);
        assert_eq!(profile.numeric[0].column, "Tenure");
    }

    #[test]
    fn test_category_shares_sorted_by_diff_rel() {
        let profile = DataProfile::from_records(&sample());
        let complain: Vec<&CategoryChurnShare> = profile.categories_of(CategoricalAttribute::Complain).collect();

        assert_eq!(complain.len(), 2);
        assert_eq!(complain[0].category, "True");
        assert_eq!(complain[0].customers, 2);
        assert_eq!(complain[0].churned_percent, 50.0);
        assert_eq!(complain[0].diff_rel, 1.0);
        assert_eq!(complain[1].category, "False");
        assert!((complain[1].diff_rel - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_records() {
        let profile = DataProfile::from_records(&[]);
        assert!(profile.missing.is_empty());
        assert!(profile.categories.is_empty());
    }
}
