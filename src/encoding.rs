//! Categorical expansion, feature frames and the versioned column template.
//!
//! A [`FeatureFrame`] is a dense matrix with named columns. The
//! [`CategoricalEncoder`] produces one from customer profiles: raw numerics,
//! derived features, then one indicator column per observed category named
//! `<attribute>_<value>`. A [`FeatureTemplate`] pins the exact column list a
//! fitted pipeline expects; frames built from new data are aligned onto it.

use crate::data::{CategoricalAttribute, CustomerProfile, NumericAttribute};
use crate::error::{ChurnError, Result};
use crate::features::{FeatureDeriver, DERIVED_FEATURE_NAMES};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Current template contract version
pub const TEMPLATE_VERSION: u32 = 1;

/// Named columns over a dense `f64` matrix, one row per customer
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub customer_ids: Vec<i64>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureFrame {
    pub fn new(customer_ids: Vec<i64>, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != customer_ids.len() || values.ncols() != columns.len() {
            return Err(ChurnError::Computation(format!(
                "frame shape {:?} does not match {} ids and {} columns",
                values.shape(),
                customer_ids.len(),
                columns.len()
            )));
        }
        Ok(Self {
            customer_ids,
            columns,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|idx| self.values.column(idx))
    }

    /// Keep the named columns in the given order; every name must exist
    pub fn select(&self, names: &[String]) -> Result<FeatureFrame> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ChurnError::Schema(format!("frame has no column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureFrame {
            customer_ids: self.customer_ids.clone(),
            columns: names.to_vec(),
            values: self.values.select(Axis(1), &indices),
        })
    }

    /// Reindex onto the template columns: missing ones become 0, extras are dropped
    pub fn align_to(&self, template: &FeatureTemplate) -> FeatureFrame {
        let positions: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        let mut values = Array2::zeros((self.nrows(), template.len()));
        let mut filled = Vec::new();
        for (target, column) in template.columns.iter().enumerate() {
            match positions.get(column.name.as_str()) {
                Some(&source) => values.column_mut(target).assign(&self.values.column(source)),
                None => filled.push(column.name.as_str()),
            }
        }

        let kept: HashSet<&str> = template.columns.iter().map(|c| c.name.as_str()).collect();
        let dropped = self.columns.iter().filter(|c| !kept.contains(c.as_str())).count();
        debug!(zero_filled = ?filled, dropped, "Aligned frame onto template");

        FeatureFrame {
            customer_ids: self.customer_ids.clone(),
            columns: template.names(),
            values,
        }
    }
}

/// Role of a column in the template contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Derived,
    Indicator,
}

impl ColumnKind {
    pub fn is_continuous(self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Derived)
    }
}

/// Infer a column's kind from its name
pub fn classify_column(name: &str) -> Option<ColumnKind> {
    if NumericAttribute::from_column_name(name).is_some() {
        return Some(ColumnKind::Numeric);
    }
    if DERIVED_FEATURE_NAMES.contains(&name) {
        return Some(ColumnKind::Derived);
    }
    split_indicator(name).map(|_| ColumnKind::Indicator)
}

/// Split `<attribute>_<value>` into its parts when the attribute is categorical
fn split_indicator(name: &str) -> Option<(CategoricalAttribute, &str)> {
    let (attribute, value) = name.split_once('_')?;
    let attribute = CategoricalAttribute::from_column_name(attribute)?;
    (!value.is_empty()).then_some((attribute, value))
}

fn indicator_name(attr: CategoricalAttribute, value: &str) -> String {
    format!("{}_{}", attr.column_name(), value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Versioned column contract between a fitted pipeline and its inputs.
///
/// `vocabulary` lists every category observed at training time, including
/// those whose indicator columns were not selected, so unseen categories can
/// be told apart from unselected ones at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTemplate {
    pub version: u32,
    pub columns: Vec<TemplateColumn>,
    pub vocabulary: BTreeMap<String, Vec<String>>,
}

impl FeatureTemplate {
    /// Build the template describing a freshly encoded training frame
    pub fn from_frame(frame: &FeatureFrame) -> Result<Self> {
        let mut vocabulary: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut columns = Vec::with_capacity(frame.ncols());

        for name in &frame.columns {
            let kind = classify_column(name)
                .ok_or_else(|| ChurnError::Schema(format!("unrecognised feature column '{}'", name)))?;
            if let Some((attr, value)) = split_indicator(name) {
                vocabulary
                    .entry(attr.column_name().to_string())
                    .or_default()
                    .push(value.to_string());
            }
            columns.push(TemplateColumn {
                name: name.clone(),
                kind,
            });
        }

        let template = Self {
            version: TEMPLATE_VERSION,
            columns,
            vocabulary,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Restrict the template to `names`, in that order, keeping the vocabulary
    pub fn select(&self, names: &[String]) -> Result<FeatureTemplate> {
        let columns = names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .ok_or_else(|| ChurnError::Schema(format!("template has no column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureTemplate {
            version: self.version,
            columns,
            vocabulary: self.vocabulary.clone(),
        })
    }

    /// Check version, uniqueness and that every column kind matches its name
    pub fn validate(&self) -> Result<()> {
        if self.version != TEMPLATE_VERSION {
            return Err(ChurnError::Schema(format!(
                "template version {} is not supported (expected {})",
                self.version, TEMPLATE_VERSION
            )));
        }
        if self.columns.is_empty() {
            return Err(ChurnError::Schema("template has no columns".to_string()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ChurnError::Schema(format!("duplicate template column '{}'", column.name)));
            }
            if classify_column(&column.name) != Some(column.kind) {
                return Err(ChurnError::Schema(format!(
                    "template column '{}' is not of kind {:?}",
                    column.name, column.kind
                )));
            }
        }
        Ok(())
    }

    /// Indicator names for categories absent from the training vocabulary
    pub fn unseen_categories(&self, profiles: &[CustomerProfile]) -> Vec<String> {
        let mut unseen = BTreeSet::new();
        for profile in profiles {
            for attr in CategoricalAttribute::ALL {
                let value = profile.traits.category(attr);
                let known = self
                    .vocabulary
                    .get(attr.column_name())
                    .map_or(false, |values| values.contains(&value));
                if !known {
                    unseen.insert(indicator_name(attr, &value));
                }
            }
        }
        unseen.into_iter().collect()
    }

    /// Encode profiles and align them onto this template, warning about unseen categories
    pub fn encode_aligned(&self, profiles: &[CustomerProfile]) -> Result<FeatureFrame> {
        let unseen = self.unseen_categories(profiles);
        if !unseen.is_empty() {
            warn!(columns = ?unseen, "Categories not seen during training are scored as all-zero indicators");
        }
        let frame = CategoricalEncoder::new().encode(profiles)?;
        Ok(frame.align_to(self))
    }
}

/// Builds the full feature frame: raw numerics, derived features, indicators
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoricalEncoder {
    deriver: FeatureDeriver,
}

impl CategoricalEncoder {
    pub fn new() -> Self {
        Self {
            deriver: FeatureDeriver::new(),
        }
    }

    /// Encode profiles; indicator columns cover only the categories present in `profiles`
    pub fn encode(&self, profiles: &[CustomerProfile]) -> Result<FeatureFrame> {
        let mut columns: Vec<String> = NumericAttribute::ALL
            .iter()
            .map(|attr| attr.column_name().to_string())
            .collect();
        columns.extend(DERIVED_FEATURE_NAMES.iter().map(|name| name.to_string()));
        let dense_width = columns.len();

        let mut indicator_index = HashMap::new();
        for attr in CategoricalAttribute::ALL {
            let categories: BTreeSet<String> = profiles.iter().map(|p| p.traits.category(attr)).collect();
            for value in categories {
                let name = indicator_name(attr, &value);
                indicator_index.insert(name.clone(), columns.len());
                columns.push(name);
            }
        }

        let mut values = Array2::zeros((profiles.len(), columns.len()));
        for (row, profile) in profiles.iter().enumerate() {
            let mut cells = values.row_mut(row);
            for (col, attr) in NumericAttribute::ALL.iter().enumerate() {
                cells[col] = profile.numeric(*attr);
            }
            let derived = self.deriver.derive(profile).values();
            for (offset, value) in derived.iter().enumerate() {
                cells[NumericAttribute::ALL.len() + offset] = *value;
            }
            for attr in CategoricalAttribute::ALL {
                let name = indicator_name(attr, &profile.traits.category(attr));
                if let Some(&col) = indicator_index.get(&name) {
                    cells[col] = 1.0;
                }
            }
        }

        debug!(
            rows = profiles.len(),
            dense = dense_width,
            indicators = columns.len() - dense_width,
            "Encoded customer profiles"
        );

        FeatureFrame::new(profiles.iter().map(|p| p.customer_id).collect(), columns, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CityTier, CustomerTraits, NumericValues};

    fn profile(id: i64, device: &str, tier: CityTier, complained: bool) -> CustomerProfile {
        CustomerProfile {
            customer_id: id,
            numerics: NumericValues::filled(2.0),
            traits: CustomerTraits {
                complained,
                preferred_order_category: "Mobile Phone".to_string(),
                preferred_payment_mode: "Debit Card".to_string(),
                preferred_login_device: device.to_string(),
                city_tier: tier,
            },
        }
    }

    #[test]
    fn test_encode_column_layout() {
        let profiles = vec![
            profile(1, "Phone", CityTier::Three, true),
            profile(2, "Computer", CityTier::One, false),
        ];
        let frame = CategoricalEncoder::new().encode(&profiles).unwrap();

        assert_eq!(frame.columns[0], "Tenure");
        assert_eq!(frame.columns[10], "distance_per_order");
        let indicators: Vec<&str> = frame.columns[16..].iter().map(|s| s.as_str()).collect();
        assert_eq!(
            indicators,
            vec![
                "PreferredLoginDevice_Computer",
                "PreferredLoginDevice_Phone",
                "CityTier_1",
                "CityTier_3",
                "PreferredPaymentMode_Debit Card",
                "PreferedOrderCat_Mobile Phone",
                "Complain_False",
                "Complain_True",
            ]
        );
        assert_eq!(frame.column("Complain_True").unwrap().to_vec(), vec![1.0, 0.0]);
        assert_eq!(frame.column("PreferredLoginDevice_Computer").unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_align_matches_template_for_any_categories() {
        let training = vec![
            profile(1, "Phone", CityTier::One, true),
            profile(2, "Computer", CityTier::Two, false),
        ];
        let train_frame = CategoricalEncoder::new().encode(&training).unwrap();
        let template = FeatureTemplate::from_frame(&train_frame).unwrap();

        let batches = vec![
            vec![profile(3, "Phone", CityTier::One, true)],
            vec![profile(4, "Mobile Phone", CityTier::Three, false)],
            training.clone(),
        ];
        for batch in batches {
            let aligned = template.encode_aligned(&batch).unwrap();
            assert_eq!(aligned.columns, template.names());
            assert_eq!(aligned.nrows(), batch.len());
        }
    }

    #[test]
    fn test_align_zero_fills_missing_indicators() {
        let training = vec![
            profile(1, "Phone", CityTier::One, true),
            profile(2, "Computer", CityTier::Two, false),
        ];
        let template = FeatureTemplate::from_frame(&CategoricalEncoder::new().encode(&training).unwrap()).unwrap();

        let aligned = template
            .encode_aligned(&[profile(5, "Mobile Phone", CityTier::Three, false)])
            .unwrap();
        assert_eq!(aligned.column("PreferredLoginDevice_Phone").unwrap()[0], 0.0);
        assert_eq!(aligned.column("PreferredLoginDevice_Computer").unwrap()[0], 0.0);
        assert_eq!(aligned.column("Complain_False").unwrap()[0], 1.0);
        assert!(aligned.column("CityTier_3").is_none());
    }

    #[test]
    fn test_unseen_categories_reported() {
        let template = FeatureTemplate::from_frame(
            &CategoricalEncoder::new()
                .encode(&[profile(1, "Phone", CityTier::One, false)])
                .unwrap(),
        )
        .unwrap();

        let unseen = template.unseen_categories(&[profile(2, "Computer", CityTier::One, true)]);
        assert_eq!(unseen, vec!["Complain_True", "PreferredLoginDevice_Computer"]);
    }

    #[test]
    fn test_classify_column() {
        assert_eq!(classify_column("Tenure"), Some(ColumnKind::Numeric));
        assert_eq!(classify_column("rf_score"), Some(ColumnKind::Derived));
        assert_eq!(classify_column("PreferedOrderCat_Laptop & Accessory"), Some(ColumnKind::Indicator));
        assert_eq!(classify_column("Gender_Male"), None);
        assert_eq!(classify_column("CityTier_"), None);
    }

    #[test]
    fn test_template_validate_rejects_wrong_kind() {
        let mut template = FeatureTemplate::from_frame(
            &CategoricalEncoder::new()
                .encode(&[profile(1, "Phone", CityTier::One, false)])
                .unwrap(),
        )
        .unwrap();
        template.columns[0].kind = ColumnKind::Indicator;
        assert!(matches!(template.validate(), Err(ChurnError::Schema(_))));

        template.columns[0].kind = ColumnKind::Numeric;
        template.version = 99;
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_select_keeps_order() {
        let frame = CategoricalEncoder::new()
            .encode(&[profile(1, "Phone", CityTier::One, false)])
            .unwrap();
        let names = vec!["rf_score".to_string(), "Tenure".to_string()];
        let selected = frame.select(&names).unwrap();
        assert_eq!(selected.columns, names);
        assert_eq!(selected.ncols(), 2);
        assert!(frame.select(&["nope".to_string()]).is_err());
    }
}
