//! Customer dataset loading, type coercion and partitioning using Polars

use crate::error::{ChurnError, Result};
use ndarray::Array1;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

pub const CUSTOMER_ID: &str = "CustomerID";
pub const CHURN: &str = "Churn";

/// Choices offered by the single-customer simulation form
pub const ORDER_CATEGORY_OPTIONS: [&str; 6] = [
    "Laptop & Accessory",
    "Mobile",
    "Mobile Phone",
    "Others",
    "Fashion",
    "Grocery",
];
pub const PAYMENT_MODE_OPTIONS: [&str; 7] = [
    "Debit Card",
    "UPI",
    "CC",
    "Cash on Delivery",
    "E wallet",
    "COD",
    "Credit Card",
];
pub const LOGIN_DEVICE_OPTIONS: [&str; 3] = ["Computer", "Phone", "Mobile Phone"];

/// Numeric customer attributes, in dataset column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericAttribute {
    Tenure,
    WarehouseToHome,
    HourSpendOnApp,
    DeviceCount,
    SatisfactionScore,
    AddressCount,
    OrderAmountHike,
    OrderCount,
    DaySinceLastOrder,
    CashbackAmount,
}

impl NumericAttribute {
    pub const ALL: [NumericAttribute; 10] = [
        NumericAttribute::Tenure,
        NumericAttribute::WarehouseToHome,
        NumericAttribute::HourSpendOnApp,
        NumericAttribute::DeviceCount,
        NumericAttribute::SatisfactionScore,
        NumericAttribute::AddressCount,
        NumericAttribute::OrderAmountHike,
        NumericAttribute::OrderCount,
        NumericAttribute::DaySinceLastOrder,
        NumericAttribute::CashbackAmount,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            NumericAttribute::Tenure => "Tenure",
            NumericAttribute::WarehouseToHome => "WarehouseToHome",
            NumericAttribute::HourSpendOnApp => "HourSpendOnApp",
            NumericAttribute::DeviceCount => "NumberOfDeviceRegistered",
            NumericAttribute::SatisfactionScore => "SatisfactionScore",
            NumericAttribute::AddressCount => "NumberOfAddress",
            NumericAttribute::OrderAmountHike => "OrderAmountHikeFromlastYear",
            NumericAttribute::OrderCount => "OrderCount",
            NumericAttribute::DaySinceLastOrder => "DaySinceLastOrder",
            NumericAttribute::CashbackAmount => "CashbackAmount",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.column_name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Nominal attributes expanded into indicator columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalAttribute {
    PreferredLoginDevice,
    CityTier,
    PreferredPaymentMode,
    PreferredOrderCategory,
    Complain,
}

impl CategoricalAttribute {
    pub const ALL: [CategoricalAttribute; 5] = [
        CategoricalAttribute::PreferredLoginDevice,
        CategoricalAttribute::CityTier,
        CategoricalAttribute::PreferredPaymentMode,
        CategoricalAttribute::PreferredOrderCategory,
        CategoricalAttribute::Complain,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            CategoricalAttribute::PreferredLoginDevice => "PreferredLoginDevice",
            CategoricalAttribute::CityTier => "CityTier",
            CategoricalAttribute::PreferredPaymentMode => "PreferredPaymentMode",
            CategoricalAttribute::PreferredOrderCategory => "PreferedOrderCat",
            CategoricalAttribute::Complain => "Complain",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.column_name() == name)
    }
}

/// City tier: 1 = large capitals, 2 = mid-size cities, 3 = small towns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CityTier {
    One,
    Two,
    Three,
}

impl CityTier {
    pub fn from_level(level: i64) -> Result<Self> {
        match level {
            1 => Ok(CityTier::One),
            2 => Ok(CityTier::Two),
            3 => Ok(CityTier::Three),
            other => Err(ChurnError::Schema(format!(
                "{} must be one of 1, 2, 3 (got {})",
                CategoricalAttribute::CityTier.column_name(),
                other
            ))),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            CityTier::One => 1,
            CityTier::Two => 2,
            CityTier::Three => 3,
        }
    }
}

impl fmt::Display for CityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Numeric attribute values indexed by [`NumericAttribute`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericValues<T>([T; 10]);

impl<T: Copy> NumericValues<T> {
    pub fn filled(value: T) -> Self {
        Self([value; 10])
    }

    pub fn get(&self, attr: NumericAttribute) -> T {
        self.0[attr.index()]
    }

    pub fn set(&mut self, attr: NumericAttribute, value: T) {
        self.0[attr.index()] = value;
    }
}

/// Nominal and flag attributes of a customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerTraits {
    pub complained: bool,
    pub preferred_order_category: String,
    pub preferred_payment_mode: String,
    pub preferred_login_device: String,
    pub city_tier: CityTier,
}

impl CustomerTraits {
    /// Category label used in indicator column names
    pub fn category(&self, attr: CategoricalAttribute) -> String {
        match attr {
            CategoricalAttribute::PreferredLoginDevice => self.preferred_login_device.clone(),
            CategoricalAttribute::CityTier => self.city_tier.to_string(),
            CategoricalAttribute::PreferredPaymentMode => self.preferred_payment_mode.clone(),
            CategoricalAttribute::PreferredOrderCategory => self.preferred_order_category.clone(),
            CategoricalAttribute::Complain => {
                let label = if self.complained { "True" } else { "False" };
                label.to_string()
            }
        }
    }
}

/// One dataset row after type coercion; numeric values may still be missing
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: i64,
    pub numerics: NumericValues<Option<f64>>,
    pub traits: CustomerTraits,
    /// Churn label, absent for customers being scored
    pub churned: Option<bool>,
}

impl CustomerRecord {
    pub fn numeric(&self, attr: NumericAttribute) -> Option<f64> {
        self.numerics.get(attr)
    }
}

/// A customer whose numeric attributes are all present
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: i64,
    pub numerics: NumericValues<f64>,
    pub traits: CustomerTraits,
}

impl CustomerProfile {
    pub fn numeric(&self, attr: NumericAttribute) -> f64 {
        self.numerics.get(attr)
    }
}

/// Load every customer row from a CSV file
pub fn load_customers<P: AsRef<Path>>(path: P) -> Result<Vec<CustomerRecord>> {
    let df = read_csv(path.as_ref())?;
    let records = records_from_frame(&df)?;
    info!(path = %path.as_ref().display(), customers = records.len(), "Customer dataset loaded");
    Ok(records)
}

/// Load only active customers (churn = 0); a file without a churn column is all active
pub fn load_active_customers<P: AsRef<Path>>(path: P) -> Result<Vec<CustomerRecord>> {
    let df = read_csv(path.as_ref())?;
    let has_churn = df.get_column_names().iter().any(|name| *name == CHURN);

    let df = if has_churn {
        df.lazy().filter(col(CHURN).eq(lit(0))).collect()?
    } else {
        df
    };

    let records = records_from_frame(&df)?;
    info!(path = %path.as_ref().display(), customers = records.len(), "Active customers loaded");
    Ok(records)
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(ChurnError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dataset not found: {}", path.display()),
        )));
    }

    let df = CsvReader::from_path(path)?.has_header(true).finish()?;
    if df.height() == 0 {
        return Err(ChurnError::Data(format!("{} contains no rows", path.display())));
    }
    Ok(df)
}

/// Coerce a raw frame into typed records; any malformed row fails the whole batch
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<CustomerRecord>> {
    let ids = int_column(df, CUSTOMER_ID)?;

    let mut numeric_columns = Vec::with_capacity(NumericAttribute::ALL.len());
    for attr in NumericAttribute::ALL {
        numeric_columns.push(float_column(df, attr.column_name())?);
    }

    let complain = float_column(df, CategoricalAttribute::Complain.column_name())?;
    let city_tier = int_column(df, CategoricalAttribute::CityTier.column_name())?;
    let order_category = string_column(df, CategoricalAttribute::PreferredOrderCategory.column_name())?;
    let payment_mode = string_column(df, CategoricalAttribute::PreferredPaymentMode.column_name())?;
    let login_device = string_column(df, CategoricalAttribute::PreferredLoginDevice.column_name())?;

    let churn = if df.get_column_names().iter().any(|name| *name == CHURN) {
        Some(int_column(df, CHURN)?)
    } else {
        None
    };

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let customer_id = ids[row]
            .ok_or_else(|| ChurnError::Schema(format!("row {} has no {}", row, CUSTOMER_ID)))?;

        let mut numerics = NumericValues::filled(None);
        for (attr, column) in NumericAttribute::ALL.into_iter().zip(&numeric_columns) {
            numerics.set(attr, column[row]);
        }

        let complained = complain[row].ok_or_else(|| missing_attribute(customer_id, "Complain"))? != 0.0;
        let level = city_tier[row].ok_or_else(|| missing_attribute(customer_id, "CityTier"))?;

        let traits = CustomerTraits {
            complained,
            preferred_order_category: required(&order_category[row], customer_id, "PreferedOrderCat")?,
            preferred_payment_mode: required(&payment_mode[row], customer_id, "PreferredPaymentMode")?,
            preferred_login_device: required(&login_device[row], customer_id, "PreferredLoginDevice")?,
            city_tier: CityTier::from_level(level)?,
        };

        records.push(CustomerRecord {
            customer_id,
            numerics,
            traits,
            churned: churn.as_ref().and_then(|values| values[row]).map(|v| v != 0),
        });
    }

    debug!(rows = records.len(), "Coerced customer rows");
    Ok(records)
}

fn missing_attribute(customer_id: i64, column: &str) -> ChurnError {
    ChurnError::Schema(format!("customer {} has no value for {}", customer_id, column))
}

fn required(value: &Option<String>, customer_id: i64, column: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => Err(missing_attribute(customer_id, column)),
    }
}

fn required_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map_err(|_| ChurnError::Schema(format!("missing expected column '{}'", name)))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = required_column(df, name)?.cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = required_column(df, name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = required_column(df, name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()))
        .collect();
    Ok(values)
}

/// Churn labels as 0/1 class ids; every record must be labelled
pub fn labels_of(records: &[CustomerRecord]) -> Result<Array1<usize>> {
    records
        .iter()
        .map(|record| {
            record.churned.map(usize::from).ok_or_else(|| {
                ChurnError::Schema(format!("customer {} has no {} label", record.customer_id, CHURN))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from)
}

/// Share of churners among labelled records
pub fn churn_rate(records: &[CustomerRecord]) -> f64 {
    let labelled: Vec<bool> = records.iter().filter_map(|r| r.churned).collect();
    if labelled.is_empty() {
        return 0.0;
    }
    labelled.iter().filter(|&&c| c).count() as f64 / labelled.len() as f64
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Customers split on tenure, the temporal proxy
#[derive(Debug, Clone)]
pub struct TemporalSplit {
    /// Customers with tenure above the cutoff
    pub in_time: Vec<CustomerRecord>,
    /// Customers with tenure at or below the cutoff, held out for validation
    pub out_of_time: Vec<CustomerRecord>,
    pub cutoff: f64,
    /// Records without tenure, placed in neither partition
    pub unplaced: usize,
}

/// Hold out the most recent customers (lowest tenure quantile) as the OOT partition
pub fn split_out_of_time(records: Vec<CustomerRecord>, tenure_quantile: f64) -> Result<TemporalSplit> {
    let tenures: Vec<f64> = records
        .iter()
        .filter_map(|r| r.numeric(NumericAttribute::Tenure))
        .collect();

    let cutoff = quantile(&tenures, tenure_quantile).ok_or_else(|| {
        ChurnError::Computation("tenure quantile undefined: no customer has a tenure".to_string())
    })?;

    let mut in_time = Vec::new();
    let mut out_of_time = Vec::new();
    let mut unplaced = 0;

    for record in records {
        match record.numeric(NumericAttribute::Tenure) {
            Some(tenure) if tenure <= cutoff => out_of_time.push(record),
            Some(_) => in_time.push(record),
            None => unplaced += 1,
        }
    }

    info!(
        cutoff,
        in_time = in_time.len(),
        out_of_time = out_of_time.len(),
        unplaced,
        "Temporal split on tenure"
    );

    Ok(TemporalSplit {
        in_time,
        out_of_time,
        cutoff,
        unplaced,
    })
}

/// Train/test partitions of the in-time customers
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Vec<CustomerRecord>,
    pub test: Vec<CustomerRecord>,
}

/// Stratified split keeping the churn rate equal between train and test
pub fn stratified_split(records: Vec<CustomerRecord>, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(0.0 < test_fraction && test_fraction < 1.0) {
        return Err(ChurnError::Config(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let labels = labels_of(&records)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_rows = HashSet::new();

    for class in [0usize, 1] {
        let mut rows: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(row, _)| row)
            .collect();
        rows.shuffle(&mut rng);
        let n_test = (rows.len() as f64 * test_fraction).round() as usize;
        test_rows.extend(rows.into_iter().take(n_test));
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (row, record) in records.into_iter().enumerate() {
        if test_rows.contains(&row) {
            test.push(record);
        } else {
            train.push(record);
        }
    }

    if train.is_empty() || test.is_empty() {
        return Err(ChurnError::Computation(format!(
            "stratified split produced an empty partition (train {}, test {})",
            train.len(),
            test.len()
        )));
    }

    Ok(TrainTestSplit { train, test })
}
