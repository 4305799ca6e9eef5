//! Scoring customers and mapping churn probability to a retention action

use crate::data::{CustomerProfile, CustomerRecord};
use crate::encoding::FeatureTemplate;
use crate::error::{ChurnError, Result};
use crate::impute::MedianImputer;
use crate::model::ChurnModel;
use ndarray::Array1;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Retention action recommended for a churn probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecommendedAction {
    AggressiveCoupon,
    EnhancedCashback,
    RelatedProducts,
    Monitor,
}

impl RecommendedAction {
    /// Business rule over the integer percent
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            85.. => RecommendedAction::AggressiveCoupon,
            70..=84 => RecommendedAction::EnhancedCashback,
            30..=69 => RecommendedAction::RelatedProducts,
            _ => RecommendedAction::Monitor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecommendedAction::AggressiveCoupon => "Send aggressive coupon",
            RecommendedAction::EnhancedCashback => "Offer enhanced cashback",
            RecommendedAction::RelatedProducts => "Suggest related products",
            RecommendedAction::Monitor => "Monitor",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Risk tier shown for a simulated customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.20 {
            RiskLevel::Low
        } else if probability < 0.50 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low churn risk",
            RiskLevel::Moderate => "Moderate churn risk",
            RiskLevel::High => "High churn risk",
        }
    }

    /// Display colour as RGB: green, yellow, red
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            RiskLevel::Low => (46, 204, 113),
            RiskLevel::Moderate => (241, 196, 15),
            RiskLevel::High => (231, 76, 60),
        }
    }
}

/// Round a probability to an integer percent, ties to even
pub fn probability_percent(probability: f64) -> u8 {
    (probability * 100.0).round_ties_even().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCustomer {
    pub customer_id: i64,
    pub churn_probability: u8,
    pub action: RecommendedAction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationResult {
    pub probability: f64,
    pub risk: RiskLevel,
}

/// Applies the shared derive/encode/align path and a model to customers
pub struct InferenceRunner<'a, M: ChurnModel + ?Sized> {
    model: &'a M,
    template: &'a FeatureTemplate,
}

impl<'a, M: ChurnModel + ?Sized> InferenceRunner<'a, M> {
    pub fn new(model: &'a M, template: &'a FeatureTemplate) -> Self {
        Self { model, template }
    }

    /// Probabilities for complete profiles, in input order
    pub fn predict_profiles(&self, profiles: &[CustomerProfile]) -> Result<Array1<f64>> {
        let frame = self.template.encode_aligned(profiles)?;
        self.model.predict_proba(&frame)
    }

    /// Score a batch; missing numerics are filled with medians learned on the batch itself
    pub fn score_batch(&self, records: &[CustomerRecord]) -> Result<Vec<ScoredCustomer>> {
        if records.is_empty() {
            info!("No customers to score");
            return Ok(Vec::new());
        }

        let imputer = MedianImputer::fit(records)?;
        info!(medians = ?imputer.medians(), "Imputation medians learned on the scoring batch");
        let profiles = imputer.transform_all(records);

        let probabilities = self.predict_profiles(&profiles)?;
        if probabilities.len() != profiles.len() {
            return Err(ChurnError::Computation(format!(
                "model returned {} probabilities for {} customers",
                probabilities.len(),
                profiles.len()
            )));
        }
        let scored: Vec<ScoredCustomer> = profiles
            .iter()
            .zip(probabilities.iter())
            .map(|(profile, &p)| {
                let percent = probability_percent(p);
                ScoredCustomer {
                    customer_id: profile.customer_id,
                    churn_probability: percent,
                    action: RecommendedAction::from_percent(percent),
                }
            })
            .collect();

        info!(customers = scored.len(), "Batch scored");
        Ok(scored)
    }

    /// Score one operator-entered customer
    pub fn simulate(&self, profile: &CustomerProfile) -> Result<SimulationResult> {
        let probabilities = self.predict_profiles(std::slice::from_ref(profile))?;
        let probability = probabilities[0];
        Ok(SimulationResult {
            probability,
            risk: RiskLevel::from_probability(probability),
        })
    }
}
