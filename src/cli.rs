//! Command-line interface definitions and argument parsing

use crate::data::{
    CityTier, CustomerProfile, CustomerTraits, NumericAttribute, NumericValues, LOGIN_DEVICE_OPTIONS,
    ORDER_CATEGORY_OPTIONS, PAYMENT_MODE_OPTIONS,
};
use crate::error::Result;
use crate::model::CandidateKind;
use clap::builder::PossibleValuesParser;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// E-commerce churn scoring: train the pipeline, score active customers, simulate one customer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train both candidates, report their metrics and persist one
    Train(TrainArgs),
    /// Score every active customer of the dataset
    Score(ScoreArgs),
    /// Score a single customer described on the command line
    Simulate(SimulateArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TrainArgs {
    /// Path to the training CSV (overrides the configuration)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write the model artifact (overrides the configuration)
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Candidate to persist
    #[arg(long, value_enum, default_value = "logistic")]
    pub persist: CandidateKind,

    /// Render the persisted candidate's ROC curves to this PNG
    #[arg(long)]
    pub roc_chart: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct ScoreArgs {
    /// Path to the customer CSV (overrides the configuration)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Model artifact to load (overrides the configuration)
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Print at most this many customers
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Customer attributes, bounded like the simulation form
#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    /// Model artifact to load (overrides the configuration)
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Months as a customer
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=60))]
    pub tenure: u32,

    /// Distance from warehouse to home
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=200))]
    pub warehouse_to_home: u32,

    /// Hours spent on the app
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=6))]
    pub hours_on_app: u32,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=6))]
    pub devices: u32,

    /// Satisfaction score from 1 to 5
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=5))]
    pub satisfaction: u32,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=22))]
    pub addresses: u32,

    /// Order value increase over last year, in percent
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub order_hike: u32,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=16))]
    pub orders: u32,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=200))]
    pub days_since_last_order: u32,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=400))]
    pub cashback: u32,

    /// The customer filed a complaint
    #[arg(long)]
    pub complained: bool,

    #[arg(long, default_value = "Laptop & Accessory", value_parser = PossibleValuesParser::new(ORDER_CATEGORY_OPTIONS))]
    pub order_category: String,

    #[arg(long, default_value = "Debit Card", value_parser = PossibleValuesParser::new(PAYMENT_MODE_OPTIONS))]
    pub payment_mode: String,

    #[arg(long, default_value = "Mobile Phone", value_parser = PossibleValuesParser::new(LOGIN_DEVICE_OPTIONS))]
    pub login_device: String,

    /// City tier: 1, 2 or 3
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(1..=3))]
    pub city_tier: i64,
}

impl SimulateArgs {
    /// Build the complete profile of the simulated customer
    pub fn to_profile(&self) -> Result<CustomerProfile> {
        let mut numerics = NumericValues::filled(0.0);
        for (attr, value) in [
            (NumericAttribute::Tenure, self.tenure),
            (NumericAttribute::WarehouseToHome, self.warehouse_to_home),
            (NumericAttribute::HourSpendOnApp, self.hours_on_app),
            (NumericAttribute::DeviceCount, self.devices),
            (NumericAttribute::SatisfactionScore, self.satisfaction),
            (NumericAttribute::AddressCount, self.addresses),
            (NumericAttribute::OrderAmountHike, self.order_hike),
            (NumericAttribute::OrderCount, self.orders),
            (NumericAttribute::DaySinceLastOrder, self.days_since_last_order),
            (NumericAttribute::CashbackAmount, self.cashback),
        ] {
            numerics.set(attr, f64::from(value));
        }

        Ok(CustomerProfile {
            customer_id: 0,
            numerics,
            traits: CustomerTraits {
                complained: self.complained,
                preferred_order_category: self.order_category.clone(),
                preferred_payment_mode: self.payment_mode.clone(),
                preferred_login_device: self.login_device.clone(),
                city_tier: CityTier::from_level(self.city_tier)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_defaults() {
        let args = Args::try_parse_from(["churnforge", "train"]).unwrap();
        match args.command {
            Command::Train(train) => {
                assert_eq!(train.persist, CandidateKind::Logistic);
                assert!(train.input.is_none());
                assert!(train.roc_chart.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_simulate_profile() {
        let args = Args::try_parse_from([
            "churnforge",
            "simulate",
            "--tenure",
            "3",
            "--orders",
            "2",
            "--complained",
            "--login-device",
            "Computer",
            "--city-tier",
            "3",
        ])
        .unwrap();

        let Command::Simulate(simulate) = args.command else {
            panic!("expected simulate");
        };
        let profile = simulate.to_profile().unwrap();
        assert_eq!(profile.numeric(NumericAttribute::Tenure), 3.0);
        assert_eq!(profile.numeric(NumericAttribute::OrderCount), 2.0);
        assert_eq!(profile.numeric(NumericAttribute::SatisfactionScore), 1.0);
        assert!(profile.traits.complained);
        assert_eq!(profile.traits.preferred_login_device, "Computer");
        assert_eq!(profile.traits.city_tier, CityTier::Three);
    }

    #[test]
    fn test_simulate_rejects_out_of_range_values() {
        assert!(Args::try_parse_from(["churnforge", "simulate", "--satisfaction", "6"]).is_err());
        assert!(Args::try_parse_from(["churnforge", "simulate", "--city-tier", "4"]).is_err());
        assert!(Args::try_parse_from(["churnforge", "simulate", "--payment-mode", "Barter"]).is_err());
    }

    #[test]
    fn test_score_with_global_config() {
        let args = Args::try_parse_from(["churnforge", "--config", "churn.toml", "score", "--limit", "5"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("churn.toml")));
        let Command::Score(score) = args.command else {
            panic!("expected score");
        };
        assert_eq!(score.limit, Some(5));
    }
}
