//! The offline training flow, from raw records to evaluated candidate pipelines

use crate::artifact::ModelArtifact;
use crate::config::TrainingConfig;
use crate::data::{churn_rate, labels_of, split_out_of_time, stratified_split, CustomerRecord};
use crate::encoding::{CategoricalEncoder, FeatureFrame, FeatureTemplate};
use crate::error::{ChurnError, Result};
use crate::impute::MedianImputer;
use crate::metrics::{EvaluationReport, Evaluator, Partition};
use crate::model::{CandidateKind, ChurnPipeline, ModelTrainer};
use crate::profile::DataProfile;
use crate::search::SearchOutcome;
use crate::selection::{FeatureImportance, FeatureSelector};
use ndarray::Array1;
use tracing::info;

/// Size and churn rate of one partition
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSummary {
    pub partition: Partition,
    pub customers: usize,
    pub churn_rate: f64,
}

/// Labelled features of one partition, aligned onto the selected template
#[derive(Debug, Clone)]
pub struct LabelledFrame {
    pub frame: FeatureFrame,
    pub labels: Array1<usize>,
}

/// Train, test and out-of-time frames restricted to the selected features
#[derive(Debug, Clone)]
pub struct PreparedPartitions {
    pub train: LabelledFrame,
    pub test: LabelledFrame,
    pub out_of_time: LabelledFrame,
    pub summaries: Vec<PartitionSummary>,
    pub oot_cutoff: f64,
    /// Descriptive statistics of the train partition before imputation
    pub profile: DataProfile,
    pub ranking: Vec<FeatureImportance>,
    pub template: FeatureTemplate,
}

/// Split, impute, derive, encode, align and select features
pub fn prepare_partitions(records: Vec<CustomerRecord>, config: &TrainingConfig) -> Result<PreparedPartitions> {
    let overall_rate = churn_rate(&records);
    let temporal = split_out_of_time(records, config.oot_quantile)?;
    let split = stratified_split(temporal.in_time, config.test_fraction, config.seed)?;
    let oot_records = temporal.out_of_time;
    if oot_records.is_empty() {
        return Err(ChurnError::Computation("out-of-time partition is empty".to_string()));
    }

    info!(
        overall = overall_rate,
        train = churn_rate(&split.train),
        test = churn_rate(&split.test),
        oot = churn_rate(&oot_records),
        "Churn rates by partition"
    );

    let summaries = vec![
        summarize(Partition::Train, &split.train),
        summarize(Partition::Test, &split.test),
        summarize(Partition::OutOfTime, &oot_records),
    ];

    let profile = DataProfile::from_records(&split.train);
    let imputer = MedianImputer::fit(&split.train)?;
    info!(medians = ?imputer.medians(), "Imputation medians learned on train");

    let encoder = CategoricalEncoder::new();
    let train_frame = encoder.encode(&imputer.transform_all(&split.train))?;
    let full_template = FeatureTemplate::from_frame(&train_frame)?;
    let test_frame = encoder.encode(&imputer.transform_all(&split.test))?.align_to(&full_template);
    let oot_frame = encoder.encode(&imputer.transform_all(&oot_records))?.align_to(&full_template);

    let train_labels = labels_of(&split.train)?;
    let selection = FeatureSelector::new(config.importance_threshold).select(&train_frame, &train_labels)?;
    let template = full_template.select(&selection.selected)?;

    Ok(PreparedPartitions {
        train: LabelledFrame {
            frame: train_frame.align_to(&template),
            labels: train_labels,
        },
        test: LabelledFrame {
            frame: test_frame.align_to(&template),
            labels: labels_of(&split.test)?,
        },
        out_of_time: LabelledFrame {
            frame: oot_frame.align_to(&template),
            labels: labels_of(&oot_records)?,
        },
        summaries,
        oot_cutoff: temporal.cutoff,
        profile,
        ranking: selection.ranking,
        template,
    })
}

fn summarize(partition: Partition, records: &[CustomerRecord]) -> PartitionSummary {
    PartitionSummary {
        partition,
        customers: records.len(),
        churn_rate: churn_rate(records),
    }
}

/// One tuned candidate with its evaluation
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub kind: CandidateKind,
    pub pipeline: ChurnPipeline,
    pub search: SearchOutcome,
    pub evaluation: EvaluationReport,
}

/// Everything the training flow produced
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub summaries: Vec<PartitionSummary>,
    pub oot_cutoff: f64,
    pub profile: DataProfile,
    pub ranking: Vec<FeatureImportance>,
    pub template: FeatureTemplate,
    pub candidates: Vec<CandidateReport>,
}

impl TrainingReport {
    pub fn candidate(&self, kind: CandidateKind) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.kind == kind)
    }

    /// Bundle the chosen candidate with the selected-feature template
    pub fn into_artifact(self, kind: CandidateKind) -> Result<ModelArtifact> {
        let template = self.template;
        let report = self
            .candidates
            .into_iter()
            .find(|c| c.kind == kind)
            .ok_or_else(|| ChurnError::Training(format!("no trained {} candidate", kind)))?;
        ModelArtifact::new(report.pipeline, template)
    }
}

/// Run the whole training flow and evaluate both candidates on every partition
pub fn run_training(records: Vec<CustomerRecord>, config: &TrainingConfig) -> Result<TrainingReport> {
    let prepared = prepare_partitions(records, config)?;
    let trainer = ModelTrainer::from_config(config);

    let mut candidates = Vec::new();
    for kind in [CandidateKind::Forest, CandidateKind::Logistic] {
        let trained = trainer.train(kind, &prepared.train.frame, &prepared.train.labels)?;

        let mut evaluation = EvaluationReport::default();
        for (partition, data) in [
            (Partition::Train, &prepared.train),
            (Partition::Test, &prepared.test),
            (Partition::OutOfTime, &prepared.out_of_time),
        ] {
            evaluation
                .partitions
                .push(Evaluator::evaluate(&trained.pipeline, partition, &data.frame, &data.labels)?);
        }

        candidates.push(CandidateReport {
            kind,
            pipeline: trained.pipeline,
            search: trained.search,
            evaluation,
        });
    }

    Ok(TrainingReport {
        summaries: prepared.summaries,
        oot_cutoff: prepared.oot_cutoff,
        profile: prepared.profile,
        ranking: prepared.ranking,
        template: prepared.template,
        candidates,
    })
}
