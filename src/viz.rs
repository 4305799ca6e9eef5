//! ROC chart rendering using Plotters

use crate::metrics::{EvaluationReport, Partition};
use plotters::prelude::*;
use std::path::Path;

/// Color per evaluated partition
fn partition_color(partition: Partition) -> RGBColor {
    match partition {
        Partition::Train => BLUE,
        Partition::Test => GREEN,
        Partition::OutOfTime => RED,
    }
}

/// Legend label and points of each partition's ROC curve
pub fn roc_series(report: &EvaluationReport) -> Vec<(Partition, String, Vec<(f64, f64)>)> {
    report
        .partitions
        .iter()
        .map(|metrics| {
            let label = format!("{} (AUC = {:.3})", metrics.partition, metrics.roc_auc);
            (metrics.partition, label, metrics.roc.points())
        })
        .collect()
}

/// Draw the train/test/OOT ROC curves and the chance diagonal
///
/// # Arguments
/// * `report` - Evaluation of one candidate
/// * `output_path` - Path to save the PNG chart
/// * `title` - Chart caption
pub fn create_roc_chart(report: &EvaluationReport, output_path: &Path, title: &str) -> anyhow::Result<()> {
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..1f64, 0f64..1f64)?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart
        .draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], BLACK.mix(0.4)))?
        .label("Chance")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.mix(0.4)));

    for (partition, label, points) in roc_series(report) {
        let color = partition_color(partition);
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
