//! Text and CSV renderings of a dose estimate.

use crate::error::{CliError, Result};
use rtipgen::core::physics::bragg::CompositeBraggCurve;
use rtipgen::core::spotmap::layers::DoseSummary;
use rtipgen::workflows::dose::DoseEstimate;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The four-line summary of the legacy stats file.
pub fn summary_lines(summary: &DoseSummary) -> [String; 4] {
    let energies = summary
        .unique_energies
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    [
        format!("Num Spots = {}", summary.spot_count),
        format!("Num Layers = {}", summary.layer_count),
        format!("Total Gp = {}", summary.total_weight),
        format!("Unique energies = [{}]", energies),
    ]
}

/// Human-readable summary printed by `estimate`.
pub fn render_estimate(estimate: &DoseEstimate) -> String {
    let mut out = String::new();
    for line in summary_lines(&estimate.aggregation.summary) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!(
        "Deposited energy = {:.6e} J\n",
        estimate.aggregation.summary.deposited_energy_joules
    ));
    if let Some((lo, hi)) = estimate.spot_map.bounds() {
        out.push_str(&format!(
            "Spot extent = x [{:.2}, {:.2}] mm, y [{:.2}, {:.2}] mm\n",
            lo.x, hi.x, lo.y, hi.y
        ));
    }
    if let Some((depth, dose)) = estimate.curve.peak() {
        out.push_str(&format!("Peak dose = {:.6} at {:.2} cm\n", dose, depth));
    }
    out.push_str(&format!(
        "Display depth = {:.2} cm\n",
        estimate.curve.display_max_depth()
    ));
    out
}

/// `<spotmap>.txt` next to the spot map, keeping the spot map's own extension.
pub fn report_path(spot_map: &Path) -> PathBuf {
    let mut name = spot_map.as_os_str().to_owned();
    name.push(".txt");
    PathBuf::from(name)
}

pub fn write_report(path: &Path, summary: &DoseSummary) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    for line in summary_lines(summary) {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

/// Writes depth, composite dose and one weighted column per layer.
///
/// Layer profiles can outlast the composite buffer; their full length is
/// written and the composite column is left empty past its end.
pub fn write_curve_csv(path: &Path, curve: &CompositeBraggCurve) -> Result<()> {
    let export_error = |e: csv::Error| CliError::Export {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(export_error)?;

    let layers = curve.layer_curves();
    let mut header = vec!["depth_cm".to_string(), "dose".to_string()];
    header.extend(
        layers
            .iter()
            .enumerate()
            .map(|(i, layer)| format!("layer_{}_{}MeV", i + 1, layer.energy)),
    );
    writer.write_record(&header).map_err(export_error)?;

    let rows = layers
        .iter()
        .map(|layer| layer.doses.len())
        .fold(curve.len(), usize::max);
    if rows > curve.len() {
        debug!(
            "Layer curves extend {} samples past the {}-sample composite.",
            rows - curve.len(),
            curve.len()
        );
    }

    for i in 0..rows {
        let depth = i as f64 * curve.step();
        let dose = curve
            .dose()
            .get(i)
            .map_or_else(String::new, |value| value.to_string());
        let mut record = vec![format!("{:.4}", depth), dose];
        record.extend(layers.iter().map(|layer| {
            layer
                .doses
                .get(i)
                .map_or_else(String::new, |value| value.to_string())
        }));
        writer.write_record(&record).map_err(export_error)?;
    }
    writer.flush()?;
    Ok(())
}
