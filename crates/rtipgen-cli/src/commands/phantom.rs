use crate::cli::PhantomArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use rtipgen::workflows::phantom::{self, PhantomSummary};

fn render(summary: &PhantomSummary) -> String {
    let iso = summary.isocenter;
    let mut out = format!(
        "Plan: {}\nIsocenter = ({}, {}, {}) mm\n",
        summary.plan_path.display(),
        iso.x,
        iso.y,
        iso.z
    );
    match summary.gantry_angle {
        Some(angle) => out.push_str(&format!("Gantry angle = {} deg\n", angle)),
        None => out.push_str("Gantry angle = (not set)\n"),
    }
    for beam in &summary.beams {
        let energies = beam
            .nominal_energies
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "Beam {} '{}' [{}]: {} control points, energies [{}] MeV\n",
            beam.number.as_deref().unwrap_or("?"),
            beam.name.as_deref().unwrap_or(""),
            beam.delivery_type.as_deref().unwrap_or("-"),
            beam.control_points,
            energies
        ));
    }
    out
}

pub fn run(args: PhantomArgs, config: &PartialConfig) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let codec = config.codec(&cwd);
    let summary = phantom::inspect(&args.phantom_dir, &config.plan_marker(), &codec)?;
    print!("{}", render(&summary));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtipgen::core::plan::document::BeamSummary;

    #[test]
    fn render_lists_geometry_and_beams() {
        let summary = PhantomSummary {
            plan_path: "ph/RP_RTIP.dcm".into(),
            isocenter: [10.0, -2.5, 0.0].into(),
            gantry_angle: None,
            beams: vec![BeamSummary {
                number: Some("1".into()),
                name: Some("Field 1".into()),
                delivery_type: Some("TREATMENT".into()),
                control_points: 4,
                nominal_energies: vec![120.0, 115.5],
            }],
        };

        let text = render(&summary);
        assert!(text.contains("Isocenter = (10, -2.5, 0) mm"));
        assert!(text.contains("Gantry angle = (not set)"));
        assert!(text.contains("Beam 1 'Field 1' [TREATMENT]: 4 control points, energies [120, 115.5] MeV"));
    }
}
