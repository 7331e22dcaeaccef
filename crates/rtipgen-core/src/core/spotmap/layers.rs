use super::SpotMapError;
use super::parser::Spot;
use crate::core::physics::stopping::joules_per_gigaproton;
use tracing::debug;

/// How spots are assigned to energy layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerGrouping {
    /// A new layer starts wherever consecutive spots differ in energy.
    /// Spot maps that revisit an energy later in the file produce an extra layer.
    #[default]
    ContiguousRuns,
    /// Spots with equal energy share one layer wherever they appear; layers
    /// are ordered by first appearance.
    ByEnergy,
}

/// Spots delivered at one energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    /// Position in delivery order.
    pub index: usize,
    /// Layer energy in MeV.
    pub energy: f64,
    /// Sum of the member spots' weights.
    pub dose_weight: f64,
    pub spot_count: usize,
}

/// Structured statistics over an aggregated spot map.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseSummary {
    pub spot_count: usize,
    pub layer_count: usize,
    /// Sum of all layer weights (gigaprotons for the clinical export).
    pub total_weight: f64,
    /// Distinct layer energies, ascending.
    pub unique_energies: Vec<f64>,
    /// Kinetic energy carried by the planned protons, in joules.
    pub deposited_energy_joules: f64,
}

/// Output of [`DoseAggregator::aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerAggregation {
    pub layers: Vec<Layer>,
    /// Layer index of every input spot, in input order.
    pub spot_layers: Vec<usize>,
    pub summary: DoseSummary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoseAggregator {
    grouping: LayerGrouping,
}

impl DoseAggregator {
    pub fn new(grouping: LayerGrouping) -> Self {
        Self { grouping }
    }

    pub fn grouping(&self) -> LayerGrouping {
        self.grouping
    }

    /// Groups spots into layers in file order and accumulates their weights.
    ///
    /// # Errors
    ///
    /// Returns [`SpotMapError::NoSpots`] when `spots` is empty: a spot map
    /// without layers is not a deliverable plan.
    pub fn aggregate(&self, spots: &[Spot]) -> Result<LayerAggregation, SpotMapError> {
        if spots.is_empty() {
            return Err(SpotMapError::NoSpots);
        }

        let (layers, spot_layers) = match self.grouping {
            LayerGrouping::ContiguousRuns => group_contiguous(spots),
            LayerGrouping::ByEnergy => group_by_energy(spots),
        };

        let summary = summarize(spots.len(), &layers);
        debug!(
            "Aggregated {} spots into {} layers ({:?}).",
            summary.spot_count, summary.layer_count, self.grouping
        );

        Ok(LayerAggregation {
            layers,
            spot_layers,
            summary,
        })
    }
}

fn group_contiguous(spots: &[Spot]) -> (Vec<Layer>, Vec<usize>) {
    let mut layers: Vec<Layer> = Vec::new();
    let mut spot_layers = Vec::with_capacity(spots.len());

    for spot in spots {
        match layers.last_mut() {
            Some(current) if current.energy == spot.energy => {
                current.dose_weight += spot.weight;
                current.spot_count += 1;
            }
            _ => layers.push(Layer {
                index: layers.len(),
                energy: spot.energy,
                dose_weight: spot.weight,
                spot_count: 1,
            }),
        }
        spot_layers.push(layers.len() - 1);
    }

    (layers, spot_layers)
}

fn group_by_energy(spots: &[Spot]) -> (Vec<Layer>, Vec<usize>) {
    let mut layers: Vec<Layer> = Vec::new();
    let mut spot_layers = Vec::with_capacity(spots.len());

    for spot in spots {
        let index = match layers.iter().position(|layer| layer.energy == spot.energy) {
            Some(index) => {
                layers[index].dose_weight += spot.weight;
                layers[index].spot_count += 1;
                index
            }
            None => {
                layers.push(Layer {
                    index: layers.len(),
                    energy: spot.energy,
                    dose_weight: spot.weight,
                    spot_count: 1,
                });
                layers.len() - 1
            }
        };
        spot_layers.push(index);
    }

    (layers, spot_layers)
}

fn summarize(spot_count: usize, layers: &[Layer]) -> DoseSummary {
    let total_weight = layers.iter().map(|layer| layer.dose_weight).sum();

    let mut unique_energies: Vec<f64> = layers.iter().map(|layer| layer.energy).collect();
    unique_energies.sort_by(f64::total_cmp);
    unique_energies.dedup();

    let deposited_energy_joules = layers
        .iter()
        .map(|layer| joules_per_gigaproton(layer.energy) * layer.dose_weight)
        .sum();

    DoseSummary {
        spot_count,
        layer_count: layers.len(),
        total_weight,
        unique_energies,
        deposited_energy_joules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn spots(data: &[(f64, f64)]) -> Vec<Spot> {
        data.iter()
            .map(|&(energy, weight)| Spot {
                energy,
                position: Point2::origin(),
                weight,
            })
            .collect()
    }

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn contiguous_energies_form_one_layer_per_run() {
        let input = spots(&[
            (10.0, 1.0),
            (10.0, 2.0),
            (10.0, 3.0),
            (20.0, 4.0),
            (20.0, 5.0),
            (30.0, 6.0),
        ]);
        let result = DoseAggregator::default().aggregate(&input).unwrap();

        assert_eq!(result.layers.len(), 3);
        let energies: Vec<f64> = result.layers.iter().map(|l| l.energy).collect();
        assert_eq!(energies, vec![10.0, 20.0, 30.0]);
        assert!(f64_approx_equal(result.layers[0].dose_weight, 6.0));
        assert!(f64_approx_equal(result.layers[1].dose_weight, 9.0));
        assert!(f64_approx_equal(result.layers[2].dose_weight, 6.0));
        assert_eq!(result.layers[2].spot_count, 1);
        assert_eq!(result.spot_layers, vec![0, 0, 0, 1, 1, 2]);
    }

    #[test]
    fn final_single_spot_layer_is_closed() {
        let input = spots(&[(100.0, 1.0), (110.0, 0.25)]);
        let result = DoseAggregator::default().aggregate(&input).unwrap();
        assert_eq!(result.layers.len(), 2);
        assert!(f64_approx_equal(result.layers[1].dose_weight, 0.25));
    }

    #[test]
    fn single_spot_map_has_one_layer() {
        let result = DoseAggregator::default()
            .aggregate(&spots(&[(70.0, 2.0)]))
            .unwrap();
        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.summary.layer_count, 1);
        assert!(f64_approx_equal(result.summary.total_weight, 2.0));
    }

    #[test]
    fn empty_spot_sequence_is_rejected() {
        let result = DoseAggregator::default().aggregate(&[]);
        assert!(matches!(result, Err(SpotMapError::NoSpots)));
    }

    #[test]
    fn contiguous_grouping_fragments_revisited_energies() {
        let input = spots(&[(10.0, 1.0), (20.0, 1.0), (10.0, 1.0)]);
        let result = DoseAggregator::new(LayerGrouping::ContiguousRuns)
            .aggregate(&input)
            .unwrap();
        assert_eq!(result.layers.len(), 3);
        assert_eq!(result.summary.unique_energies, vec![10.0, 20.0]);
    }

    #[test]
    fn by_energy_grouping_merges_revisited_energies() {
        let input = spots(&[(10.0, 1.0), (20.0, 1.5), (10.0, 2.0)]);
        let result = DoseAggregator::new(LayerGrouping::ByEnergy)
            .aggregate(&input)
            .unwrap();
        assert_eq!(result.layers.len(), 2);
        assert_eq!(result.layers[0].energy, 10.0);
        assert!(f64_approx_equal(result.layers[0].dose_weight, 3.0));
        assert_eq!(result.layers[0].spot_count, 2);
        assert_eq!(result.spot_layers, vec![0, 1, 0]);
    }

    #[test]
    fn summary_reports_counts_totals_and_sorted_energies() {
        let input = spots(&[(150.0, 1.0), (150.0, 1.0), (100.0, 0.5), (120.0, 0.5)]);
        let summary = DoseAggregator::default().aggregate(&input).unwrap().summary;

        assert_eq!(summary.spot_count, 4);
        assert_eq!(summary.layer_count, 3);
        assert!(f64_approx_equal(summary.total_weight, 3.0));
        assert_eq!(summary.unique_energies, vec![100.0, 120.0, 150.0]);
        let expected_joules = (150.0 * 2.0 + 100.0 * 0.5 + 120.0 * 0.5) * 1.602e-4;
        assert!(f64_approx_equal(summary.deposited_energy_joules, expected_joules));
    }
}
