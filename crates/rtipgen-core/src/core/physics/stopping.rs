use super::PhysicsError;

/// Stopping power of water at 1 MeV in the power-law fit, in MeV/cm.
pub const STOPPING_POWER_COEFFICIENT: f64 = 205.4;
/// Exponent of the power-law stopping power fit.
pub const STOPPING_POWER_EXPONENT: f64 = -0.722;
/// Depth integration step in cm.
pub const DEPTH_STEP_CM: f64 = 0.25;
/// Upper bound on integration steps before a profile is truncated.
pub const MAX_DEPTH_STEPS: usize = 500;

const JOULES_PER_GIGAPROTON_MEV: f64 = 1.602e-4;

/// Linear stopping power in MeV/cm for a proton of the given residual energy.
#[inline]
pub fn stopping_power(energy_mev: f64) -> f64 {
    STOPPING_POWER_COEFFICIENT * energy_mev.powf(STOPPING_POWER_EXPONENT)
}

/// Energy in joules carried by one gigaproton of the given kinetic energy.
#[inline]
pub fn joules_per_gigaproton(energy_mev: f64) -> f64 {
    energy_mev * JOULES_PER_GIGAPROTON_MEV
}

/// One point of a depth profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSample {
    /// Penetration depth in cm.
    pub depth: f64,
    /// Proton kinetic energy remaining at this depth, in MeV.
    pub residual_energy: f64,
    /// Energy deposited over the step ending at this depth, in MeV.
    pub dose: f64,
}

/// Residual energy and deposited dose versus depth for one initial energy.
///
/// Depths are strictly increasing with a fixed step. When the proton is
/// depleted the last two samples carry zero residual energy: the first of them
/// deposits whatever energy was left, the second closes the curve at zero dose.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthProfile {
    initial_energy: f64,
    step: f64,
    samples: Vec<DepthSample>,
    depleted: bool,
}

impl DepthProfile {
    pub fn initial_energy(&self) -> f64 {
        self.initial_energy
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn samples(&self) -> &[DepthSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the proton ran out of energy before the step limit.
    pub fn is_depleted(&self) -> bool {
        self.depleted
    }

    /// Depth of the last sample, i.e. where the curve returns to zero.
    pub fn terminal_depth(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.depth)
    }

    pub fn depths(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.depth)
    }

    pub fn doses(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.dose)
    }

    /// Sample with the largest deposited dose.
    pub fn peak(&self) -> Option<&DepthSample> {
        self.samples
            .iter()
            .max_by(|a, b| a.dose.total_cmp(&b.dose))
    }
}

/// Explicit Euler integration of the power-law stopping power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyLossModel {
    step: f64,
    max_steps: usize,
}

impl Default for EnergyLossModel {
    fn default() -> Self {
        Self {
            step: DEPTH_STEP_CM,
            max_steps: MAX_DEPTH_STEPS,
        }
    }
}

impl EnergyLossModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Computes the depth profile of a proton entering at `initial_energy` MeV.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::NonPositiveEnergy`] for zero, negative or
    /// non-finite energies.
    pub fn compute(&self, initial_energy: f64) -> Result<DepthProfile, PhysicsError> {
        if !initial_energy.is_finite() || initial_energy <= 0.0 {
            return Err(PhysicsError::NonPositiveEnergy(initial_energy));
        }

        let mut samples = Vec::with_capacity(self.max_steps.min(256) + 3);
        samples.push(DepthSample {
            depth: 0.0,
            residual_energy: initial_energy,
            dose: 0.0,
        });

        let mut energy = initial_energy;
        let mut depleted = false;

        for _ in 0..self.max_steps {
            let loss = stopping_power(energy) * self.step;
            let next_energy = energy - loss;
            let depth = samples.len() as f64 * self.step;

            if next_energy > 0.0 {
                samples.push(DepthSample {
                    depth,
                    residual_energy: next_energy,
                    dose: loss,
                });
                energy = next_energy;
            } else {
                samples.push(DepthSample {
                    depth,
                    residual_energy: 0.0,
                    dose: energy,
                });
                samples.push(DepthSample {
                    depth: depth + self.step,
                    residual_energy: 0.0,
                    dose: 0.0,
                });
                depleted = true;
                break;
            }
        }

        if !depleted {
            tracing::warn!(
                "Proton at {} MeV was not depleted within {} steps; depth profile truncated at {} cm.",
                initial_energy,
                self.max_steps,
                samples.len().saturating_sub(1) as f64 * self.step
            );
        }

        Ok(DepthProfile {
            initial_energy,
            step: self.step,
            samples,
            depleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn stopping_power_matches_power_law_at_reference_energy() {
        assert!(f64_approx_equal(stopping_power(1.0), 205.4));
        assert!(stopping_power(100.0) < stopping_power(10.0));
    }

    #[test]
    fn joules_per_gigaproton_uses_legacy_conversion() {
        assert!(f64_approx_equal(joules_per_gigaproton(100.0), 0.01602));
    }

    #[test]
    fn compute_rejects_non_positive_energies() {
        let model = EnergyLossModel::new();
        assert_eq!(
            model.compute(0.0),
            Err(PhysicsError::NonPositiveEnergy(0.0))
        );
        assert!(model.compute(-5.0).is_err());
        assert!(model.compute(f64::NAN).is_err());
    }

    #[test]
    fn compute_produces_monotonic_profile_that_terminates_at_zero() {
        let model = EnergyLossModel::new();
        for energy in [0.5, 10.0, 70.0, 150.0, 230.0] {
            let profile = model.compute(energy).unwrap();
            assert!(profile.is_depleted(), "{} MeV should deplete", energy);
            assert!(profile.len() <= MAX_DEPTH_STEPS + 3);

            let samples = profile.samples();
            for pair in samples.windows(2) {
                assert!(f64_approx_equal(pair[1].depth - pair[0].depth, DEPTH_STEP_CM));
                assert!(pair[1].residual_energy <= pair[0].residual_energy);
            }

            let n = samples.len();
            assert_eq!(samples[n - 1].residual_energy, 0.0);
            assert_eq!(samples[n - 2].residual_energy, 0.0);
            assert!(samples[n - 3].residual_energy > 0.0);
            assert_eq!(samples[n - 1].dose, 0.0);
        }
    }

    #[test]
    fn compute_deposits_remaining_energy_in_penultimate_sample() {
        let profile = EnergyLossModel::new().compute(10.0).unwrap();
        let samples = profile.samples();
        let n = samples.len();
        assert!(f64_approx_equal(
            samples[n - 2].dose,
            samples[n - 3].residual_energy
        ));
    }

    #[test]
    fn deposited_dose_sums_to_initial_energy_for_depleted_profiles() {
        let profile = EnergyLossModel::new().compute(120.0).unwrap();
        let total: f64 = profile.doses().sum();
        assert!((total - 120.0).abs() < 1e-6);
    }

    #[test]
    fn very_low_energy_depletes_in_first_step() {
        let profile = EnergyLossModel::new().compute(0.1).unwrap();
        let samples = profile.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].depth, 0.0);
        assert!(f64_approx_equal(samples[1].dose, 0.1));
        assert!(f64_approx_equal(profile.terminal_depth(), 0.5));
    }

    #[test]
    fn higher_energy_reaches_deeper() {
        let model = EnergyLossModel::new();
        let shallow = model.compute(70.0).unwrap();
        let deep = model.compute(200.0).unwrap();
        assert!(deep.terminal_depth() > shallow.terminal_depth());
    }

    #[test]
    fn dose_peaks_near_end_of_range() {
        let profile = EnergyLossModel::new().compute(150.0).unwrap();
        let peak = profile.peak().unwrap();
        assert!(peak.depth > 0.8 * profile.terminal_depth());
    }

    #[test]
    fn extreme_energy_is_truncated_at_step_limit() {
        let profile = EnergyLossModel::new().compute(5000.0).unwrap();
        assert!(!profile.is_depleted());
        assert_eq!(profile.len(), MAX_DEPTH_STEPS + 1);
        assert!(profile.samples().last().unwrap().residual_energy > 0.0);
    }
}
