use super::PhysicsError;
use super::stopping::{DEPTH_STEP_CM, DepthProfile, EnergyLossModel};
use crate::core::spotmap::layers::Layer;
use tracing::{debug, instrument};

/// Default accumulation length: 200 samples at 0.25 cm, a 50 cm window.
pub const DEFAULT_BUFFER_SAMPLES: usize = 200;
/// Margin added beyond the first layer's range when choosing the display depth.
pub const DISPLAY_DEPTH_MARGIN_CM: f64 = 2.0;

/// How long the composite accumulation buffer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLength {
    /// A fixed number of samples; longer profiles are cut at the buffer end.
    Fixed(usize),
    /// As long as the longest contributing profile.
    Longest,
}

impl Default for BufferLength {
    fn default() -> Self {
        BufferLength::Fixed(DEFAULT_BUFFER_SAMPLES)
    }
}

/// One layer's depth-dose curve scaled by the layer's dose weight.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCurve {
    pub energy: f64,
    pub weight: f64,
    pub depths: Vec<f64>,
    pub doses: Vec<f64>,
}

/// Weighted sum of the layer depth-dose curves on a uniform depth axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeBraggCurve {
    step: f64,
    dose: Vec<f64>,
    display_max_depth: f64,
    layer_curves: Vec<LayerCurve>,
}

impl CompositeBraggCurve {
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn dose(&self) -> &[f64] {
        &self.dose
    }

    pub fn len(&self) -> usize {
        self.dose.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dose.is_empty()
    }

    /// Upper depth bound for displaying the curve: the first layer's range plus a margin.
    pub fn display_max_depth(&self) -> f64 {
        self.display_max_depth
    }

    pub fn layer_curves(&self) -> &[LayerCurve] {
        &self.layer_curves
    }

    pub fn depths(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.dose.len()).map(move |i| i as f64 * self.step)
    }

    /// `(depth, dose)` pairs of the composite curve.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.depths().zip(self.dose.iter().copied())
    }

    /// Depth and dose of the composite maximum.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.samples().max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Sums per-layer depth profiles, weighted by layer dose, index by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BraggCurveComposer {
    buffer: BufferLength,
    step: f64,
    display_margin: f64,
}

impl Default for BraggCurveComposer {
    fn default() -> Self {
        Self {
            buffer: BufferLength::default(),
            step: DEPTH_STEP_CM,
            display_margin: DISPLAY_DEPTH_MARGIN_CM,
        }
    }
}

impl BraggCurveComposer {
    pub fn new(buffer: BufferLength) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn buffer(&self) -> BufferLength {
        self.buffer
    }

    /// Composes the curve using `model` for every layer's depth profile.
    pub fn compose(
        &self,
        layers: &[Layer],
        model: &EnergyLossModel,
    ) -> Result<CompositeBraggCurve, PhysicsError> {
        self.with_step(model.step())
            .compose_with(layers, |layer| model.compute(layer.energy))
    }

    /// Composes the curve with an arbitrary profile source.
    ///
    /// Profiles are aligned by sample index, not by physical depth, and each
    /// contributes only up to the shorter of its own length and the buffer.
    #[instrument(level = "debug", skip_all, fields(layers = layers.len()))]
    pub fn compose_with<F>(
        &self,
        layers: &[Layer],
        mut profile_of: F,
    ) -> Result<CompositeBraggCurve, PhysicsError>
    where
        F: FnMut(&Layer) -> Result<DepthProfile, PhysicsError>,
    {
        if layers.is_empty() {
            return Err(PhysicsError::EmptyLayerSet);
        }

        let profiles = layers
            .iter()
            .map(|layer| profile_of(layer))
            .collect::<Result<Vec<_>, _>>()?;

        let buffer_len = match self.buffer {
            BufferLength::Fixed(n) => n,
            BufferLength::Longest => profiles.iter().map(DepthProfile::len).max().unwrap_or(0),
        };
        if buffer_len == 0 {
            return Err(PhysicsError::EmptyBuffer);
        }

        let mut dose = vec![0.0; buffer_len];
        let mut layer_curves = Vec::with_capacity(layers.len());

        for (layer, profile) in layers.iter().zip(&profiles) {
            if profile.len() > buffer_len {
                debug!(
                    "Profile for {} MeV has {} samples; only the first {} are accumulated.",
                    layer.energy,
                    profile.len(),
                    buffer_len
                );
            }
            for (slot, sample) in dose.iter_mut().zip(profile.samples()) {
                *slot += sample.dose * layer.dose_weight;
            }
            layer_curves.push(LayerCurve {
                energy: layer.energy,
                weight: layer.dose_weight,
                depths: profile.depths().collect(),
                doses: profile.doses().map(|d| d * layer.dose_weight).collect(),
            });
        }

        let display_max_depth = profiles[0].terminal_depth() + self.display_margin;

        Ok(CompositeBraggCurve {
            step: self.step,
            dose,
            display_max_depth,
            layer_curves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(index: usize, energy: f64, dose_weight: f64) -> Layer {
        Layer {
            index,
            energy,
            dose_weight,
            spot_count: 1,
        }
    }

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn compose_rejects_empty_layer_set() {
        let composer = BraggCurveComposer::default();
        let result = composer.compose(&[], &EnergyLossModel::new());
        assert_eq!(result, Err(PhysicsError::EmptyLayerSet));
    }

    #[test]
    fn compose_uses_fixed_fifty_centimetre_window_by_default() {
        let curve = BraggCurveComposer::default()
            .compose(&[layer(0, 100.0, 1.0)], &EnergyLossModel::new())
            .unwrap();
        assert_eq!(curve.len(), 200);
        assert!(f64_approx_equal(curve.depths().last().unwrap(), 49.75));
    }

    #[test]
    fn single_layer_curve_equals_weighted_profile() {
        let model = EnergyLossModel::new();
        let profile = model.compute(60.0).unwrap();
        let curve = BraggCurveComposer::default()
            .compose(&[layer(0, 60.0, 2.5)], &model)
            .unwrap();

        for (i, sample) in profile.samples().iter().enumerate() {
            assert!(f64_approx_equal(curve.dose()[i], sample.dose * 2.5));
        }
        for value in &curve.dose()[profile.len()..] {
            assert_eq!(*value, 0.0);
        }
    }

    #[test]
    fn compose_is_linear_in_layer_weights() {
        let model = EnergyLossModel::new();
        let composer = BraggCurveComposer::default();
        let base = [layer(0, 80.0, 0.4), layer(1, 120.0, 1.3)];
        let scaled = [layer(0, 80.0, 0.4 * 4.0), layer(1, 120.0, 1.3 * 4.0)];

        let a = composer.compose(&base, &model).unwrap();
        let b = composer.compose(&scaled, &model).unwrap();
        for (x, y) in a.dose().iter().zip(b.dose()) {
            assert!((x * 4.0 - y).abs() <= 1e-12 * y.abs().max(1.0));
        }
    }

    #[test]
    fn compose_is_deterministic() {
        let model = EnergyLossModel::new();
        let composer = BraggCurveComposer::default();
        let layers = [layer(0, 90.0, 1.0), layer(1, 95.0, 0.7)];
        assert_eq!(
            composer.compose(&layers, &model).unwrap(),
            composer.compose(&layers, &model).unwrap()
        );
    }

    #[test]
    fn display_depth_follows_first_layer_plus_margin() {
        let model = EnergyLossModel::new();
        let first = model.compute(150.0).unwrap();
        let curve = BraggCurveComposer::default()
            .compose(&[layer(0, 150.0, 1.0), layer(1, 70.0, 1.0)], &model)
            .unwrap();
        assert!(f64_approx_equal(
            curve.display_max_depth(),
            first.terminal_depth() + DISPLAY_DEPTH_MARGIN_CM
        ));
        assert_eq!(curve.layer_curves().len(), 2);
    }

    #[test]
    fn fixed_buffer_truncates_long_profiles() {
        let model = EnergyLossModel::new();
        let curve = BraggCurveComposer::new(BufferLength::Fixed(10))
            .compose(&[layer(0, 200.0, 1.0)], &model)
            .unwrap();
        let profile = model.compute(200.0).unwrap();
        assert_eq!(curve.len(), 10);
        assert!(f64_approx_equal(curve.dose()[9], profile.samples()[9].dose));
        assert_eq!(curve.layer_curves()[0].doses.len(), profile.len());
    }

    #[test]
    fn longest_buffer_fits_deepest_profile() {
        let model = EnergyLossModel::new();
        let curve = BraggCurveComposer::new(BufferLength::Longest)
            .compose(&[layer(0, 70.0, 1.0), layer(1, 220.0, 1.0)], &model)
            .unwrap();
        assert_eq!(curve.len(), model.compute(220.0).unwrap().len());
    }

    #[test]
    fn zero_length_buffer_is_rejected() {
        let result = BraggCurveComposer::new(BufferLength::Fixed(0))
            .compose(&[layer(0, 70.0, 1.0)], &EnergyLossModel::new());
        assert_eq!(result, Err(PhysicsError::EmptyBuffer));
    }

    #[test]
    fn compose_with_propagates_profile_errors() {
        let result = BraggCurveComposer::default().compose_with(&[layer(0, 10.0, 1.0)], |_| {
            Err(PhysicsError::NonPositiveEnergy(-1.0))
        });
        assert_eq!(result, Err(PhysicsError::NonPositiveEnergy(-1.0)));
    }
}
