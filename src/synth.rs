/*!
 * Synthetic Delay-Doppler Maps for when there are no real granules to work with.
 *
 * The grid has the same resolution and axes as a CYGNSS level 1 DDM. Power follows a 2-D Gaussian
 * around the specular point on top of a noise floor, with Gaussian noise added to every cell.
 * Each cell's noise comes from its own generator seeded from the cell's index, so the same
 * configuration always produces exactly the same grid.
 */

use crate::{
    ddm::{DdmRecord, DdmSample, Metadata, ProcessingLevel},
    extract::{default_delay, default_doppler},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Delay bins in a CYGNSS DDM.
pub const CYGNSS_DELAY_BINS: usize = 17;

/// Doppler bins in a CYGNSS DDM.
pub const CYGNSS_DOPPLER_BINS: usize = 11;

/// Multiplier spreading the cell index out into a per-cell seed.
const CELL_SEED_MULTIPLIER: u64 = 12345;

/// Parameters of the specular reflection model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteringModel {
    /// Delay of the specular point in chips.
    pub specular_delay: f64,
    /// Doppler of the specular point in Hz.
    pub specular_doppler: f64,
    /// e-folding distance of the peak along the delay axis in chips.
    pub delay_spread: f64,
    /// e-folding distance of the peak along the doppler axis in Hz.
    pub doppler_spread: f64,
    /// Power far from the specular point in dB.
    pub base_db: f64,
    /// Power added at the specular point in dB.
    pub amplitude_db: f64,
    /// Standard deviation of the added noise in dB.
    pub noise_sigma_db: f64,
}

impl Default for ScatteringModel {
    fn default() -> Self {
        ScatteringModel {
            specular_delay: 2.5,
            specular_doppler: 0.0,
            delay_spread: 1.5,
            doppler_spread: 100.0,
            base_db: 15.0,
            amplitude_db: 25.0,
            noise_sigma_db: 2.0,
        }
    }
}

impl ScatteringModel {
    /// The noise free power at a point in the DDM.
    pub fn power(&self, delay: f64, doppler: f64) -> f64 {
        let d = (delay - self.specular_delay) / self.delay_spread;
        let f = (doppler - self.specular_doppler) / self.doppler_spread;

        self.base_db + self.amplitude_db * (-d * d).exp() * (-f * f).exp()
    }
}

/// Descriptive values placed in the metadata of a synthetic DDM.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderMetadata {
    pub file: String,
    pub timestamp: String,
    pub satellite: String,
    pub gps_prn: u8,
    pub specular_lat: f64,
    pub specular_lon: f64,
    pub surface_type: String,
    pub quality: String,
}

impl Default for PlaceholderMetadata {
    fn default() -> Self {
        PlaceholderMetadata {
            file: "cyg01.ddmi.s20180805-120000-e20180805-125959.l1.power-brcs.a30.d31.nc"
                .to_owned(),
            timestamp: "2018-08-05T12:30:00Z".to_owned(),
            satellite: "CYGNSS-01".to_owned(),
            gps_prn: 23,
            specular_lat: 25.7,
            specular_lon: -80.3,
            surface_type: "ocean".to_owned(),
            quality: "good".to_owned(),
        }
    }
}

/// Everything needed to generate a synthetic DDM.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub delay_bins: usize,
    pub doppler_bins: usize,
    /// Added to every per-cell seed, 0 reproduces the reference grid.
    pub seed: u64,
    pub model: ScatteringModel,
    pub placeholder: PlaceholderMetadata,
    /// Provenance written into the metadata `source` field.
    pub source: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            delay_bins: CYGNSS_DELAY_BINS,
            doppler_bins: CYGNSS_DOPPLER_BINS,
            seed: 0,
            model: ScatteringModel::default(),
            placeholder: PlaceholderMetadata::default(),
            source: "NASA CYGNSS Level 1 data structure (for development)".to_owned(),
        }
    }
}

/// The seed for the noise generator of cell `(i, j)`.
pub fn cell_seed(i: usize, j: usize, doppler_bins: usize, seed: u64) -> u64 {
    ((i * doppler_bins + j) as u64)
        .wrapping_mul(CELL_SEED_MULTIPLIER)
        .wrapping_add(seed)
}

/// The noise generator for one cell.
///
/// ChaCha8 is named explicitly, its output for a given seed is fixed across releases.
fn cell_rng(i: usize, j: usize, doppler_bins: usize, seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(cell_seed(i, j, doppler_bins, seed))
}

/**
 * Generate a synthetic DDM.
 *
 * The result always has `delay_bins * doppler_bins` samples in row-major order. Zero dimensions
 * are treated as 1.
 */
pub fn synthesize(config: &SynthConfig) -> DdmRecord {
    let rows = config.delay_bins.max(1);
    let cols = config.doppler_bins.max(1);
    let model = &config.model;

    let mut samples = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            let delay = default_delay(i);
            let doppler = default_doppler(j, cols);

            let mut rng = cell_rng(i, j, cols, config.seed);
            let z: f64 = rng.sample(StandardNormal);
            let noise = model.noise_sigma_db * z;

            samples.push(DdmSample {
                delay,
                doppler,
                power: model.power(delay, doppler) + noise,
            });
        }
    }

    let ph = &config.placeholder;
    let mut meta = Metadata::new(
        ph.file.clone(),
        ph.timestamp.clone(),
        ph.satellite.clone(),
        ProcessingLevel::L1,
        rows,
        cols,
        config.source.clone(),
    );
    meta.gps_prn = Some(ph.gps_prn);
    meta.specular_lat = Some(ph.specular_lat);
    meta.specular_lon = Some(ph.specular_lon);
    meta.surface_type = Some(ph.surface_type.clone());
    meta.quality = Some(ph.quality.clone());
    meta.processing_note = Some(format!(
        "Synthetic {}x{} grid, Gaussian specular peak at {} chips / {} Hz",
        rows, cols, model.specular_delay, model.specular_doppler
    ));

    log::debug!("synthesized a {}x{} DDM (seed {})", rows, cols, config.seed);

    DdmRecord::new(samples, meta)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_grid_shape_and_axes() {
        let record = synthesize(&SynthConfig::default());
        let samples = record.samples();

        assert_eq!(samples.len(), 187);
        assert_eq!(record.metadata().total_points, 187);
        assert_eq!(record.metadata().delay_bins, 17);
        assert_eq!(record.metadata().doppler_bins, 11);

        // Row-major, delay on the outside.
        assert_eq!((samples[0].delay, samples[0].doppler), (0.0, -250.0));
        assert_eq!((samples[1].delay, samples[1].doppler), (0.0, -200.0));
        assert_eq!((samples[11].delay, samples[11].doppler), (0.5, -250.0));
        assert_eq!((samples[186].delay, samples[186].doppler), (8.0, 250.0));

        for s in samples {
            assert!(s.power.is_finite());
            assert!((0.0..=8.0).contains(&s.delay));
            assert!((-250.0..=250.0).contains(&s.doppler));
        }
    }

    #[test]
    fn regenerating_is_bit_identical() {
        let config = SynthConfig::default();
        let a = synthesize(&config);
        let b = synthesize(&config);

        let bits = |r: &DdmRecord| -> Vec<u64> {
            r.samples().iter().map(|s| s.power.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn seed_changes_the_noise_only() {
        let a = synthesize(&SynthConfig::default());
        let b = synthesize(&SynthConfig {
            seed: 99,
            ..Default::default()
        });

        assert_ne!(a.samples(), b.samples());
        for (x, y) in a.samples().iter().zip(b.samples()) {
            assert_eq!((x.delay, x.doppler), (y.delay, y.doppler));
        }
    }

    #[test]
    fn peak_is_near_the_specular_point() {
        let model = ScatteringModel::default();
        assert_eq!(model.power(2.5, 0.0), 40.0);
        assert!((model.power(8.0, 250.0) - 15.0).abs() < 0.01);

        let quiet = SynthConfig {
            model: ScatteringModel {
                noise_sigma_db: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let peak = *synthesize(&quiet).peak().unwrap();
        assert_eq!((peak.delay, peak.doppler, peak.power), (2.5, 0.0, 40.0));
    }

    #[test]
    fn noise_is_roughly_normal() {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n = 5000;
        for k in 0..n {
            let x: f64 = cell_rng(k, 0, 1, 7).sample(StandardNormal);
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;

        assert!(mean.abs() < 0.1, "mean = {}", mean);
        assert!((var - 1.0).abs() < 0.15, "variance = {}", var);
    }

    #[test]
    fn degenerate_dimensions() {
        let record = synthesize(&SynthConfig {
            delay_bins: 0,
            doppler_bins: 1,
            ..Default::default()
        });
        assert_eq!(record.len(), 1);
        assert_eq!(record.samples()[0].doppler, 0.0);
    }

    #[test]
    fn placeholder_metadata() {
        let record = synthesize(&SynthConfig::default());
        let meta = record.metadata();
        assert_eq!(meta.satellite, "CYGNSS-01");
        assert_eq!(meta.gps_prn, Some(23));
        assert_eq!(meta.specular_lat, Some(25.7));
        assert_eq!(meta.surface_type.as_deref(), Some("ocean"));
        assert_eq!(meta.power_variable, None);
    }
}
