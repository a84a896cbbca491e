//! Spectral and fractal analysis of recorded series.
//!
//! Power spectra use Welch's method with the usual defaults (periodic Hann
//! window, 512-sample segments, 50% overlap, per-segment mean removal,
//! one-sided density scaling), so the numbers line up with
//! `scipy.signal.welch` on the same input.
//!
//! The fractal dimension comes from the 1/f^β slope of the spectrum:
//!
//!   log10 P(f) ≈ c - β log10 f  over a fixed band,   D = (5 - β) / 2
//!
//! A band that holds fewer than two usable bins has no slope; the dimension is
//! then NaN and the caller has to pick a band that fits its sampling rate.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QsfwError, QsfwResult};

/// Segmenting parameters for Welch's method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelchConfig {
    /// Samples per segment (clamped to the series length).
    pub segment_len: usize,
    /// Samples shared by consecutive segments; `None` means half a segment.
    pub overlap: Option<usize>,
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            segment_len: 512,
            overlap: None,
        }
    }
}

/// One-sided power spectral density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub psd: Vec<f64>,
}

/// Open frequency interval (low, high) used for power-law fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl Default for FrequencyBand {
    /// Fits the 10 Hz sampling of dt_network = 0.1 with ~100 bins.
    fn default() -> Self {
        Self {
            low: 0.1,
            high: 2.0,
        }
    }
}

impl FrequencyBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Check the band is ordered and overlaps [0, Nyquist).
    pub fn validate(&self, sampling_rate: f64) -> QsfwResult<()> {
        if !(self.low.is_finite() && self.high.is_finite()) || self.low < 0.0 {
            return Err(QsfwError::invalid(format!(
                "band ({}, {}) must be finite and non-negative",
                self.low, self.high
            )));
        }
        if self.high <= self.low {
            return Err(QsfwError::invalid(format!(
                "band high {} must exceed low {}",
                self.high, self.low
            )));
        }
        let nyquist = sampling_rate / 2.0;
        if self.low >= nyquist {
            return Err(QsfwError::invalid(format!(
                "band ({}, {}) lies above the Nyquist frequency {}",
                self.low, self.high, nyquist
            )));
        }
        Ok(())
    }

    #[inline]
    fn contains(&self, f: f64) -> bool {
        f > self.low && f < self.high
    }
}

/// Least-squares line through (log10 f, log10 P).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    pub slope: f64,
    pub intercept: f64,
    /// Spectral exponent β = -slope.
    pub beta: f64,
    /// Number of bins the fit used.
    pub points: usize,
}

impl PowerLawFit {
    /// D = (5 - β) / 2.
    pub fn fractal_dimension(&self) -> f64 {
        (5.0 - self.beta) / 2.0
    }
}

/// Periodic Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / n as f64).cos())
        .collect()
}

/// Welch power spectral density of `series` sampled at `sampling_rate`.
pub fn power_spectral_density(
    series: &[f64],
    sampling_rate: f64,
    config: &WelchConfig,
) -> QsfwResult<Spectrum> {
    if series.is_empty() {
        return Err(QsfwError::invalid("cannot take the spectrum of an empty series"));
    }
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(QsfwError::invalid(format!(
            "sampling rate must be > 0, got {}",
            sampling_rate
        )));
    }
    if config.segment_len == 0 {
        return Err(QsfwError::invalid("segment length must be >= 1"));
    }

    let nperseg = config.segment_len.min(series.len());
    let noverlap = config.overlap.unwrap_or(nperseg / 2);
    if noverlap >= nperseg {
        return Err(QsfwError::invalid(format!(
            "overlap {} must be smaller than segment length {}",
            noverlap, nperseg
        )));
    }
    let step = nperseg - noverlap;
    let n_segments = (series.len() - noverlap) / step;

    let window = hann_window(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sampling_rate * window_power);
    let n_bins = nperseg / 2 + 1;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];
    let mut psd = vec![0.0; n_bins];

    for seg in 0..n_segments {
        let chunk = &series[seg * step..seg * step + nperseg];
        let mean = chunk.iter().sum::<f64>() / nperseg as f64;
        for ((slot, &x), &w) in buffer.iter_mut().zip(chunk).zip(&window) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, bin) in psd.iter_mut().zip(&buffer) {
            *acc += bin.norm_sqr() * scale;
        }
    }

    let nyquist_is_bin = nperseg % 2 == 0;
    for (k, p) in psd.iter_mut().enumerate() {
        *p /= n_segments as f64;
        let is_edge = k == 0 || (nyquist_is_bin && k == n_bins - 1);
        if !is_edge {
            *p *= 2.0;
        }
    }

    let frequencies = (0..n_bins)
        .map(|k| k as f64 * sampling_rate / nperseg as f64)
        .collect();

    debug!(nperseg, n_segments, "welch psd");
    Ok(Spectrum { frequencies, psd })
}

/// Fit log10 P against log10 f over the bins strictly inside `band`.
pub fn fit_power_law(spectrum: &Spectrum, band: &FrequencyBand) -> QsfwResult<PowerLawFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = spectrum
        .frequencies
        .iter()
        .zip(&spectrum.psd)
        .filter(|(&f, &p)| band.contains(f) && p > 0.0 && p.is_finite())
        .map(|(&f, &p)| (f.log10(), p.log10()))
        .unzip();

    let n = xs.len();
    if n < 2 {
        return Err(QsfwError::unstable(format!(
            "band ({}, {}) holds {} usable bins, need at least 2",
            band.low, band.high, n
        )));
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    if sxx <= f64::EPSILON {
        return Err(QsfwError::unstable("degenerate log-frequency spread in fit band"));
    }

    let slope = sxy / sxx;
    Ok(PowerLawFit {
        slope,
        intercept: mean_y - slope * mean_x,
        beta: -slope,
        points: n,
    })
}

/// Fractal dimension of `series` from its spectral slope, NaN if undefined.
pub fn fractal_dimension(series: &[f64], sampling_rate: f64, band: &FrequencyBand) -> f64 {
    let fit = power_spectral_density(series, sampling_rate, &WelchConfig::default())
        .and_then(|spectrum| fit_power_law(&spectrum, band));
    match fit {
        Ok(fit) => fit.fractal_dimension(),
        Err(err) => {
            debug!(%err, "fractal dimension undefined");
            f64::NAN
        }
    }
}

/// Element-wise mean of several spectra on the same frequency grid.
pub fn mean_spectrum(spectra: &[Spectrum]) -> QsfwResult<Spectrum> {
    let first = spectra
        .first()
        .ok_or_else(|| QsfwError::invalid("no spectra to average"))?;
    let mut psd = vec![0.0; first.psd.len()];
    for s in spectra {
        if s.psd.len() != psd.len() {
            return Err(QsfwError::invalid("spectra have different lengths"));
        }
        for (acc, p) in psd.iter_mut().zip(&s.psd) {
            *acc += p;
        }
    }
    let n = spectra.len() as f64;
    psd.iter_mut().for_each(|p| *p /= n);
    Ok(Spectrum {
        frequencies: first.frequencies.clone(),
        psd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    #[test]
    fn frequency_grid_matches_segment() {
        let series = vec![0.0; 1000];
        let s = power_spectral_density(&series, 10.0, &WelchConfig::default()).unwrap();
        assert_eq!(s.frequencies.len(), 257);
        assert!((s.frequencies[1] - 10.0 / 512.0).abs() < 1e-15);
        assert!((s.frequencies[256] - 5.0).abs() < 1e-12);
        assert!(s.psd.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn short_series_uses_own_length() {
        let series: Vec<f64> = (0..100).map(|k| (k as f64 * 0.3).sin()).collect();
        let s = power_spectral_density(&series, 1.0, &WelchConfig::default()).unwrap();
        assert_eq!(s.psd.len(), 51);
    }

    #[test]
    fn sinusoid_peaks_at_its_frequency() {
        let fs = 64.0;
        let f0 = 8.0;
        let series: Vec<f64> = (0..4096)
            .map(|k| (2.0 * PI * f0 * k as f64 / fs).sin())
            .collect();
        let s = power_spectral_density(&series, fs, &WelchConfig::default()).unwrap();
        let (peak, _) = s
            .psd
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (k, &p)| if p > best.1 { (k, p) } else { best });
        assert!((s.frequencies[peak] - f0).abs() < 1e-9);
    }

    #[test]
    fn white_noise_level_is_two_sigma_squared_over_fs() {
        // One-sided density of unit-variance white noise is 2/fs.
        let mut rng = StdRng::seed_from_u64(17);
        let fs = 10.0;
        let series: Vec<f64> = (0..65536).map(|_| rng.sample(StandardNormal)).collect();
        let s = power_spectral_density(&series, fs, &WelchConfig::default()).unwrap();
        let interior = &s.psd[10..240];
        let mean = interior.iter().sum::<f64>() / interior.len() as f64;
        assert!((mean - 2.0 / fs).abs() < 0.02, "mean level {}", mean);
    }

    #[test]
    fn parseval_total_power() {
        // ∫ P(f) df ≈ variance for a stationary signal.
        let mut rng = StdRng::seed_from_u64(3);
        let series: Vec<f64> = (0..20000)
            .map(|_| 2.0 * rng.sample::<f64, _>(StandardNormal))
            .collect();
        let fs = 4.0;
        let s = power_spectral_density(&series, fs, &WelchConfig::default()).unwrap();
        let df = s.frequencies[1];
        let power: f64 = s.psd.iter().sum::<f64>() * df;
        assert!((power - 4.0).abs() < 0.3, "total power {}", power);
    }

    #[test]
    fn empty_series_rejected() {
        assert!(matches!(
            power_spectral_density(&[], 1.0, &WelchConfig::default()),
            Err(QsfwError::InvalidArgument(_))
        ));
        assert!(matches!(
            power_spectral_density(&[1.0, 2.0], 0.0, &WelchConfig::default()),
            Err(QsfwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn exact_power_law_recovers_beta() {
        let frequencies: Vec<f64> = (0..200).map(|k| k as f64 * 0.05).collect();
        let psd: Vec<f64> = frequencies
            .iter()
            .map(|&f| if f > 0.0 { 3.0 * f.powf(-1.5) } else { 0.0 })
            .collect();
        let fit = fit_power_law(&Spectrum { frequencies, psd }, &FrequencyBand::new(0.1, 5.0))
            .unwrap();
        assert!((fit.beta - 1.5).abs() < 1e-10);
        assert!((fit.intercept - 3f64.log10()).abs() < 1e-10);
        assert!((fit.fractal_dimension() - 1.75).abs() < 1e-10);
    }

    #[test]
    fn band_above_nyquist_is_nan() {
        let series: Vec<f64> = (0..1000).map(|k| (k as f64).sin()).collect();
        // EEG band 5–30 Hz has no bins at fs = 10 Hz.
        let d = fractal_dimension(&series, 10.0, &FrequencyBand::new(5.0, 30.0));
        assert!(d.is_nan());
        assert!(FrequencyBand::new(5.0, 30.0).validate(10.0).is_err());
        assert!(FrequencyBand::default().validate(10.0).is_ok());
        assert!(FrequencyBand::new(2.0, 1.0).validate(10.0).is_err());
    }

    #[test]
    fn white_noise_dimension_near_two_and_a_half() {
        let mut rng = StdRng::seed_from_u64(21);
        let series: Vec<f64> = (0..20000).map(|_| rng.sample(StandardNormal)).collect();
        let d = fractal_dimension(&series, 10.0, &FrequencyBand::new(0.1, 4.5));
        // β ≈ 0 → D ≈ 2.5
        assert!((d - 2.5).abs() < 0.1, "dimension {}", d);
    }

    #[test]
    fn brownian_motion_dimension_near_one_and_a_half() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut x = 0.0;
        let series: Vec<f64> = (0..50000)
            .map(|_| {
                x += rng.sample::<f64, _>(StandardNormal);
                x
            })
            .collect();
        let d = fractal_dimension(&series, 10.0, &FrequencyBand::new(0.1, 1.0));
        // β ≈ 2 → D ≈ 1.5
        assert!((d - 1.5).abs() < 0.1, "dimension {}", d);
    }

    #[test]
    fn mean_spectrum_averages() {
        let a = Spectrum {
            frequencies: vec![0.0, 1.0],
            psd: vec![1.0, 3.0],
        };
        let b = Spectrum {
            frequencies: vec![0.0, 1.0],
            psd: vec![3.0, 5.0],
        };
        let m = mean_spectrum(&[a, b]).unwrap();
        assert_eq!(m.psd, vec![2.0, 4.0]);
        assert!(mean_spectrum(&[]).is_err());
    }
}
