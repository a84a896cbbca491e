//! IIR filtering for the EEG forward model.
//!
//! Digital Butterworth low-pass design (analogue prototype, frequency
//! pre-warp, bilinear transform) and zero-phase forward-backward filtering.
//! Coefficients and edge handling agree with `scipy.signal.butter` /
//! `filtfilt` for the same arguments.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{QsfwError, QsfwResult};

/// Transfer-function coefficients b (numerator) and a (denominator).
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

/// Low-pass Butterworth of `order` with cutoff `wn` as a fraction of Nyquist.
pub fn butter_lowpass(order: usize, wn: f64) -> QsfwResult<TransferFunction> {
    if order == 0 {
        return Err(QsfwError::invalid("filter order must be >= 1"));
    }
    if !(wn > 0.0 && wn < 1.0) {
        return Err(QsfwError::invalid(format!(
            "cutoff must lie in (0, 1) of Nyquist, got {}",
            wn
        )));
    }

    // Analogue prototype: poles on the left half of the unit circle.
    let n = order as i64;
    let prototype: Vec<Complex64> = (0..order as i64)
        .map(|m| {
            let angle = PI * (2 * m - n + 1) as f64 / (2 * n) as f64;
            -Complex64::from_polar(1.0, angle)
        })
        .collect();

    // Pre-warp with fs = 2, then bilinear transform at 2·fs = 4.
    let fs2 = 4.0;
    let warped = fs2 * (PI * wn / 2.0).tan();
    let analogue: Vec<Complex64> = prototype.iter().map(|&p| p * warped).collect();
    let gain = warped.powi(order as i32);

    let poles: Vec<Complex64> = analogue
        .iter()
        .map(|&p| (fs2 + p) / (fs2 - p))
        .collect();
    let zeros = vec![Complex64::new(-1.0, 0.0); order];
    let denominator: Complex64 = analogue.iter().map(|&p| fs2 - p).product();
    let k = gain * (Complex64::new(1.0, 0.0) / denominator).re;

    let b = poly(&zeros).into_iter().map(|c| k * c).collect();
    let a = poly(&poles);
    Ok(TransferFunction { b, a })
}

/// Real coefficients of ∏(x - rᵢ), highest power first.
fn poly(roots: &[Complex64]) -> Vec<f64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * r;
        }
        coeffs = next;
    }
    coeffs.into_iter().map(|c| c.re).collect()
}

/// Pad b and a to the same length and divide through by a[0].
fn normalise(b: &[f64], a: &[f64]) -> QsfwResult<(Vec<f64>, Vec<f64>)> {
    let a0 = *a
        .first()
        .ok_or_else(|| QsfwError::invalid("denominator must not be empty"))?;
    if b.is_empty() {
        return Err(QsfwError::invalid("numerator must not be empty"));
    }
    if a0 == 0.0 {
        return Err(QsfwError::invalid("a[0] must be non-zero"));
    }
    let n = a.len().max(b.len());
    let mut bn = vec![0.0; n];
    let mut an = vec![0.0; n];
    for (dst, src) in bn.iter_mut().zip(b) {
        *dst = src / a0;
    }
    for (dst, src) in an.iter_mut().zip(a) {
        *dst = src / a0;
    }
    Ok((bn, an))
}

/// Direct-form II transposed filter of `x`, starting from state `zi`
/// (zeros when `None`). Returns the output and the final state.
pub fn lfilter(
    b: &[f64],
    a: &[f64],
    x: &[f64],
    zi: Option<&[f64]>,
) -> QsfwResult<(Vec<f64>, Vec<f64>)> {
    let (b, a) = normalise(b, a)?;
    let order = b.len() - 1;
    let mut z = match zi {
        Some(zi) if zi.len() == order => zi.to_vec(),
        Some(zi) => {
            return Err(QsfwError::invalid(format!(
                "initial state has length {}, expected {}",
                zi.len(),
                order
            )))
        }
        None => vec![0.0; order],
    };

    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = b[0] * xn + z.first().copied().unwrap_or(0.0);
        for i in 0..order {
            let carry = if i + 1 < order { z[i + 1] } else { 0.0 };
            z[i] = b[i + 1] * xn + carry - a[i + 1] * yn;
        }
        y.push(yn);
    }
    Ok((y, z))
}

/// Initial state for which a unit step input gives a unit step response.
pub fn lfilter_zi(b: &[f64], a: &[f64]) -> QsfwResult<Vec<f64>> {
    let (b, a) = normalise(b, a)?;
    let order = b.len() - 1;
    if order == 0 {
        return Ok(Vec::new());
    }

    // (I - Cᵀ) zi = b[1:] - a[1:]·b[0], with C the companion matrix of a.
    let mut system = DMatrix::<f64>::identity(order, order);
    for i in 0..order {
        system[(i, 0)] += a[i + 1];
        if i + 1 < order {
            system[(i, i + 1)] -= 1.0;
        }
    }
    let rhs = DVector::from_iterator(order, (0..order).map(|i| b[i + 1] - a[i + 1] * b[0]));
    let zi = system
        .lu()
        .solve(&rhs)
        .ok_or_else(|| QsfwError::unstable("filter steady-state system is singular"))?;
    Ok(zi.iter().copied().collect())
}

/// Zero-phase forward-backward filter with odd extension at both ends.
pub fn filtfilt(b: &[f64], a: &[f64], x: &[f64]) -> QsfwResult<Vec<f64>> {
    let padlen = 3 * a.len().max(b.len());
    if x.len() <= padlen {
        return Err(QsfwError::invalid(format!(
            "input of length {} must be longer than the pad length {}",
            x.len(),
            padlen
        )));
    }

    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));

    let zi = lfilter_zi(b, a)?;

    let scaled: Vec<f64> = zi.iter().map(|z| z * ext[0]).collect();
    let (forward, _) = lfilter(b, a, &ext, Some(&scaled))?;

    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    let y0 = reversed[0];
    let scaled: Vec<f64> = zi.iter().map(|z| z * y0).collect();
    let (backward, _) = lfilter(b, a, &reversed, Some(&scaled))?;
    reversed = backward;
    reversed.reverse();

    Ok(reversed[padlen..padlen + n].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn butterworth_matches_reference_coefficients() {
        // scipy.signal.butter(3, 0.2)
        let tf = butter_lowpass(3, 0.2).unwrap();
        let b = [0.01809893, 0.05429679, 0.05429679, 0.01809893];
        let a = [1.0, -1.76004188, 1.18289326, -0.27805992];
        for (got, want) in tf.b.iter().zip(&b) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-7);
        }
        for (got, want) in tf.a.iter().zip(&a) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-7);
        }
    }

    #[test]
    fn lowpass_has_unit_dc_gain() {
        for order in 1..=6 {
            let tf = butter_lowpass(order, 0.35).unwrap();
            let gain = tf.b.iter().sum::<f64>() / tf.a.iter().sum::<f64>();
            assert_abs_diff_eq!(gain, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn bad_design_arguments() {
        assert!(butter_lowpass(0, 0.2).is_err());
        assert!(butter_lowpass(3, 0.0).is_err());
        assert!(butter_lowpass(3, 1.0).is_err());
    }

    #[test]
    fn lfilter_impulse_response_of_fir() {
        let (y, z) = lfilter(&[1.0, 2.0, 3.0], &[1.0], &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        assert_eq!(y, vec![1.0, 2.0, 3.0, 0.0]);
        assert_eq!(z, vec![0.0, 0.0]);
    }

    #[test]
    fn lfilter_one_pole_recursion() {
        // y[n] = x[n] + 0.5 y[n-1]
        let (y, _) = lfilter(&[1.0], &[1.0, -0.5], &[1.0, 0.0, 0.0], None).unwrap();
        assert_eq!(y, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn zi_gives_step_steady_state() {
        let tf = butter_lowpass(3, 0.2).unwrap();
        let zi = lfilter_zi(&tf.b, &tf.a).unwrap();
        let (y, _) = lfilter(&tf.b, &tf.a, &[1.0; 20], Some(&zi)).unwrap();
        for v in y {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn filtfilt_preserves_dc() {
        let tf = butter_lowpass(3, 0.2).unwrap();
        let y = filtfilt(&tf.b, &tf.a, &[2.5; 100]).unwrap();
        assert_eq!(y.len(), 100);
        for v in y {
            assert_abs_diff_eq!(v, 2.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn filtfilt_suppresses_high_frequency() {
        let tf = butter_lowpass(3, 0.2).unwrap();
        // 0.8 of Nyquist, far above the cutoff.
        let x: Vec<f64> = (0..400).map(|k| (PI * 0.8 * k as f64).sin()).collect();
        let y = filtfilt(&tf.b, &tf.a, &x).unwrap();
        let interior_peak = y[50..350].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(interior_peak < 1e-3, "peak {}", interior_peak);
    }

    #[test]
    fn filtfilt_is_zero_phase_for_slow_sine() {
        let tf = butter_lowpass(3, 0.2).unwrap();
        let x: Vec<f64> = (0..600).map(|k| (PI * 0.01 * k as f64).sin()).collect();
        let y = filtfilt(&tf.b, &tf.a, &x).unwrap();
        for k in 100..500 {
            assert_abs_diff_eq!(y[k], x[k], epsilon = 1e-3);
        }
    }

    #[test]
    fn short_input_rejected() {
        let tf = butter_lowpass(3, 0.2).unwrap();
        assert!(matches!(
            filtfilt(&tf.b, &tf.a, &[1.0; 12]),
            Err(QsfwError::InvalidArgument(_))
        ));
        assert!(filtfilt(&tf.b, &tf.a, &[1.0; 13]).is_ok());
    }
}
