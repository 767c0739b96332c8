//! Kaiser-windowed sinc filter design.
//!
//! Both resampler directions design their low-pass filters once at
//! construction: a windowed-sinc prototype shaped by a Kaiser window whose
//! beta is derived from the requested stop-band attenuation.

use std::f64::consts::PI;

/// Kaiser window beta for a stop-band attenuation of `a` dB.
pub fn alpha(a: f64) -> f64 {
    if a <= 21.0 {
        0.0
    } else if a <= 50.0 {
        0.5842 * (a - 21.0).powf(0.4) + 0.07886 * (a - 21.0)
    } else {
        0.1102 * (a - 8.7)
    }
}

/// Modified Bessel function of the first kind, order zero.
///
/// Ascending series; for the beta values produced by [`alpha`] a few dozen
/// terms reach full double precision.
pub fn dbesi0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;

    loop {
        term *= (half / k) * (half / k);
        sum += term;

        if term < sum * 1e-17 {
            return sum;
        }

        k += 1.0;
    }
}

/// Kaiser window of length `len` evaluated at tap offset `n` (centered).
///
/// `iza` is `dbesi0(alp)`, hoisted by the caller.
pub fn win(n: f64, len: usize, alp: f64, iza: f64) -> f64 {
    let len = (len - 1) as f64;
    dbesi0(alp * (1.0 - 4.0 * n * n / (len * len)).sqrt()) / iza
}

pub fn sinc(x: f64) -> f64 {
    if x == 0.0 { 1.0 } else { x.sin() / x }
}

/// Ideal low-pass prototype with cutoff `lpf` Hz at sampling rate `fs`.
pub fn hn_lpf(n: f64, lpf: f64, fs: f64) -> f64 {
    let t = 1.0 / fs;
    let omega = 2.0 * PI * lpf;

    2.0 * lpf * t * sinc(n * omega * t)
}

/// Kaiser design parameter `D` controlling length vs. transition width.
pub fn kaiser_d(aa: f64) -> f64 {
    if aa <= 21.0 { 0.9222 } else { (aa - 7.95) / 14.36 }
}

pub fn gcd(mut x: usize, mut y: usize) -> usize {
    while y != 0 {
        let t = x % y;
        x = y;
        y = t;
    }

    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bessel_known_values() {
        assert!((dbesi0(0.0) - 1.0).abs() < 1e-15);
        assert!((dbesi0(1.0) - 1.2660658777520084).abs() < 1e-12);
        assert!((dbesi0(2.0) - 2.2795853023360673).abs() < 1e-12);
    }

    #[test]
    fn kaiser_beta_branches() {
        assert_eq!(alpha(21.0), 0.0);
        assert!((alpha(96.0) - 0.1102 * (96.0 - 8.7)).abs() < 1e-12);

        // Continuous-ish across the 50 dB boundary.
        assert!((alpha(50.0) - alpha(50.001)).abs() < 1e-3);
    }

    #[test]
    fn window_is_one_at_center_and_small_at_edges() {
        let alp = alpha(96.0);
        let iza = dbesi0(alp);

        assert!((win(0.0, 255, alp, iza) - 1.0).abs() < 1e-12);
        assert!(win(127.0, 255, alp, iza) < 1e-3);
    }

    #[test]
    fn sinc_prototype_at_dc() {
        // h(0) = 2 fc / fs
        assert!((hn_lpf(0.0, 12_000.0, 48_000.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn gcd_pairs() {
        assert_eq!(gcd(48_000, 96_000), 48_000);
        assert_eq!(gcd(44_100, 48_000), 300);
        assert_eq!(gcd(7, 44_100), 7);
    }
}
