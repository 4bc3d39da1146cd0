//! Whole-buffer polyphase resampling for fixed-length data such as impulse responses.
//!
//! Unlike a streaming resampler, [PolyphaseResampler::process] computes every requested output
//! sample from the full input buffer in one call, compensating for the filter delay so that
//! output sample `i` lands at input time `i * src / dst`.  Samples the filter would need from
//! beyond either end of the input are treated as zero.

use std::f64::consts::PI;

/// Rational-ratio resampler using a Kaiser-windowed sinc filter.
#[derive(Debug, Clone)]
pub struct PolyphaseResampler {
    /// Upsampling factor (`dst / gcd`).
    p: usize,
    /// Downsampling factor (`src / gcd`).
    q: usize,
    /// Index of the filter's center tap.
    l: usize,
    filter: Vec<f64>,
}

fn gcd(mut x: u32, mut y: u32) -> u32 {
    while y > 0 {
        let t = y;
        y = x % y;
        x = t;
    }
    x
}

/// The zero-order modified Bessel function of the first kind, summed until the series converges.
fn bessel_i0(x: f64) -> f64 {
    let x2 = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut i = 1;
    loop {
        let y = x2 / i as f64;
        i += 1;
        term *= y * y;
        let last_sum = sum;
        sum += term;
        if sum == last_sum {
            return sum;
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        return 1.0;
    }
    (PI * x).sin() / (PI * x)
}

/// Kaiser window of shape `beta` evaluated at `k` in `[-1, 1]`.
fn kaiser(beta: f64, k: f64) -> f64 {
    if !(-1.0..=1.0).contains(&k) {
        return 0.0;
    }
    bessel_i0(beta * (1.0 - k * k).sqrt()) / bessel_i0(beta)
}

/// Window shape needed for the given stop-band rejection in dB.
fn kaiser_beta(rejection: f64) -> f64 {
    if rejection > 50.0 {
        0.1102 * (rejection - 8.7)
    } else if rejection >= 21.0 {
        0.5842 * (rejection - 21.0).powf(0.4) + 0.07886 * (rejection - 21.0)
    } else {
        0.0
    }
}

/// Filter order needed for the given rejection in dB over a transition band of `transition`
/// normalized frequency.
fn kaiser_order(rejection: f64, transition: f64) -> usize {
    let w_t = 2.0 * PI * transition;
    if rejection > 21.0 {
        ((rejection - 7.95) / (2.285 * w_t)).ceil() as usize
    } else {
        (5.79 / w_t).ceil() as usize
    }
}

fn sinc_filter(l: usize, beta: f64, gain: f64, cutoff: f64, i: usize) -> f64 {
    let x = i as f64 - l as f64;
    kaiser(beta, x / l as f64) * 2.0 * gain * cutoff * sinc(2.0 * cutoff * x)
}

/// Stop-band rejection of the anti-aliasing filter, in dB.
const REJECTION: f64 = 180.0;

impl PolyphaseResampler {
    /// Create a resampler converting `src_rate` to `dst_rate`.
    ///
    /// # Panics
    ///
    /// Panics if either rate is zero.
    pub fn new(src_rate: u32, dst_rate: u32) -> PolyphaseResampler {
        assert!(src_rate > 0 && dst_rate > 0);

        let gcd = gcd(src_rate, dst_rate);
        let p = (dst_rate / gcd) as usize;
        let q = (src_rate / gcd) as usize;

        // The cutoff is pulled in by half the transition width so the transition band ends before
        // the Nyquist frequency, both scaled by the larger of the two factors.
        let (cutoff, width) = if p > q {
            (0.475 / p as f64, 0.05 / p as f64)
        } else {
            (0.475 / q as f64, 0.05 / q as f64)
        };

        // Round up when halving the order so the transition width never widens.
        let l = (kaiser_order(REJECTION, width) + 1) / 2;
        let beta = kaiser_beta(REJECTION);
        let m = l * 2 + 1;
        let filter: Vec<f64> = (0..m)
            .map(|i| sinc_filter(l, beta, p as f64, cutoff, i))
            .collect();

        PolyphaseResampler { p, q, l, filter }
    }

    /// Resample `input` into `output`, filling every output sample.
    pub fn process(&self, input: &[f64], output: &mut [f64]) {
        let (p, q, m, l) = (self.p, self.q, self.filter.len(), self.l);
        for (i, out) in output.iter_mut().enumerate() {
            // The first tap starts at l to compensate for the filter delay; this drops any
            // build-up from the first half of the filter.
            let mut j_f = (l + q * i) % p;
            let mut j_s = ((l + q * i) / p) as isize;
            let mut r = 0.0;
            while j_f < m {
                if (0..input.len() as isize).contains(&j_s) {
                    r += self.filter[j_f] * input[j_s as usize];
                }
                j_f += p;
                j_s -= 1;
            }
            *out = r;
        }
    }
}
