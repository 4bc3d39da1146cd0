//! Post-load conditioning: bring a store to the device sample rate and apply the optional
//! filter-length override.
//!
//! Both passes run while the loader still holds the only reference to the store; published
//! stores are never rewritten.

use dsp::PolyphaseResampler;

use crate::config::*;
use crate::store::HrtfStore;

/// Rescale a fixed-point delay from `srate` to `drate`, rounding to nearest and saturating at
/// the largest storable delay.
fn rescale_delay(delay: u8, srate: u64, drate: u64) -> u8 {
    let scaled = (u64::from(delay) * drate + srate / 2) / srate;
    scaled.min(u64::from(MAX_HRIR_DELAY * HRIR_DELAY_FRACONE)) as u8
}

/// Resample every response of `hrtf` to `devrate` and rescale the delays and filter length to
/// match.  Does nothing when the store is already at the device rate.
pub(crate) fn resample_store(hrtf: &mut HrtfStore, devrate: u32) {
    if hrtf.sample_rate == devrate {
        return;
    }

    let ir_count = hrtf.ir_count();
    let rs = PolyphaseResampler::new(hrtf.sample_rate, devrate);
    let mut input = vec![0.0f64; HRIR_LENGTH];
    let mut output = vec![0.0f64; HRIR_LENGTH];
    for i in 0..ir_count {
        for ch in 0..2 {
            for (sample, row) in input.iter_mut().zip(hrtf.coeffs[i].iter()) {
                *sample = f64::from(row[ch]);
            }
            rs.process(&input, &mut output);
            for (row, &sample) in hrtf.coeffs[i].iter_mut().zip(&output) {
                row[ch] = sample as f32;
            }
        }
    }

    let srate = u64::from(hrtf.sample_rate);
    let drate = u64::from(devrate);
    for d in hrtf.delays[..ir_count].iter_mut() {
        for delay in d.iter_mut() {
            *delay = rescale_delay(*delay, srate, drate);
        }
    }

    // Scale the filter length for the new rate, rounding up to the size multiple.
    let mut new_ir_size = (u64::from(hrtf.ir_size) * drate + srate - 1) / srate;
    new_ir_size = new_ir_size.min(HRIR_LENGTH as u64) + (MOD_IR_SIZE as u64 - 1);
    hrtf.ir_size = (new_ir_size - new_ir_size % MOD_IR_SIZE as u64) as u16;
    hrtf.sample_rate = devrate;
}

/// Clamp the filter length to a configured override, when one is set and shorter than what the
/// data provides.
pub(crate) fn apply_size_override(hrtf: &mut HrtfStore, size: u32) {
    if size > 0 && size < u32::from(hrtf.ir_size) {
        let clamped = size.max(MIN_IR_SIZE as u32) as u16;
        hrtf.ir_size = clamped - clamped % MOD_IR_SIZE as u16;
    }
}
