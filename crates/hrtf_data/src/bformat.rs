//! Baking an ambisonic decode into a direct HRTF filter set.

use dsp::BandSplitter;
use log::trace;

use crate::config::*;
use crate::query::{calc_az_index, calc_ev_index};
use crate::store::{HrirArray, HrtfStore};

/// Polar direction of one ambisonic sampling point, in radians.
#[derive(Debug, Clone, Copy)]
pub struct AngularPoint {
    pub elev: f32,
    pub azim: f32,
}

/// Precomputed HRTF filters for feeding an ambisonic signal straight to both ears.
pub struct DirectHrtfState {
    /// Effective filter length after a bake, a multiple of [MOD_IR_SIZE].
    pub ir_size: u32,
    /// One padded stereo response per decoder channel.
    pub coeffs: Box<[HrirArray]>,
}

impl DirectHrtfState {
    /// Allocate a state for `num_chans` decoder channels.  The size is fixed for the state's
    /// lifetime; [build_bformat_hrtf] fills it in place.
    pub fn new(num_chans: usize) -> DirectHrtfState {
        DirectHrtfState {
            ir_size: 0,
            coeffs: vec![HrirArray::default(); num_chans].into(),
        }
    }
}

/// Process the responses dual-band so the per-order HF gain only scales the band above the
/// crossover.  The added base delay absorbs the head the scaled minimum-phase response grows.
const DUAL_BAND: bool = true;

const BASE_DELAY: u32 = if DUAL_BAND { 16 } else { 0 };

/// Round a fixed-point delay to whole samples, to nearest.
fn hrir_delay_round(d: u32) -> u32 {
    (d + HRIR_DELAY_FRACHALF) >> HRIR_DELAY_FRACBITS
}

struct ImpulseResponse {
    hrir: Vec<[f64; 2]>,
    ldelay: u32,
    rdelay: u32,
}

/// Interpolate the response for one sampling point from the store's first field, in double
/// precision and with the blended delays kept in fixed point.
fn calc_point_response(hrtf: &HrtfStore, pt: &AngularPoint) -> ImpulseResponse {
    let field = &hrtf.fields[0];

    let elev0 = calc_ev_index(u32::from(field.ev_count), pt.elev);
    let elev1_idx = (elev0.idx + 1).min(u32::from(field.ev_count) - 1);
    let ring0 = hrtf.elev[elev0.idx as usize];
    let ring1 = hrtf.elev[elev1_idx as usize];
    let az0 = calc_az_index(u32::from(ring0.az_count), pt.azim);
    let az1 = calc_az_index(u32::from(ring1.az_count), pt.azim);

    let idx = [
        usize::from(ring0.ir_offset) + az0.idx as usize,
        usize::from(ring0.ir_offset) + ((az0.idx + 1) % u32::from(ring0.az_count)) as usize,
        usize::from(ring1.ir_offset) + az1.idx as usize,
        usize::from(ring1.ir_offset) + ((az1.idx + 1) % u32::from(ring1.az_count)) as usize,
    ];

    let ev_blend = f64::from(elev0.blend);
    let az0_blend = f64::from(az0.blend);
    let az1_blend = f64::from(az1.blend);
    let blend = [
        (1.0 - ev_blend) * (1.0 - az0_blend),
        (1.0 - ev_blend) * az0_blend,
        ev_blend * (1.0 - az1_blend),
        ev_blend * az1_blend,
    ];

    let mut delays = [0u32; 2];
    for (ear, delay) in delays.iter_mut().enumerate() {
        let d: f64 = idx
            .iter()
            .zip(&blend)
            .map(|(&i, &weight)| f64::from(hrtf.delays[i][ear]) * weight)
            .sum();
        *delay = d as u32;
    }

    let mut hrir = vec![[0.0f64; 2]; HRIR_LENGTH];
    for (&i, &weight) in idx.iter().zip(&blend) {
        let src = &hrtf.coeffs[i];
        for (dst, s) in hrir.iter_mut().zip(src.iter()) {
            dst[0] += f64::from(s[0]) * weight;
            dst[1] += f64::from(s[1]) * weight;
        }
    }

    ImpulseResponse {
        hrir,
        ldelay: delays[0],
        rdelay: delays[1],
    }
}

/// Bake the ambisonic decode described by `ambi_points` and `ambi_matrix` into `state`.
///
/// Each point's interpolated response, weighted per channel by its matrix row, accumulates into
/// every decoder channel at a common delay alignment; `ambi_order_hf_gain` scales the result per
/// ambisonic order (ACN channel numbering).  Sampling uses the store's first field.
///
/// # Panics
///
/// Panics if `ambi_points` is empty or its length differs from `ambi_matrix`'s, or if `state`
/// has more than [MAX_AMBI_CHANNELS] channels.
pub fn build_bformat_hrtf(
    hrtf: &HrtfStore,
    state: &mut DirectHrtfState,
    ambi_points: &[AngularPoint],
    ambi_matrix: &[[f32; MAX_AMBI_CHANNELS]],
    ambi_order_hf_gain: &[f32; MAX_AMBI_ORDER + 1],
) {
    let num_chans = state.coeffs.len();
    assert!(num_chans <= MAX_AMBI_CHANNELS);
    assert!(!ambi_points.is_empty());
    assert_eq!(ambi_points.len(), ambi_matrix.len());

    let mut min_delay = HRTF_HISTORY_LENGTH as u32 * HRIR_DELAY_FRACONE;
    let mut max_delay = 0u32;
    let mut impres = Vec::with_capacity(ambi_points.len());
    for pt in ambi_points {
        let res = calc_point_response(hrtf, pt);
        min_delay = min_delay.min(res.ldelay.min(res.rdelay));
        max_delay = max_delay.max(res.ldelay.max(res.rdelay));
        impres.push(res);
    }

    let xover_norm = 400.0 / f64::from(hrtf.sample_rate);
    let mut splitter = BandSplitter::new(xover_norm);

    let mut tmpres = vec![vec![[0.0f64; 2]; HRIR_LENGTH]; num_chans];
    let mut flt_hp = vec![0.0f64; HRIR_LENGTH * 4];
    let mut flt_lp = vec![0.0f64; HRIR_LENGTH * 4];
    let mut flt_sig = vec![0.0f64; HRIR_LENGTH * 4];
    for (c, res) in impres.iter().enumerate() {
        let ldelay = hrir_delay_round(res.ldelay - min_delay) + BASE_DELAY;
        let rdelay = hrir_delay_round(res.rdelay - min_delay) + BASE_DELAY;

        if !DUAL_BAND {
            // Single-band decoding scales the whole response by the order gain.
            for (i, chan) in tmpres.iter_mut().enumerate() {
                let mult = f64::from(ambi_order_hf_gain[ORDER_FROM_CHANNEL[i]])
                    * f64::from(ambi_matrix[c][i]);
                let num_irs = HRIR_LENGTH - ldelay.max(rdelay) as usize;
                for j in 0..num_irs {
                    chan[ldelay as usize + j][0] += res.hrir[j][0] * mult;
                    chan[rdelay as usize + j][1] += res.hrir[j][1] * mult;
                }
            }
            continue;
        }

        for (ear, delay) in [(0usize, ldelay as usize), (1, rdelay as usize)] {
            // Load the response backwards into the padded scratch, run the all-pass, and flip
            // the result; the band-split that follows then cancels the splitter's phase shift
            // instead of adding it, leaving both bands phase-true to the original response.
            flt_sig.fill(0.0);
            for (k, s) in res.hrir.iter().enumerate() {
                flt_sig[HRIR_LENGTH - 1 - k] = s[ear];
            }
            splitter.apply_allpass(&mut flt_sig);
            flt_sig.reverse();

            splitter.clear();
            splitter.process(&mut flt_hp, &mut flt_lp, &flt_sig);

            // Accumulate with the delay applied and the high band scaled per order.
            for (i, chan) in tmpres.iter_mut().enumerate() {
                let mult = f64::from(ambi_matrix[c][i]);
                let hfgain = f64::from(ambi_order_hf_gain[ORDER_FROM_CHANNEL[i]]);
                let mut j = HRIR_LENGTH * 3 - delay;
                for out in chan.iter_mut() {
                    out[ear] += (flt_hp[j] * hfgain + flt_lp[j]) * mult;
                    j += 1;
                }
            }
        }
    }

    for (dst, src) in state.coeffs.iter_mut().zip(&tmpres) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = [s[0] as f32, s[1] as f32];
        }
    }

    // The skipped common delay shortens the filter; the HF head and tail lengthen it.
    max_delay -= min_delay;
    let irsize = (u32::from(hrtf.ir_size) + BASE_DELAY * 2).min(HRIR_LENGTH as u32);
    let mut max_length = (hrir_delay_round(max_delay) + irsize).min(HRIR_LENGTH as u32);
    max_length += MOD_IR_SIZE as u32 - 1;
    max_length -= max_length % MOD_IR_SIZE as u32;

    trace!(
        "Skipped delay: {:.2}, max delay: {:.2}, new FIR length: {}",
        f64::from(min_delay) / f64::from(HRIR_DELAY_FRACONE),
        f64::from(max_delay) / f64::from(HRIR_DELAY_FRACONE),
        max_length
    );
    state.ir_size = max_length;
}
