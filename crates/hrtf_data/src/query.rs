//! Point-source HRTF lookup: bilinear interpolation over the spherical grid.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::config::*;
use crate::store::{HrirArray, HrtfStore};

pub(crate) struct IdxBlend {
    pub idx: u32,
    pub blend: f32,
}

/// Map a polar elevation in radians to a grid index in `[0, ev_count - 1]` and the blend toward
/// the next index.
pub(crate) fn calc_ev_index(ev_count: u32, ev: f32) -> IdxBlend {
    let ev = (FRAC_PI_2 + ev) * (ev_count - 1) as f32 / PI;
    let idx = ev as u32;

    IdxBlend {
        idx: idx.min(ev_count - 1),
        blend: ev - idx as f32,
    }
}

/// Map a polar azimuth in radians to a grid index in `[0, az_count - 1]` and the blend toward
/// the next index.  The full-turn bias keeps the value non-negative for the truncation.
pub(crate) fn calc_az_index(az_count: u32, az: f32) -> IdxBlend {
    let az = (TAU + az) * az_count as f32 / TAU;
    let idx = az as u32;

    IdxBlend {
        idx: idx % az_count,
        blend: az - idx as f32,
    }
}

/// Compute the HRIR coefficients and integer sample delays for the given polar direction.
///
/// `spread` widens the source: at 0 the result is the pure interpolated response, at a full turn
/// it collapses to the omnidirectional pass-through.  `distance` selects among the store's
/// measurement fields; anything at or beyond the farthest field uses that field.
pub fn get_hrtf_coeffs(
    hrtf: &HrtfStore,
    elevation: f32,
    azimuth: f32,
    distance: f32,
    spread: f32,
    coeffs: &mut HrirArray,
    delays: &mut [u32; 2],
) {
    let dirfact = 1.0 - spread / TAU;

    let mut ebase = 0usize;
    let mut fidx = 0usize;
    while fidx + 1 < hrtf.fields.len() && distance < hrtf.fields[fidx].distance {
        ebase += usize::from(hrtf.fields[fidx].ev_count);
        fidx += 1;
    }
    let field = &hrtf.fields[fidx];

    // Elevation indices.
    let elev0 = calc_ev_index(u32::from(field.ev_count), elevation);
    let elev1_idx = (elev0.idx + 1).min(u32::from(field.ev_count) - 1);
    let ring0 = hrtf.elev[ebase + elev0.idx as usize];
    let ring1 = hrtf.elev[ebase + elev1_idx as usize];

    // Azimuth indices, per ring.
    let az0 = calc_az_index(u32::from(ring0.az_count), azimuth);
    let az1 = calc_az_index(u32::from(ring1.az_count), azimuth);

    // The four responses to blend.
    let idx = [
        usize::from(ring0.ir_offset) + az0.idx as usize,
        usize::from(ring0.ir_offset) + ((az0.idx + 1) % u32::from(ring0.az_count)) as usize,
        usize::from(ring1.ir_offset) + az1.idx as usize,
        usize::from(ring1.ir_offset) + ((az1.idx + 1) % u32::from(ring1.az_count)) as usize,
    ];

    // Bilinear weights, attenuated by the directional panning factor.
    let blend = [
        (1.0 - elev0.blend) * (1.0 - az0.blend) * dirfact,
        (1.0 - elev0.blend) * az0.blend * dirfact,
        elev0.blend * (1.0 - az1.blend) * dirfact,
        elev0.blend * az1.blend * dirfact,
    ];

    // Blend the fixed-point delays and truncate to whole samples.
    for (ear, delay_out) in delays.iter_mut().enumerate() {
        let d: f32 = idx
            .iter()
            .zip(&blend)
            .map(|(&i, &weight)| f32::from(hrtf.delays[i][ear]) * weight)
            .sum();
        *delay_out = (d * (1.0 / HRIR_DELAY_FRACONE as f32)) as u32;
    }

    // Blend the coefficients on top of the omni pass-through term.
    let passthru = PASSTHRU_COEFF * (1.0 - dirfact);
    coeffs[0] = [passthru, passthru];
    for row in coeffs[1..].iter_mut() {
        *row = [0.0, 0.0];
    }
    let ir_size = usize::from(hrtf.ir_size);
    for (&i, &weight) in idx.iter().zip(&blend) {
        let src = &hrtf.coeffs[i];
        for (dst, s) in coeffs[..ir_size].iter_mut().zip(src.iter()) {
            dst[0] += s[0] * weight;
            dst[1] += s[1] * weight;
        }
    }
}
