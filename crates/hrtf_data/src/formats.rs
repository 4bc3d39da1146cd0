//! Loaders for the three versioned `.mhr` binary formats.
//!
//! All versions share a magic-tagged little-endian layout and produce the same in-memory shape:
//! per-field distances and elevation counts, per-elevation azimuth counts and response offsets,
//! packed stereo coefficients, and fixed-point stereo delays.  The older versions only store the
//! left ear and rely on head symmetry for the right; version 2 adds 24-bit samples, true stereo
//! data, and multiple measurement distances.
//!
//! Validation is staged: every limit violation in the current stage is logged before the loader
//! gives up, so a bad file reports all of its problems at once.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use log::error;

use crate::config::*;
use crate::error::LoadError;
use crate::store::HrtfStore;

pub(crate) const MAGIC_V0: &[u8; 8] = b"MinPHR00";
pub(crate) const MAGIC_V1: &[u8; 8] = b"MinPHR01";
pub(crate) const MAGIC_V2: &[u8; 8] = b"MinPHR02";

const SAMPLE_TYPE_S16: u8 = 0;
const SAMPLE_TYPE_S24: u8 = 1;

const CHAN_TYPE_LEFT_ONLY: u8 = 0;
const CHAN_TYPE_LEFT_RIGHT: u8 = 1;

fn valid_rate(rate: u32) -> bool {
    if rate == 0 {
        error!("Invalid sample rate: 0hz");
        return false;
    }
    true
}

fn valid_ir_size(ir_size: usize) -> bool {
    let ok = (MIN_IR_SIZE..=MAX_IR_SIZE).contains(&ir_size) && ir_size % MOD_IR_SIZE == 0;
    if !ok {
        error!(
            "Unsupported HRIR size: irSize={ir_size} ({MIN_IR_SIZE} to {MAX_IR_SIZE} by {MOD_IR_SIZE})"
        );
    }
    ok
}

fn valid_ev_count(ev_count: usize) -> bool {
    let ok = (MIN_EV_COUNT..=MAX_EV_COUNT).contains(&ev_count);
    if !ok {
        error!("Unsupported elevation count: evCount={ev_count} ({MIN_EV_COUNT} to {MAX_EV_COUNT})");
    }
    ok
}

fn valid_az_count(idx: usize, az_count: usize) -> bool {
    let ok = (MIN_AZ_COUNT..=MAX_AZ_COUNT).contains(&az_count);
    if !ok {
        error!(
            "Unsupported azimuth count: azCount[{idx}]={az_count} ({MIN_AZ_COUNT} to {MAX_AZ_COUNT})"
        );
    }
    ok
}

/// Check the raw integer delays against [MAX_HRIR_DELAY], logging each violation.
fn valid_delays(delays: &[[u8; 2]], channels: usize) -> bool {
    let mut ok = true;
    for (i, d) in delays.iter().enumerate() {
        for (c, &delay) in d.iter().take(channels).enumerate() {
            if u32::from(delay) > MAX_HRIR_DELAY {
                error!("Invalid delays[{i}][{c}]: {delay} ({MAX_HRIR_DELAY})");
                ok = false;
            }
        }
    }
    ok
}

/// Mirror the left-ear responses across the median plane to fill in the right ear.
///
/// The right-ear response for azimuth index `j` of a ring is the left-ear response of the ring's
/// azimuth index `(azcount - j) % azcount`.
fn mirror_left_ear(
    coeffs: &mut [[f32; 2]],
    delays: &mut [[u8; 2]],
    ir_size: usize,
    ev_offset: &[u16],
    az_count: &[u16],
) {
    for (&evoffset, &azcount) in ev_offset.iter().zip(az_count) {
        let evoffset = usize::from(evoffset);
        let azcount = usize::from(azcount);
        for j in 0..azcount {
            let lidx = evoffset + j;
            let ridx = evoffset + ((azcount - j) % azcount);

            for k in 0..ir_size {
                coeffs[ridx * ir_size + k][1] = coeffs[lidx * ir_size + k][0];
            }
            delays[ridx][1] = delays[lidx][0];
        }
    }
}

/// Load the oldest format: single field, 16-bit left-only samples, explicit elevation offsets.
pub(crate) fn load_v0(data: &mut dyn Read) -> Result<HrtfStore, LoadError> {
    let rate = data.read_u32::<LittleEndian>()?;
    let ir_count = usize::from(data.read_u16::<LittleEndian>()?);
    let ir_size = usize::from(data.read_u16::<LittleEndian>()?);
    let ev_count = usize::from(data.read_u8()?);

    let mut failed = !valid_rate(rate);
    failed |= !valid_ir_size(ir_size);
    failed |= !valid_ev_count(ev_count);
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut ev_offset = vec![0u16; ev_count];
    for val in ev_offset.iter_mut() {
        *val = data.read_u16::<LittleEndian>()?;
    }

    for i in 1..ev_count {
        if ev_offset[i] <= ev_offset[i - 1] {
            error!(
                "Invalid evOffset: evOffset[{i}]={} (last={})",
                ev_offset[i],
                ev_offset[i - 1]
            );
            failed = true;
        }
    }
    if ir_count <= usize::from(ev_offset[ev_count - 1]) {
        error!(
            "Invalid evOffset: evOffset[{}]={} (irCount={ir_count})",
            ev_count - 1,
            ev_offset[ev_count - 1]
        );
        failed = true;
    }
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut az_count = vec![0u16; ev_count];
    for i in 1..ev_count {
        az_count[i - 1] = ev_offset[i] - ev_offset[i - 1];
        failed |= !valid_az_count(i - 1, usize::from(az_count[i - 1]));
    }
    az_count[ev_count - 1] = (ir_count - usize::from(ev_offset[ev_count - 1])) as u16;
    failed |= !valid_az_count(ev_count - 1, usize::from(az_count[ev_count - 1]));
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut coeffs = vec![[0.0f32; 2]; ir_size * ir_count];
    let mut delays = vec![[0u8; 2]; ir_count];
    for val in coeffs.iter_mut() {
        val[0] = f32::from(data.read_i16::<LittleEndian>()?) / 32768.0;
    }
    for val in delays.iter_mut() {
        val[0] = data.read_u8()?;
    }
    if !valid_delays(&delays, 1) {
        return Err(LoadError::InvalidData);
    }
    for d in delays.iter_mut() {
        d[0] <<= HRIR_DELAY_FRACBITS;
    }

    mirror_left_ear(&mut coeffs, &mut delays, ir_size, &ev_offset, &az_count);

    Ok(HrtfStore::new(
        rate,
        ir_size as u16,
        &[0],
        &[ev_count as u8],
        &az_count,
        &ev_offset,
        &coeffs,
        &delays,
    ))
}

/// Load the first revision: like v0, but azimuth counts are stored directly and the response
/// offsets are implied.
pub(crate) fn load_v1(data: &mut dyn Read) -> Result<HrtfStore, LoadError> {
    let rate = data.read_u32::<LittleEndian>()?;
    let ir_size = usize::from(data.read_u8()?);
    let ev_count = usize::from(data.read_u8()?);

    let mut failed = !valid_rate(rate);
    failed |= !valid_ir_size(ir_size);
    failed |= !valid_ev_count(ev_count);
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut az_count = vec![0u16; ev_count];
    for val in az_count.iter_mut() {
        *val = u16::from(data.read_u8()?);
    }
    for (i, &count) in az_count.iter().enumerate() {
        failed |= !valid_az_count(i, usize::from(count));
    }
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut ev_offset = vec![0u16; ev_count];
    let mut ir_count = usize::from(az_count[0]);
    for i in 1..ev_count {
        ev_offset[i] = ev_offset[i - 1] + az_count[i - 1];
        ir_count += usize::from(az_count[i]);
    }

    let mut coeffs = vec![[0.0f32; 2]; ir_size * ir_count];
    let mut delays = vec![[0u8; 2]; ir_count];
    for val in coeffs.iter_mut() {
        val[0] = f32::from(data.read_i16::<LittleEndian>()?) / 32768.0;
    }
    for val in delays.iter_mut() {
        val[0] = data.read_u8()?;
    }
    if !valid_delays(&delays, 1) {
        return Err(LoadError::InvalidData);
    }
    for d in delays.iter_mut() {
        d[0] <<= HRIR_DELAY_FRACBITS;
    }

    mirror_left_ear(&mut coeffs, &mut delays, ir_size, &ev_offset, &az_count);

    Ok(HrtfStore::new(
        rate,
        ir_size as u16,
        &[0],
        &[ev_count as u8],
        &az_count,
        &ev_offset,
        &coeffs,
        &delays,
    ))
}

/// Load the current format: 16- or 24-bit samples, optional true stereo, and up to
/// [MAX_FD_COUNT] measurement distances.
pub(crate) fn load_v2(data: &mut dyn Read) -> Result<HrtfStore, LoadError> {
    let rate = data.read_u32::<LittleEndian>()?;
    let sample_type = data.read_u8()?;
    let channel_type = data.read_u8()?;
    let ir_size = usize::from(data.read_u8()?);
    let fd_count = usize::from(data.read_u8()?);

    let mut failed = !valid_rate(rate);
    if sample_type > SAMPLE_TYPE_S24 {
        error!("Unsupported sample type: {sample_type}");
        failed = true;
    }
    if channel_type > CHAN_TYPE_LEFT_RIGHT {
        error!("Unsupported channel type: {channel_type}");
        failed = true;
    }
    failed |= !valid_ir_size(ir_size);
    if !(MIN_FD_COUNT..=MAX_FD_COUNT).contains(&fd_count) {
        error!("Unsupported field count: fdCount={fd_count} ({MIN_FD_COUNT} to {MAX_FD_COUNT})");
        failed = true;
    }
    if failed {
        return Err(LoadError::InvalidData);
    }

    let mut distance = vec![0u16; fd_count];
    let mut ev_count = vec![0u8; fd_count];
    let mut az_count: Vec<u16> = Vec::new();
    for f in 0..fd_count {
        distance[f] = data.read_u16::<LittleEndian>()?;
        ev_count[f] = data.read_u8()?;

        if !(MIN_FD_DISTANCE..=MAX_FD_DISTANCE).contains(&distance[f]) {
            error!(
                "Unsupported field distance[{f}]={} ({MIN_FD_DISTANCE} to {MAX_FD_DISTANCE} millimeters)",
                distance[f]
            );
            failed = true;
        }
        if f > 0 && distance[f] <= distance[f - 1] {
            error!(
                "Field distance[{f}] is not after previous ({} > {})",
                distance[f],
                distance[f - 1]
            );
            failed = true;
        }
        if !(MIN_EV_COUNT..=MAX_EV_COUNT).contains(&usize::from(ev_count[f])) {
            error!(
                "Unsupported elevation count: evCount[{f}]={} ({MIN_EV_COUNT} to {MAX_EV_COUNT})",
                ev_count[f]
            );
            failed = true;
        }
        if failed {
            return Err(LoadError::InvalidData);
        }

        let ebase = az_count.len();
        for _ in 0..ev_count[f] {
            az_count.push(u16::from(data.read_u8()?));
        }
        for (e, &count) in az_count[ebase..].iter().enumerate() {
            if !(MIN_AZ_COUNT..=MAX_AZ_COUNT).contains(&usize::from(count)) {
                error!(
                    "Unsupported azimuth count: azCount[{f}][{e}]={count} ({MIN_AZ_COUNT} to {MAX_AZ_COUNT})"
                );
                failed = true;
            }
        }
        if failed {
            return Err(LoadError::InvalidData);
        }
    }

    let ir_total: usize = az_count.iter().map(|&c| usize::from(c)).sum();
    if ir_total > usize::from(u16::MAX) {
        error!("Too many HRIRs: {ir_total} ({} max)", u16::MAX);
        return Err(LoadError::InvalidData);
    }
    let mut ev_offset = vec![0u16; az_count.len()];
    for i in 1..az_count.len() {
        ev_offset[i] = ev_offset[i - 1] + az_count[i - 1];
    }

    let mut coeffs = vec![[0.0f32; 2]; ir_size * ir_total];
    let mut delays = vec![[0u8; 2]; ir_total];
    if channel_type == CHAN_TYPE_LEFT_ONLY {
        match sample_type {
            SAMPLE_TYPE_S16 => {
                for val in coeffs.iter_mut() {
                    val[0] = f32::from(data.read_i16::<LittleEndian>()?) / 32768.0;
                }
            }
            _ => {
                for val in coeffs.iter_mut() {
                    val[0] = data.read_i24::<LittleEndian>()? as f32 / 8388608.0;
                }
            }
        }
        for val in delays.iter_mut() {
            val[0] = data.read_u8()?;
        }
        if !valid_delays(&delays, 1) {
            return Err(LoadError::InvalidData);
        }
        for d in delays.iter_mut() {
            d[0] <<= HRIR_DELAY_FRACBITS;
        }

        mirror_left_ear(&mut coeffs, &mut delays, ir_size, &ev_offset, &az_count);
    } else {
        match sample_type {
            SAMPLE_TYPE_S16 => {
                for val in coeffs.iter_mut() {
                    val[0] = f32::from(data.read_i16::<LittleEndian>()?) / 32768.0;
                    val[1] = f32::from(data.read_i16::<LittleEndian>()?) / 32768.0;
                }
            }
            _ => {
                for val in coeffs.iter_mut() {
                    val[0] = data.read_i24::<LittleEndian>()? as f32 / 8388608.0;
                    val[1] = data.read_i24::<LittleEndian>()? as f32 / 8388608.0;
                }
            }
        }
        for val in delays.iter_mut() {
            val[0] = data.read_u8()?;
            val[1] = data.read_u8()?;
        }
        if !valid_delays(&delays, 2) {
            return Err(LoadError::InvalidData);
        }
        for d in delays.iter_mut() {
            d[0] <<= HRIR_DELAY_FRACBITS;
            d[1] <<= HRIR_DELAY_FRACBITS;
        }
    }

    if fd_count > 1 {
        // The query engines walk fields farthest first; the file stores them nearest first.
        // Reverse the field order while keeping each field's elevations and responses in their
        // original relative order.
        let mut field_spans = Vec::with_capacity(fd_count);
        let mut ebase = 0;
        let mut abase = 0;
        for &evs in &ev_count {
            let evs = usize::from(evs);
            let azs: usize = az_count[ebase..ebase + evs]
                .iter()
                .map(|&c| usize::from(c))
                .sum();
            field_spans.push((ebase, evs, abase, azs));
            ebase += evs;
            abase += azs;
        }

        let mut distance_r = Vec::with_capacity(fd_count);
        let mut ev_count_r = Vec::with_capacity(fd_count);
        let mut az_count_r = Vec::with_capacity(az_count.len());
        let mut coeffs_r = Vec::with_capacity(coeffs.len());
        let mut delays_r = Vec::with_capacity(delays.len());
        for f in (0..fd_count).rev() {
            let (ebase, evs, abase, azs) = field_spans[f];
            distance_r.push(distance[f]);
            ev_count_r.push(ev_count[f]);
            az_count_r.extend_from_slice(&az_count[ebase..ebase + evs]);
            coeffs_r.extend_from_slice(&coeffs[abase * ir_size..(abase + azs) * ir_size]);
            delays_r.extend_from_slice(&delays[abase..abase + azs]);
        }
        distance = distance_r;
        ev_count = ev_count_r;
        az_count = az_count_r;
        coeffs = coeffs_r;
        delays = delays_r;

        // Reestablish the response offsets for the new elevation order.
        ev_offset[0] = 0;
        for i in 1..az_count.len() {
            ev_offset[i] = ev_offset[i - 1] + az_count[i - 1];
        }
    }

    Ok(HrtfStore::new(
        rate,
        ir_size as u16,
        &distance,
        &ev_count,
        &az_count,
        &ev_offset,
        &coeffs,
        &delays,
    ))
}
