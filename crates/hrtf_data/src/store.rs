use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicU32;

use crate::config::*;

/// One measurement distance and the number of elevations sampled at it.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Distance from the head center, in meters.  0 for data sets without distance information.
    pub distance: f32,
    pub ev_count: u8,
}

/// One elevation ring: how many azimuths it holds and where its responses start in the
/// coefficient and delay tables.
#[derive(Debug, Clone, Copy)]
pub struct Elevation {
    pub az_count: u16,
    pub ir_offset: u16,
}

/// A stereo impulse response padded to [HRIR_LENGTH], aligned for SIMD loads.
#[derive(Debug, Clone)]
#[repr(align(16))]
pub struct HrirArray([[f32; 2]; HRIR_LENGTH]);

impl Default for HrirArray {
    fn default() -> HrirArray {
        HrirArray([[0.0; 2]; HRIR_LENGTH])
    }
}

impl Deref for HrirArray {
    type Target = [[f32; 2]; HRIR_LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for HrirArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// One HRTF data set at one effective sample rate.
///
/// Stores are immutable once published to the cache; the conditioning passes that rewrite
/// coefficients and delays run while the loader still holds the only reference.  The reference
/// count tracks handles given out to renderers, not the cache's own slot.
pub struct HrtfStore {
    pub(crate) sample_rate: u32,
    pub(crate) ir_size: u16,
    pub(crate) fields: Box<[Field]>,
    pub(crate) elev: Box<[Elevation]>,
    pub(crate) coeffs: Box<[HrirArray]>,
    pub(crate) delays: Box<[[u8; 2]]>,
    pub(crate) ref_count: AtomicU32,
}

impl HrtfStore {
    /// Assemble a store from validated loader output.
    ///
    /// `coeffs` holds `ir_size` samples per response back to back; each row is zero-padded out to
    /// [HRIR_LENGTH] here.  Field distances arrive in file units (millimeters) and are stored in
    /// meters.  The new store starts with one reference, owed to whoever the loader hands it to.
    pub(crate) fn new(
        sample_rate: u32,
        ir_size: u16,
        distances_mm: &[u16],
        ev_counts: &[u8],
        az_counts: &[u16],
        ev_offsets: &[u16],
        coeffs: &[[f32; 2]],
        delays: &[[u8; 2]],
    ) -> HrtfStore {
        let ev_total: usize = ev_counts.iter().map(|&c| usize::from(c)).sum();
        debug_assert_eq!(distances_mm.len(), ev_counts.len());
        debug_assert_eq!(az_counts.len(), ev_total);
        debug_assert_eq!(ev_offsets.len(), ev_total);
        debug_assert_eq!(coeffs.len(), usize::from(ir_size) * delays.len());

        let fields: Box<[Field]> = distances_mm
            .iter()
            .zip(ev_counts)
            .map(|(&mm, &ev_count)| Field {
                distance: f32::from(mm) / 1000.0,
                ev_count,
            })
            .collect();
        let elev: Box<[Elevation]> = az_counts
            .iter()
            .zip(ev_offsets)
            .map(|(&az_count, &ir_offset)| Elevation {
                az_count,
                ir_offset,
            })
            .collect();

        let mut padded: Box<[HrirArray]> = vec![HrirArray::default(); delays.len()].into();
        for (row, src) in padded
            .iter_mut()
            .zip(coeffs.chunks_exact(usize::from(ir_size)))
        {
            row[..src.len()].copy_from_slice(src);
        }

        HrtfStore {
            sample_rate,
            ir_size,
            fields,
            elev,
            coeffs: padded,
            delays: delays.into(),
            ref_count: AtomicU32::new(1),
        }
    }

    /// The effective sample rate; the device rate once the store is conditioned.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The effective filter length in samples.
    pub fn ir_size(&self) -> u16 {
        self.ir_size
    }

    /// Field depths, ordered farthest first.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// All elevation rings, grouped by field.
    pub fn elevations(&self) -> &[Elevation] {
        &self.elev
    }

    /// All stereo responses, one padded row per direction.
    pub fn coeffs(&self) -> &[HrirArray] {
        &self.coeffs
    }

    /// Fixed-point stereo delays, one pair per direction.
    pub fn delays(&self) -> &[[u8; 2]] {
        &self.delays
    }

    /// Total number of stored responses.
    pub fn ir_count(&self) -> usize {
        self.elev
            .last()
            .map_or(0, |e| usize::from(e.ir_offset) + usize::from(e.az_count))
    }

    /// The number of handles currently held on this store.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(std::sync::atomic::Ordering::Acquire)
    }
}
