//! Data-set limits and fixed-point parameters.
//!
//! The file-level limits must be the same as or more flexible than those used by the tools that
//! produce `.mhr` data sets; loosening them here without updating the tools only admits files
//! nothing can generate.

/// Bounds on the impulse response length stored in a data file, in samples.  Lengths must also be
/// a multiple of [MOD_IR_SIZE].
pub const MIN_IR_SIZE: usize = 8;
pub const MAX_IR_SIZE: usize = 512;
pub const MOD_IR_SIZE: usize = 2;

/// Bounds on the number of field depths (measurement distances) in a data set.
pub const MIN_FD_COUNT: usize = 1;
pub const MAX_FD_COUNT: usize = 16;

/// Bounds on a field's measurement distance, in millimeters as stored in the file.
pub const MIN_FD_DISTANCE: u16 = 50;
pub const MAX_FD_DISTANCE: u16 = 2500;

/// Bounds on the number of elevations per field.
pub const MIN_EV_COUNT: usize = 5;
pub const MAX_EV_COUNT: usize = 181;

/// Bounds on the number of azimuths per elevation.
pub const MIN_AZ_COUNT: usize = 1;
pub const MAX_AZ_COUNT: usize = 255;

/// Length of every stored HRIR row.  Responses shorter than this are zero-padded so the mixer can
/// always run a fixed-length filter.
pub const HRIR_LENGTH: usize = 512;

/// Length of the per-source history the mixer keeps for HRTF delays.  The largest usable delay is
/// one less than this.
pub const HRTF_HISTORY_LENGTH: usize = 64;

pub const MAX_HRIR_DELAY: u32 = HRTF_HISTORY_LENGTH as u32 - 1;

/// Delays are stored in fixed point with this many fractional bits (quarter-sample resolution).
pub const HRIR_DELAY_FRACBITS: u32 = 2;
pub const HRIR_DELAY_FRACONE: u32 = 1 << HRIR_DELAY_FRACBITS;
pub const HRIR_DELAY_FRACHALF: u32 = HRIR_DELAY_FRACONE >> 1;

// Fixed-point delays must fit the byte-sized storage.
const _: () = assert!(MAX_HRIR_DELAY * HRIR_DELAY_FRACONE < 256);

/// First-sample value of the pass-through response used for omni-directional sounds (the
/// remaining samples are 0).  This is `sqrt(0.5)`, i.e. -3dB on both ears.
pub const PASSTHRU_COEFF: f32 = 0.707_106_78;

/// The highest ambisonic order the B-format decoder handles.
pub const MAX_AMBI_ORDER: usize = 3;

/// Channels needed for a full third-order ambisonic signal.  This bounds the decoder channel
/// count accepted by the B-format bake.
pub const MAX_AMBI_CHANNELS: usize = (MAX_AMBI_ORDER + 1) * (MAX_AMBI_ORDER + 1);

/// ACN channel number to ambisonic order, up to third order.
pub const ORDER_FROM_CHANNEL: [usize; MAX_AMBI_CHANNELS] =
    [0, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3];
