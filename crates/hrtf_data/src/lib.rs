//! HRTF data sets for binaural rendering.
//!
//! This crate owns everything between the `.mhr` files on disk and the per-direction filters the
//! mixer applies: discovering the available data sets, parsing the three versioned binary
//! formats into one in-memory shape, conditioning that data for the output device (left/right
//! mirroring, sample-rate conversion, filter-length rounding), caching loaded stores by filename
//! and rate under reference counting, and synthesizing filter taps and delays on demand, either
//! for a point source or baked into an ambisonic decode.
//!
//! The host supplies configuration, data-file discovery, and embedded resources through the
//! [ConfigSource], [DataFileSource], and [ResourceSource] traits; the audio device and mixer
//! live elsewhere.

mod bformat;
mod cache;
mod condition;
pub mod config;
mod enumeration;
mod error;
mod formats;
mod query;
mod sources;
mod store;

#[cfg(test)]
mod test_support;

pub use bformat::{build_bformat_hrtf, AngularPoint, DirectHrtfState};
pub use cache::{get_loaded_hrtf, HrtfStoreRef};
pub use enumeration::enumerate_hrtf;
pub use error::LoadError;
pub use query::get_hrtf_coeffs;
pub use sources::{ConfigSource, DataFileSource, ResourceSource};
pub use store::{Elevation, Field, HrirArray, HrtfStore};
