//! Shared fixtures for the crate's tests: fake host seams, a minimal data file, and
//! threshold-based float asserts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::sources::{ConfigSource, DataFileSource, ResourceSource};

/// Tests that touch the process-wide enumeration and cache state serialize on this.
pub(crate) static GLOBAL_STATE_LOCK: Mutex<()> = Mutex::new(());

#[track_caller]
pub(crate) fn close_floats32(a: f32, b: f32, threshold: f32) {
    let diff = (a - b).abs();
    assert!(
        diff < threshold,
        "{} vs {}, difference {} is greater than threshold {}",
        a,
        b,
        diff,
        threshold
    );
}

#[track_caller]
pub(crate) fn close_floats64(a: f64, b: f64, threshold: f64) {
    let diff = (a - b).abs();
    assert!(
        diff < threshold,
        "{} vs {}, difference {} is greater than threshold {}",
        a,
        b,
        diff,
        threshold
    );
}

pub(crate) const V1_AZ: [u8; 5] = [1, 4, 4, 4, 1];
pub(crate) const V1_IR_COUNT: usize = 14;

/// A complete minimal v1 file, magic included: five elevation rings with azimuth counts
/// {1, 4, 4, 4, 1}, 8-sample left-only IRs, and a unit impulse on response 8.
pub(crate) fn v1_file(rate: u32, delays: &[u8; V1_IR_COUNT]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MinPHR01");
    out.write_u32::<LittleEndian>(rate).unwrap();
    out.write_u8(8).unwrap();
    out.write_u8(V1_AZ.len() as u8).unwrap();
    out.extend_from_slice(&V1_AZ);
    for i in 0..V1_IR_COUNT * 8 {
        let sample = if i == 8 * 8 { 32767 } else { 0 };
        out.write_i16::<LittleEndian>(sample).unwrap();
    }
    out.extend_from_slice(delays);
    out
}

#[derive(Default)]
pub(crate) struct FakeConfig(pub HashMap<String, String>);

impl FakeConfig {
    pub(crate) fn with(pairs: &[(&str, &str)]) -> FakeConfig {
        FakeConfig(
            pairs
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl ConfigSource for FakeConfig {
    fn get_str(&self, _devname: Option<&str>, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn get_uint(&self, _devname: Option<&str>, key: &str) -> Option<u32> {
        self.0.get(key).and_then(|v| v.parse().ok())
    }
}

/// Maps logical search paths to file lists and records every search made.
#[derive(Default)]
pub(crate) struct FakeFiles {
    pub files: HashMap<String, Vec<PathBuf>>,
    pub searches: Mutex<Vec<String>>,
}

impl FakeFiles {
    pub(crate) fn with(path: &str, files: &[&str]) -> FakeFiles {
        let mut out = FakeFiles::default();
        out.files
            .insert(path.to_string(), files.iter().map(PathBuf::from).collect());
        out
    }
}

impl DataFileSource for FakeFiles {
    fn search(&self, _ext: &str, path: &str) -> Vec<PathBuf> {
        self.searches.lock().unwrap().push(path.to_string());
        self.files.get(path).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
pub(crate) struct FakeResources(pub HashMap<u32, Vec<u8>>);

impl ResourceSource for FakeResources {
    fn get(&self, id: u32) -> &[u8] {
        self.0.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}
