//! The process-wide cache of loaded stores, keyed by filename and sample rate, with
//! reference-counted lifetimes.
//!
//! Lock order: the enumeration lock is taken before the cache lock, never the other way around.
//! Handing out a reference happens under the cache lock, so a nonzero count can only grow while
//! the sweep in [HrtfStoreRef::drop] holds that same lock.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, trace};

use crate::condition;
use crate::enumeration::ENUMERATED_HRTFS;
use crate::error::LoadError;
use crate::formats::{self, MAGIC_V0, MAGIC_V1, MAGIC_V2};
use crate::sources::{ConfigSource, ResourceSource};
use crate::store::HrtfStore;

pub(crate) struct LoadedHrtf {
    pub filename: String,
    pub entry: Option<Arc<HrtfStore>>,
}

/// Cached stores, sorted by filename.  A filename appears once per sample rate it was loaded at.
pub(crate) static LOADED_HRTFS: Mutex<Vec<LoadedHrtf>> = Mutex::new(Vec::new());

/// A counted handle to a cached store.
///
/// Cloning takes another reference; dropping the last one makes the store eligible for the cache
/// sweep, which frees every unreferenced store.
pub struct HrtfStoreRef {
    store: Arc<HrtfStore>,
}

impl Deref for HrtfStoreRef {
    type Target = HrtfStore;

    fn deref(&self) -> &HrtfStore {
        &self.store
    }
}

impl Clone for HrtfStoreRef {
    fn clone(&self) -> HrtfStoreRef {
        inc_ref(&self.store);
        HrtfStoreRef {
            store: Arc::clone(&self.store),
        }
    }
}

impl Drop for HrtfStoreRef {
    fn drop(&mut self) {
        let ref_count = self.store.ref_count.fetch_sub(1, Ordering::AcqRel) - 1;
        trace!("HrtfStore {:p} decreasing refcount to {ref_count}", &*self.store);
        if ref_count == 0 {
            let mut loaded = LOADED_HRTFS.lock().unwrap_or_else(PoisonError::into_inner);
            // Free every store nothing references anymore, keeping the rest in order.
            loaded.retain(|slot| match &slot.entry {
                Some(entry) if entry.ref_count.load(Ordering::Acquire) == 0 => {
                    trace!("Unloading unused HRTF {}", slot.filename);
                    false
                }
                _ => true,
            });
        }
    }
}

fn inc_ref(store: &HrtfStore) {
    let ref_count = store.ref_count.fetch_add(1, Ordering::AcqRel) + 1;
    trace!("HrtfStore {store:p} increasing refcount to {ref_count}");
}

/// Parse the `!<residx>_<name>` synthetic filename form; `None` for real paths.
fn parse_resource_filename(filename: &str) -> Option<u32> {
    let rest = filename.strip_prefix('!')?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits == 0 || !rest[digits..].starts_with('_') {
        return None;
    }
    rest[..digits].parse().ok()
}

fn load_from_stream(stream: &mut dyn Read, name: &str) -> Result<HrtfStore, LoadError> {
    let mut magic = [0u8; 8];
    stream.read_exact(&mut magic)?;

    match &magic {
        MAGIC_V2 => {
            trace!("Detected data set format v2");
            formats::load_v2(stream)
        }
        MAGIC_V1 => {
            trace!("Detected data set format v1");
            formats::load_v1(stream)
        }
        MAGIC_V0 => {
            trace!("Detected data set format v0");
            formats::load_v0(stream)
        }
        _ => {
            error!(
                "Invalid header in {name}: \"{}\"",
                magic.escape_ascii()
            );
            Err(LoadError::InvalidHeader(magic))
        }
    }
}

/// Fetch the store for an enumerated display name at the given device rate, loading and
/// conditioning it on first use.
///
/// Returns `None` when the name is not enumerated or the file fails to load; failures never
/// leave a partial entry in the cache.
pub fn get_loaded_hrtf(
    name: &str,
    devname: Option<&str>,
    devrate: u32,
    config: &dyn ConfigSource,
    resources: &dyn ResourceSource,
) -> Option<HrtfStoreRef> {
    let enumerated = ENUMERATED_HRTFS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let fname = enumerated
        .iter()
        .find(|e| e.disp_name == name)?
        .filename
        .clone();

    let mut loaded = LOADED_HRTFS.lock().unwrap_or_else(PoisonError::into_inner);
    let mut pos = loaded.partition_point(|h| h.filename < fname);
    while pos < loaded.len() && loaded[pos].filename == fname {
        if let Some(entry) = &loaded[pos].entry {
            if entry.sample_rate() == devrate {
                inc_ref(entry);
                return Some(HrtfStoreRef {
                    store: Arc::clone(entry),
                });
            }
        }
        pos += 1;
    }

    trace!("Loading {fname}...");
    let result = if let Some(residx) = parse_resource_filename(&fname) {
        let res = resources.get(residx);
        if res.is_empty() {
            error!("Could not get resource {residx}, {name}");
            Err(LoadError::MissingResource(residx))
        } else {
            load_from_stream(&mut Cursor::new(res), name)
        }
    } else {
        match File::open(&fname) {
            Ok(f) => load_from_stream(&mut BufReader::new(f), name),
            Err(_) => {
                error!("Could not open {fname}");
                return None;
            }
        }
    };

    let mut hrtf = match result {
        Ok(hrtf) => hrtf,
        Err(e) => {
            error!("Failed to load {name}: {e}");
            return None;
        }
    };

    condition::resample_store(&mut hrtf, devrate);
    if let Some(size) = config.get_uint(devname, "hrtf-size") {
        condition::apply_size_override(&mut hrtf, size);
    }

    trace!(
        "Loaded HRTF {name} for sample rate {}hz, {}-sample filter",
        hrtf.sample_rate(),
        hrtf.ir_size()
    );
    let store = Arc::new(hrtf);
    loaded.insert(
        pos,
        LoadedHrtf {
            filename: fname,
            entry: Some(Arc::clone(&store)),
        },
    );

    Some(HrtfStoreRef { store })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::enumeration::{enumerate_hrtf, DEFAULT_HRTF_RESOURCE_ID};
    use crate::test_support::{
        v1_file, FakeConfig, FakeFiles, FakeResources, GLOBAL_STATE_LOCK, V1_IR_COUNT,
    };

    fn builtin_resources(rate: u32) -> FakeResources {
        let mut resources = FakeResources::default();
        resources
            .0
            .insert(DEFAULT_HRTF_RESOURCE_ID, v1_file(rate, &[0; V1_IR_COUNT]));
        resources
    }

    fn cache_len() -> usize {
        LOADED_HRTFS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[test]
    fn test_cache_hits_share_and_count_references() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::default();
        let resources = builtin_resources(44100);
        let list = enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);
        assert_eq!(list, ["Built-In HRTF"]);

        let first = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        assert_eq!(first.ref_count(), 1);
        assert_eq!(cache_len(), 1);

        let second = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        assert!(std::ptr::eq(&*first, &*second));
        assert_eq!(first.ref_count(), 2);
        assert_eq!(cache_len(), 1);

        // Dropping the last handle sweeps the slot; the next load parses again.
        drop(second);
        assert_eq!(first.ref_count(), 1);
        assert_eq!(cache_len(), 1);
        drop(first);
        assert_eq!(cache_len(), 0);

        let reloaded = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        assert_eq!(reloaded.ref_count(), 1);
        assert_eq!(cache_len(), 1);
    }

    #[test]
    fn test_clone_counts_a_reference() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::default();
        let resources = builtin_resources(44100);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);

        let handle = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        let cloned = handle.clone();
        assert_eq!(handle.ref_count(), 2);
        drop(cloned);
        assert_eq!(handle.ref_count(), 1);
        drop(handle);
        assert_eq!(cache_len(), 0);
    }

    #[test]
    fn test_each_device_rate_gets_its_own_store() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::default();
        let resources = builtin_resources(22050);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);

        let native = get_loaded_hrtf("Built-In HRTF", None, 22050, &config, &resources).unwrap();
        let doubled = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        assert!(!std::ptr::eq(&*native, &*doubled));
        assert_eq!(cache_len(), 2);

        assert_eq!(native.sample_rate(), 22050);
        assert_eq!(native.ir_size(), 8);
        assert_eq!(doubled.sample_rate(), 44100);
        assert_eq!(doubled.ir_size(), 16);

        drop(native);
        drop(doubled);
        assert_eq!(cache_len(), 0);
    }

    #[test]
    fn test_size_override_applies_on_load() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::with(&[("hrtf-size", "10")]);
        let resources = builtin_resources(22050);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);

        // Resampling doubles the 8-sample response to 16; the override clamps it back.
        let handle = get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &resources).unwrap();
        assert_eq!(handle.ir_size(), 10);
    }

    #[test]
    fn test_unknown_name_and_bad_data_return_none() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::default();
        let resources = builtin_resources(44100);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);

        assert!(get_loaded_hrtf("No Such HRTF", None, 44100, &config, &resources).is_none());

        // Garbage magic.
        let mut bad = FakeResources::default();
        bad.0
            .insert(DEFAULT_HRTF_RESOURCE_ID, b"NotPHR99............".to_vec());
        enumerate_hrtf(None, &config, &FakeFiles::default(), &bad);
        assert!(get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &bad).is_none());
        assert_eq!(cache_len(), 0);

        // Too short for even the magic.
        let mut short = FakeResources::default();
        short.0.insert(DEFAULT_HRTF_RESOURCE_ID, vec![0x4d, 0x69]);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &short);
        assert!(get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &short).is_none());
        assert_eq!(cache_len(), 0);
    }

    #[test]
    fn test_loads_from_a_real_file() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let path = std::env::temp_dir().join(format!("hrtf_data_test_{}.mhr", std::process::id()));
        std::fs::write(&path, v1_file(44100, &[0; V1_IR_COUNT])).unwrap();

        let config = FakeConfig::with(&[("hrtf-paths", "testdir")]);
        let mut files = FakeFiles::default();
        files
            .files
            .insert("testdir".to_string(), vec![path.clone()]);
        let resources = FakeResources::default();

        let list = enumerate_hrtf(None, &config, &files, &resources);
        assert_eq!(list.len(), 1);

        let handle = get_loaded_hrtf(&list[0], None, 44100, &config, &resources).unwrap();
        assert_eq!(handle.sample_rate(), 44100);
        assert_eq!(handle.ir_count(), V1_IR_COUNT);
        drop(handle);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_resource_returns_none() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = FakeConfig::default();

        // Enumerate with the resource present, then look it up with it gone.
        let resources = builtin_resources(44100);
        enumerate_hrtf(None, &config, &FakeFiles::default(), &resources);
        let gone = FakeResources::default();
        assert!(get_loaded_hrtf("Built-In HRTF", None, 44100, &config, &gone).is_none());
    }

    #[test]
    fn test_parse_resource_filename_forms() {
        assert_eq!(parse_resource_filename("!1_Built-In HRTF"), Some(1));
        assert_eq!(parse_resource_filename("!23_x"), Some(23));
        assert_eq!(parse_resource_filename("!_x"), None);
        assert_eq!(parse_resource_filename("!9"), None);
        assert_eq!(parse_resource_filename("/plain/path.mhr"), None);
    }
}
