//! Discovery of available HRTF data sets.

use std::sync::{Mutex, PoisonError};

use log::{trace, warn};

use crate::sources::{ConfigSource, DataFileSource, ResourceSource};

/// One discovered data set: the name shown to users and the file it loads from.  The filename is
/// either a real path or the synthetic `!<residx>_<name>` form for an embedded resource.
pub(crate) struct HrtfEntry {
    pub disp_name: String,
    pub filename: String,
}

/// Everything [enumerate_hrtf] found, in presentation order.
pub(crate) static ENUMERATED_HRTFS: Mutex<Vec<HrtfEntry>> = Mutex::new(Vec::new());

/// Resource id of the data set embedded in the host binary, when there is one.
pub(crate) const DEFAULT_HRTF_RESOURCE_ID: u32 = 1;

fn name_taken(entries: &[HrtfEntry], name: &str) -> bool {
    entries.iter().any(|e| e.disp_name == name)
}

/// Derive a display name from `base`, appending " #N" (from 2 up) until it is unique.
fn unique_disp_name(entries: &[HrtfEntry], base: &str) -> String {
    let mut name = base.to_string();
    let mut count = 1;
    while name_taken(entries, &name) {
        count += 1;
        name = format!("{base} #{count}");
    }
    name
}

fn add_file_entry(entries: &mut Vec<HrtfEntry>, filename: &str) {
    if entries.iter().any(|e| e.filename == filename) {
        trace!("Skipping duplicate file entry {filename}");
        return;
    }

    let name_pos = filename
        .rfind('/')
        .or_else(|| filename.rfind('\\'))
        .map_or(0, |p| p + 1);
    let ext_pos = match filename.rfind('.') {
        Some(p) if p > name_pos => p,
        _ => filename.len(),
    };
    let basename = &filename[name_pos..ext_pos];

    let disp_name = unique_disp_name(entries, basename);
    trace!("Adding file entry \"{filename}\"");
    entries.push(HrtfEntry {
        disp_name,
        filename: filename.to_string(),
    });
}

fn add_builtin_entry(entries: &mut Vec<HrtfEntry>, disp_name: &str, residx: u32) {
    let filename = format!("!{residx}_{disp_name}");
    if entries.iter().any(|e| e.filename == filename) {
        trace!("Skipping duplicate file entry {filename}");
        return;
    }

    let disp_name = unique_disp_name(entries, disp_name);
    trace!("Adding built-in entry \"{filename}\"");
    entries.push(HrtfEntry {
        disp_name,
        filename,
    });
}

/// Rebuild the list of available data sets and return their display names.
///
/// The configured `hrtf-paths` option is a comma- or whitespace-separated list of search paths.
/// The default locations (the `openal/hrtf` data path plus the embedded data set, if present)
/// are also searched unless the option's final entry ends the list without a trailing comma; a
/// trailing comma, or no configured paths at all, keeps the defaults on.
///
/// When a `default-hrtf` option names an enumerated entry, that entry is rotated to the front of
/// the returned list.
pub fn enumerate_hrtf(
    devname: Option<&str>,
    config: &dyn ConfigSource,
    files: &dyn DataFileSource,
    resources: &dyn ResourceSource,
) -> Vec<String> {
    let mut entries = ENUMERATED_HRTFS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    entries.clear();

    let mut use_defaults = true;
    if let Some(pathlist) = config.get_str(devname, "hrtf-paths") {
        let mut rest = pathlist.as_str();
        loop {
            let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if trimmed.is_empty() {
                break;
            }

            let (entry, next) = match trimmed.find(',') {
                Some(pos) => (&trimmed[..pos], Some(&trimmed[pos + 1..])),
                None => {
                    use_defaults = false;
                    (trimmed, None)
                }
            };

            let entry = entry.trim_end();
            if !entry.is_empty() {
                for fname in files.search(".mhr", entry) {
                    add_file_entry(&mut entries, &fname.to_string_lossy());
                }
            }

            match next {
                Some(next) => rest = next,
                None => break,
            }
        }
    }

    if use_defaults {
        for fname in files.search(".mhr", "openal/hrtf") {
            add_file_entry(&mut entries, &fname.to_string_lossy());
        }

        if !resources.get(DEFAULT_HRTF_RESOURCE_ID).is_empty() {
            add_builtin_entry(&mut entries, "Built-In HRTF", DEFAULT_HRTF_RESOURCE_ID);
        }
    }

    let mut list: Vec<String> = entries.iter().map(|e| e.disp_name.clone()).collect();

    if let Some(default_name) = config.get_str(devname, "default-hrtf") {
        match list.iter().position(|name| *name == default_name) {
            None => warn!("Failed to find default HRTF \"{default_name}\""),
            Some(pos) => list[..=pos].rotate_right(1),
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::{FakeConfig, FakeFiles, FakeResources, GLOBAL_STATE_LOCK};

    #[test]
    fn test_defaults_follow_trailing_separator_rule() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let files = FakeFiles::with("some/path", &["/data/a.mhr"]);
        let resources = FakeResources::default();

        // A bare final entry turns the defaults off.
        let config = FakeConfig::with(&[("hrtf-paths", "some/path")]);
        let list = enumerate_hrtf(None, &config, &files, &resources);
        assert_eq!(list, ["a"]);
        assert_eq!(*files.searches.lock().unwrap(), ["some/path"]);

        // A trailing comma leaves them on.
        files.searches.lock().unwrap().clear();
        let config = FakeConfig::with(&[("hrtf-paths", "some/path,")]);
        enumerate_hrtf(None, &config, &files, &resources);
        assert_eq!(*files.searches.lock().unwrap(), ["some/path", "openal/hrtf"]);

        // No option at all searches only the defaults.
        files.searches.lock().unwrap().clear();
        enumerate_hrtf(None, &FakeConfig::default(), &files, &resources);
        assert_eq!(*files.searches.lock().unwrap(), ["openal/hrtf"]);
    }

    #[test]
    fn test_path_list_entries_are_trimmed_and_split() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut files = FakeFiles::default();
        files
            .files
            .insert("one".to_string(), vec!["/data/one/x.mhr".into()]);
        files
            .files
            .insert("two".to_string(), vec!["/data/two/y.mhr".into()]);
        let config = FakeConfig::with(&[("hrtf-paths", "  one , two ")]);

        let list = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(list, ["x", "y"]);
        assert_eq!(*files.searches.lock().unwrap(), ["one", "two"]);
    }

    #[test]
    fn test_display_names_deduplicate() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let files = FakeFiles::with(
            "p",
            &["/first/set.mhr", "/second/set.mhr", "/third/set.mhr", "/first/set.mhr"],
        );
        let config = FakeConfig::with(&[("hrtf-paths", "p")]);

        let list = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(list, ["set", "set #2", "set #3"]);

        // Re-enumerating gives the same names in the same order.
        let again = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(again, list);
    }

    #[test]
    fn test_default_hrtf_rotates_to_front() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let files = FakeFiles::with("p", &["/d/A.mhr", "/d/B.mhr", "/d/C.mhr"]);

        let config = FakeConfig::with(&[("hrtf-paths", "p"), ("default-hrtf", "B")]);
        let list = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(list, ["B", "A", "C"]);

        // A missing default leaves the order alone.
        let config = FakeConfig::with(&[("hrtf-paths", "p"), ("default-hrtf", "Z")]);
        let list = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(list, ["A", "B", "C"]);
    }

    #[test]
    fn test_builtin_resource_is_listed() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut resources = FakeResources::default();
        resources
            .0
            .insert(DEFAULT_HRTF_RESOURCE_ID, vec![1, 2, 3]);

        let list = enumerate_hrtf(None, &FakeConfig::default(), &FakeFiles::default(), &resources);
        assert_eq!(list, ["Built-In HRTF"]);

        let entries = ENUMERATED_HRTFS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        assert_eq!(entries[0].filename, "!1_Built-In HRTF");
    }

    #[test]
    fn test_basename_handles_separators_and_extensions() {
        let _guard = GLOBAL_STATE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let files = FakeFiles::with(
            "p",
            &["C:\\data\\win.mhr", "relative.mhr", "/dotted.dir/noext"],
        );
        let config = FakeConfig::with(&[("hrtf-paths", "p")]);

        let list = enumerate_hrtf(None, &config, &files, &FakeResources::default());
        assert_eq!(list, ["win", "relative", "noext"]);
    }
}
