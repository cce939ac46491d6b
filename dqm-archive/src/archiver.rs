//! `Archiver`: snapshots a [`Storage`] tree into a tar-structured container
//! file.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dqm_core::{Directory, MonitorElement, Storage};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::naming;

/// `open`'s write mode, matching the ROOT `TFile`-style vocabulary the
/// original framework's descriptors use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start from an empty container, discarding any prior content at the
    /// resolved path.
    Recreate,
    /// Preserve entries already in the file at the resolved path, if any.
    Update,
}

impl std::str::FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RECREATE" => Ok(OpenMode::Recreate),
            "UPDATE" => Ok(OpenMode::Update),
            other => Err(Error::InvalidParameter(format!("unknown archive open mode {other:?}"))),
        }
    }
}

struct OpenArchive {
    final_path: PathBuf,
    builder: tar::Builder<File>,
}

/// Writes a recursive mirror of a [`Storage<MonitorElement>`] directory
/// tree into a single open container file. Only one file may be open at a
/// time; operations fail `NotAllowed` while closed.
pub struct Archiver {
    open: Mutex<Option<OpenArchive>>,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver {
    pub fn new() -> Self {
        Self { open: Mutex::new(None) }
    }

    pub fn is_open(&self) -> bool {
        self.open.lock().unwrap().is_some()
    }

    #[instrument(skip(self))]
    pub fn open(&self, name: &str, mode: &str, overwrite: bool, run_number: Option<i64>) -> Result<()> {
        let mode: OpenMode = mode.parse()?;
        let final_path = naming::resolve(name, run_number, overwrite);

        let mut builder = if mode == OpenMode::Update && final_path.exists() {
            let preserved = copy_existing_entries(&final_path)?;
            let mut builder = tar::Builder::new(File::create(&final_path)?);
            for (header, data) in preserved {
                let mut header = header;
                builder.append_data(&mut header, header_path(&header)?, data.as_slice())?;
            }
            builder
        } else {
            tar::Builder::new(File::create(&final_path)?)
        };
        builder.mode(tar::HeaderMode::Deterministic);

        *self.open.lock().unwrap() = Some(OpenArchive { final_path, builder });
        Ok(())
    }

    /// Flushes and releases the open file. Further archive operations fail
    /// `NotAllowed` until `open` succeeds again.
    #[instrument(skip(self))]
    pub fn close(&self) -> Result<()> {
        let open = self.open.lock().unwrap().take().ok_or(Error::NotAllowed)?;
        open.builder.into_inner()?;
        Ok(())
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.open.lock().unwrap().as_ref().map(|o| o.final_path.clone())
    }

    /// Archives every element under `dir` (root if empty) for which
    /// `selector` returns `true`. Returns the number of elements written.
    #[instrument(skip(self, storage, selector))]
    pub fn archive_selected(
        &self,
        storage: &Storage<MonitorElement>,
        dir: &str,
        ref_suffix: Option<&str>,
        selector: &dyn Fn(&MonitorElement) -> bool,
    ) -> Result<usize> {
        let lookup = if dir.is_empty() { "/" } else { dir };
        let base = storage.find(lookup).map_err(|_| Error::NotFound(dir.to_string()))?;

        let mut guard = self.open.lock().unwrap();
        let open = guard.as_mut().ok_or(Error::NotAllowed)?;

        let mut count = 0usize;
        let mut first_error: Option<Error> = None;
        base.walk_preorder(&mut |d: &Arc<Directory<MonitorElement>>| {
            let dir_path = d.full_path().to_string();
            let prefix = dir_path.trim_end_matches('/');
            for element in d.contents() {
                if !selector(&element) {
                    continue;
                }
                let entry_path = format!("{prefix}/{}", element.name());
                let entry_path = entry_path.trim_start_matches('/');
                let bytes = element.with_object(|obj| obj.archive_bytes());
                if let Err(e) = append_bytes(&mut open.builder, entry_path, &bytes) {
                    first_error = Some(e.into());
                    return false;
                }
                if let (Some(suffix), Some(reference)) = (ref_suffix, element.reference()) {
                    let ref_path = format!("{entry_path}{suffix}");
                    if let Err(e) = append_bytes(&mut open.builder, &ref_path, &reference.archive_bytes()) {
                        first_error = Some(e.into());
                        return false;
                    }
                }
                count += 1;
            }
            true
        });

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    pub fn archive(&self, storage: &Storage<MonitorElement>, dir: &str) -> Result<usize> {
        self.archive_selected(storage, dir, None, &|_| true)
    }

    pub fn archive_with_references(&self, storage: &Storage<MonitorElement>, dir: &str, ref_suffix: &str) -> Result<usize> {
        self.archive_selected(storage, dir, Some(ref_suffix), &|_| true)
    }
}

fn append_bytes(builder: &mut tar::Builder<File>, path: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)
}

fn copy_existing_entries(path: &std::path::Path) -> Result<Vec<(tar::Header, Vec<u8>)>> {
    use std::io::Read;

    let mut archive = tar::Archive::new(File::open(path)?);
    let mut preserved = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        preserved.push((entry.header().clone(), data));
    }
    Ok(preserved)
}

fn header_path(header: &tar::Header) -> Result<PathBuf> {
    Ok(header.path()?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqm_core::{Hist1D, MonitorElementManager, NumericKind};

    fn manager_with_elements() -> MonitorElementManager {
        let manager = MonitorElementManager::new();
        manager.storage().mkdir("a/b").unwrap();
        manager.storage().cd_root();
        manager
            .book("h1", Box::new(Hist1D::new(NumericKind::Float, 10, 0.0, 1.0)), Some("a/b"))
            .unwrap();
        manager
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let archiver = Archiver::new();
        assert!(matches!(archiver.open("x.root", "BOGUS", true, None), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn operations_before_open_fail_not_allowed() {
        let archiver = Archiver::new();
        let manager = manager_with_elements();
        let result = archiver.archive(manager.storage(), "");
        assert!(matches!(result, Err(Error::NotAllowed)));
        assert!(matches!(archiver.close(), Err(Error::NotAllowed)));
    }

    #[test]
    fn archive_writes_every_element_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("snapshot.root");
        let archiver = Archiver::new();
        archiver.open(target.to_str().unwrap(), "RECREATE", true, None).unwrap();

        let manager = manager_with_elements();
        let count = archiver.archive(manager.storage(), "").unwrap();
        assert_eq!(count, 1);
        archiver.close().unwrap();

        let mut read_back = tar::Archive::new(File::open(&target).unwrap());
        let names: Vec<String> = read_back
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a/b/h1".to_string()]);
    }

    #[test]
    fn selector_filters_elements() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("snapshot.root");
        let archiver = Archiver::new();
        archiver.open(target.to_str().unwrap(), "RECREATE", true, None).unwrap();

        let manager = manager_with_elements();
        let count = archiver.archive_selected(manager.storage(), "", None, &|_| false).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn archive_uniqueness_scenario_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a.root")).unwrap();
        let archiver = Archiver::new();
        archiver.open(dir.path().join("a.root").to_str().unwrap(), "RECREATE", false, None).unwrap();
        assert_eq!(archiver.current_path().unwrap(), dir.path().join("a_1.root"));
    }
}
