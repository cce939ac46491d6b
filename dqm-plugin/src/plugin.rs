//! Loads third-party quality-test/allocator plugins from shared objects
//! into the process-wide allocator and quality-test registries.
//!
//! A plugin is a dynamic library exporting two `extern "C"` symbols:
//!
//! - `dqm_plugin_api_version() -> u32` — must equal [`PLUGIN_API_VERSION`].
//! - `dqm_plugin_register(&'static AllocatorRegistry, &'static QTestRegistry)`
//!   — registers whatever allocators/quality-test factories the plugin
//!   provides into the process-wide singletons.
//!
//! Loaded libraries are intentionally leaked: `dlclose`-ing a library whose
//! code registered trait objects still referenced by the singleton
//! registries would leave dangling vtables behind, so every `Library` this
//! manager opens outlives the process instead.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dqm_core::{alloc, quality, AllocatorRegistry, QTestRegistry};
use libloading::{Library, Symbol};
use tracing::instrument;

use crate::error::{Error, Result};

pub const PLUGIN_API_VERSION: u32 = 1;

type ApiVersionFn = unsafe extern "C" fn() -> u32;
type RegisterFn = unsafe extern "C" fn(&'static AllocatorRegistry, &'static QTestRegistry);

/// Discovers and loads plugins, keeping every opened [`Library`] alive for
/// the remainder of the process.
#[derive(Default)]
pub struct PluginManager {
    loaded: Mutex<Vec<PathBuf>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.loaded.lock().unwrap().clone()
    }

    /// Loads every shared object directly inside `dir` (non-recursive —
    /// plugin directories aren't expected to nest). Returns how many
    /// loaded successfully; the first load failure aborts the scan.
    #[instrument(skip(self))]
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.display().to_string()));
        }
        let extension = std::env::consts::DLL_EXTENSION;
        let mut count = 0;
        for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::Load { path: dir.display().to_string(), message: e.to_string() })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            self.load_file(path)?;
            count += 1;
        }
        Ok(count)
    }

    /// Loads a single plugin file.
    #[instrument(skip(self))]
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let library = unsafe { Library::new(path) }
            .map_err(|source| Error::Load { path: path.display().to_string(), message: source.to_string() })?;
        // Leaked for the process lifetime: see module docs.
        let library: &'static Library = Box::leak(Box::new(library));

        let api_version: Symbol<ApiVersionFn> = unsafe { library.get(b"dqm_plugin_api_version\0") }
            .map_err(|source| Error::Load { path: path.display().to_string(), message: source.to_string() })?;
        let version = unsafe { api_version() };
        if version != PLUGIN_API_VERSION {
            return Err(Error::InvalidParameter(
                path.display().to_string(),
                format!("plugin API version {version} does not match {PLUGIN_API_VERSION}"),
            ));
        }

        let register: Symbol<RegisterFn> = unsafe { library.get(b"dqm_plugin_register\0") }
            .map_err(|source| Error::Load { path: path.display().to_string(), message: source.to_string() })?;
        unsafe { register(alloc::global(), quality::global()) };

        self.loaded.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}
