//! Monitor elements: a statistics object plus the metadata that makes it
//! addressable, comparable against a reference, and subject to quality
//! tests.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::report::QualityTestReport;
use crate::stat::StatObject;

/// Draw hints and a style record carried alongside an element's statistics
/// object. Purely inert metadata: nothing in this crate reads it, it just
/// travels with the element for a downstream renderer to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawOptions {
    /// A ROOT-style draw string, e.g. `"hist"` or `"colz"`.
    pub draw_option: String,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub log_x: bool,
    pub log_y: bool,
}

/// Per-element flags a run-control or collector client toggles, orthogonal
/// to quality: whether the element resets at start-of-run,
/// whether it's eligible for archival, and whether updates should be
/// published to subscribers at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementFlags {
    pub reset_on_sor: bool,
    pub archive: bool,
    pub publish: bool,
}

impl Default for ElementFlags {
    fn default() -> Self {
        Self {
            reset_on_sor: true,
            archive: true,
            publish: true,
        }
    }
}

/// A booked statistics object plus its metadata: name, title, the object
/// itself, an optional reference to compare against, and draw hints for a
/// downstream renderer. Quality-test reports for an element live in the
/// owning [`crate::manager::MonitorElementManager`]'s
/// [`crate::report::ReportStorage`], keyed by the element's path and name,
/// not on the element itself.
///
/// Mutable fields (`title`, `object`, `reference`, `flags`, `draw_options`)
/// are individually `RwLock`-guarded rather than the whole element, so a
/// reader following a `Storage` content handle can inspect metadata while a
/// writer updates the object, without either blocking on an unrelated
/// field.
pub struct MonitorElement {
    name: String,
    title: RwLock<String>,
    object: RwLock<Box<dyn StatObject>>,
    reference: RwLock<Option<Arc<dyn StatObject>>>,
    flags: RwLock<ElementFlags>,
    draw_options: RwLock<DrawOptions>,
}

impl MonitorElement {
    pub fn new(name: impl Into<String>, object: Box<dyn StatObject>) -> Self {
        Self {
            name: name.into(),
            title: RwLock::new(String::new()),
            object: RwLock::new(object),
            reference: RwLock::new(None),
            flags: RwLock::new(ElementFlags::default()),
            draw_options: RwLock::new(DrawOptions::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> String {
        self.title.read().unwrap().clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.write().unwrap() = title.into();
    }

    pub fn draw_options(&self) -> DrawOptions {
        self.draw_options.read().unwrap().clone()
    }

    pub fn set_draw_options(&self, draw_options: DrawOptions) {
        *self.draw_options.write().unwrap() = draw_options;
    }

    pub fn type_tag(&self) -> &'static str {
        self.object.read().unwrap().type_tag()
    }

    pub fn flags(&self) -> ElementFlags {
        *self.flags.read().unwrap()
    }

    pub fn set_flags(&self, flags: ElementFlags) {
        *self.flags.write().unwrap() = flags;
    }

    pub fn set_reference(&self, reference: Arc<dyn StatObject>) {
        *self.reference.write().unwrap() = Some(reference);
    }

    pub fn reference(&self) -> Option<Arc<dyn StatObject>> {
        self.reference.read().unwrap().clone()
    }

    /// Runs `f` against the current object without replacing it — the
    /// common case for filling/reading in place.
    pub fn with_object<R>(&self, f: impl FnOnce(&dyn StatObject) -> R) -> R {
        f(self.object.read().unwrap().as_ref())
    }

    /// Replaces the object wholesale, e.g. after a start-of-run reset
    /// re-allocates a fresh one from the same descriptor.
    pub fn replace_object(&self, object: Box<dyn StatObject>) {
        *self.object.write().unwrap() = object;
    }
}

/// A [`MonitorElement`] as it travels across the transport fabric: the
/// element's path, name and a snapshot of its object, plus the collector-
/// side identity and subscription state layered on top of
/// `MonitorElement` (`runNumber`, `collectorName`, `moduleName`,
/// `description`, the `publish`/`subscribed` flags, and a cache of the
/// latest reports).
pub struct OnlineElement {
    pub path: Path,
    pub name: String,
    pub object: Box<dyn StatObject>,
    pub run_number: i64,
    pub collector_name: String,
    pub module_name: String,
    pub description: String,
    pub publish: bool,
    pub subscribed: bool,
    pub reports: Vec<QualityTestReport>,
}

/// The wire shape of an [`OnlineElement`]. Every metadata field round-trips
/// exactly; `object_bytes` is the opaque [`StatObject::archive_bytes`]
/// snapshot of the live object — reconstructing an actual
/// `Box<dyn StatObject>` from those bytes is an external statistics
/// library's job, so no `into_element` reconstructor is provided; callers
/// that need the object back reach for the allocator registry plus their
/// own decode of `object_bytes`, not this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineElementWire {
    pub path: String,
    pub name: String,
    pub type_tag: String,
    pub object_bytes: Vec<u8>,
    pub run_number: i64,
    pub collector_name: String,
    pub module_name: String,
    pub description: String,
    pub publish: bool,
    pub subscribed: bool,
    pub reports: Vec<QualityTestReport>,
}

impl OnlineElement {
    /// `reports` is the element's current report set, fetched by the
    /// caller from the owning manager's [`crate::report::ReportStorage`]
    /// (an [`OnlineElement`] carries only a cache of them, not the storage
    /// itself).
    pub fn from_element(
        path: Path,
        element: &MonitorElement,
        run_number: i64,
        collector_name: impl Into<String>,
        module_name: impl Into<String>,
        reports: Vec<QualityTestReport>,
    ) -> Self {
        let flags = element.flags();
        Self {
            path,
            name: element.name.clone(),
            object: element.with_object(StatObject::clone_box),
            run_number,
            collector_name: collector_name.into(),
            module_name: module_name.into(),
            description: String::new(),
            publish: flags.publish,
            subscribed: false,
            reports,
        }
    }

    /// Serializes this element's metadata and an opaque snapshot of its
    /// object for transport.
    pub fn to_wire(&self) -> OnlineElementWire {
        OnlineElementWire {
            path: self.path.to_string(),
            name: self.name.clone(),
            type_tag: self.object.type_tag().to_string(),
            object_bytes: self.object.archive_bytes(),
            run_number: self.run_number,
            collector_name: self.collector_name.clone(),
            module_name: self.module_name.clone(),
            description: self.description.clone(),
            publish: self.publish,
            subscribed: self.subscribed,
            reports: self.reports.clone(),
        }
    }
}
