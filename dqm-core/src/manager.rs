//! [`MonitorElementManager`]: the glue between storage, the allocator
//! registry and the quality-test registry.
//!
//! Bookings go through here rather than directly against [`Storage`] so
//! that every monitor element is created via the allocator registry (never
//! constructed ad hoc) and so quality-test attachment/execution has a
//! single place to look elements up by path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::instrument;

use crate::alloc;
use crate::element::MonitorElement;
use crate::path::Path;
use crate::quality::{self, ConfiguredQualityTest};
use crate::report::{ElementKey, QualityTestReport, ReportStorage};
use crate::signal::Signal;
use crate::stat::StatObject;
use crate::status::{Error, Result};
use crate::storage::Storage;
use crate::xml::XmlElement;

pub struct MonitorElementManager {
    storage: Storage<MonitorElement>,
    named_tests: RwLock<HashMap<String, Arc<ConfiguredQualityTest>>>,
    attachments: RwLock<HashMap<ElementKey, Vec<String>>>,
    /// Quality-test reports across every booked element, keyed by
    /// `(path, name)` — the aggregate [`run_quality_tests`] writes into and
    /// that a transport layer reads back from, rather than each element
    /// carrying its own reports.
    reports: ReportStorage,
    /// Emits the path a new element was booked under, e.g. for a
    /// transport layer to push an "element created" notification.
    pub booked: Signal<Path>,
}

impl Default for MonitorElementManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorElementManager {
    pub fn new() -> Self {
        Self {
            storage: Storage::new(),
            named_tests: RwLock::new(HashMap::new()),
            attachments: RwLock::new(HashMap::new()),
            reports: ReportStorage::new(),
            booked: Signal::new(),
        }
    }

    pub fn storage(&self) -> &Storage<MonitorElement> {
        &self.storage
    }

    /// The aggregate store of every element's quality-test reports.
    pub fn reports(&self) -> &ReportStorage {
        &self.reports
    }

    /// Reports currently attached to the named element, in insertion order.
    pub fn element_reports(&self, dir_path: &str, element_name: &str) -> Vec<QualityTestReport> {
        self.reports.for_element(&ElementKey::new(dir_path, element_name))
    }

    /// Books a new monitor element from a `<monitorElement>` descriptor
    ///, allocating the backing object via the global allocator
    /// registry.
    #[instrument(skip(self, desc))]
    pub fn book_from_xml(&self, desc: &XmlElement, dir_path: Option<&str>) -> Result<Path> {
        let name = desc.require("name")?.to_string();
        let object = alloc::global().allocate(desc)?;
        self.book(name, object, dir_path)
    }

    /// Books a pre-constructed statistics object directly, bypassing XML
    /// descriptors — the path a collector takes when it already has the
    /// object it wants to publish.
    pub fn book(&self, name: impl Into<String>, object: Box<dyn StatObject>, dir_path: Option<&str>) -> Result<Path> {
        let name = name.into();
        let element = Arc::new(MonitorElement::new(name, object));
        let path = self.storage.add(element, dir_path)?;
        self.booked.emit(&path);
        Ok(path)
    }

    /// Constructs a quality test from a `<qtest>` descriptor and remembers
    /// it under its name for later attachment, without running it against
    /// anything yet.
    pub fn create_quality_test(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>> {
        let test = quality::global().create(desc)?;
        self.named_tests.write().unwrap().insert(test.name().to_string(), test.clone());
        Ok(test)
    }

    /// Attaches a previously created test (by name) to the element named
    /// `element_name` living in the directory at `dir_path`.
    pub fn add_quality_test(&self, dir_path: &str, element_name: &str, test_name: &str) -> Result<()> {
        if !self.named_tests.read().unwrap().contains_key(test_name) {
            return Err(Error::NotFound(format!("no quality test named {test_name:?} was created")));
        }
        let dir = self.storage.find(dir_path)?;
        if !dir.contents().iter().any(|e| e.name() == element_name) {
            return Err(Error::NotFound(format!("no element named {element_name:?} in {dir_path}")));
        }
        let key = ElementKey::new(dir_path, element_name);
        let mut attachments = self.attachments.write().unwrap();
        let names = attachments.entry(key).or_default();
        if !names.iter().any(|n| n == test_name) {
            names.push(test_name.to_string());
        }
        Ok(())
    }

    /// Runs every quality test attached to the named element, stamping each
    /// report with the element's identity and storing it in the aggregate
    /// [`ReportStorage`], keyed by `(dir_path, element_name)`.
    #[instrument(skip(self))]
    pub fn run_quality_tests(&self, dir_path: &str, element_name: &str) -> Result<Vec<QualityTestReport>> {
        let dir = self.storage.find(dir_path)?;
        let element = dir
            .contents()
            .into_iter()
            .find(|e| e.name() == element_name)
            .ok_or_else(|| Error::NotFound(format!("no element named {element_name:?} in {dir_path}")))?;

        let key = ElementKey::new(dir_path, element_name);
        let test_names = self.attachments.read().unwrap().get(&key).cloned().unwrap_or_default();
        let named_tests = self.named_tests.read().unwrap();

        let mut reports = Vec::with_capacity(test_names.len());
        for test_name in &test_names {
            let test = named_tests
                .get(test_name)
                .ok_or_else(|| Error::NotFound(format!("quality test {test_name:?} was attached but no longer exists")))?;
            let reference = element.reference();
            let report = element
                .with_object(|obj| test.run(obj, reference.as_deref()))
                .with_element_identity(dir_path, element_name, element.type_tag());
            self.reports.insert(key.clone(), report.clone());
            reports.push(report);
        }
        Ok(reports)
    }

    /// Resets storage and the report aggregate to empty, e.g. on
    /// start-of-run.
    pub fn clear(&self) {
        self.storage.clear();
        self.attachments.write().unwrap().clear();
        self.reports.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_run_and_fetch_report_scenario() {
        let manager = MonitorElementManager::new();
        let desc = XmlElement::parse(
            r#"<monitorElement type="TH1D" name="h1" nBinsX="10" minX="0" maxX="10"/>"#,
        )
        .unwrap();
        let path = manager.book_from_xml(&desc, Some("/det/sub")).unwrap();
        assert_eq!(path.to_string(), "/det/sub");

        let qtest_desc = XmlElement::parse(
            r#"<qtest type="XRange" name="q1"><param key="xmin" value="0"/><param key="xmax" value="10"/></qtest>"#,
        )
        .unwrap();
        manager.create_quality_test(&qtest_desc).unwrap();
        manager.add_quality_test("/det/sub", "h1", "q1").unwrap();

        let reports = manager.run_quality_tests("/det/sub", "h1").unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].qtest_name, "q1");
        assert_eq!(reports[0].element_name, "h1");
        assert_eq!(reports[0].element_path, "/det/sub");
        assert_eq!(reports[0].element_type, "TH1D");

        let stored = manager.element_reports("/det/sub", "h1");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].qtest_name, "q1");
    }

    #[test]
    fn reports_for_two_elements_sharing_a_test_name_do_not_collide() {
        let manager = MonitorElementManager::new();
        let h1 = XmlElement::parse(r#"<monitorElement type="TH1D" name="h1" nBinsX="10" minX="0" maxX="10"/>"#).unwrap();
        let h2 = XmlElement::parse(r#"<monitorElement type="TH1D" name="h2" nBinsX="10" minX="0" maxX="10"/>"#).unwrap();
        manager.book_from_xml(&h1, Some("/a")).unwrap();
        manager.book_from_xml(&h2, Some("/b")).unwrap();

        let qtest_desc = XmlElement::parse(
            r#"<qtest type="XRange" name="q1"><param key="xmin" value="0"/><param key="xmax" value="10"/></qtest>"#,
        )
        .unwrap();
        manager.create_quality_test(&qtest_desc).unwrap();
        manager.add_quality_test("/a", "h1", "q1").unwrap();
        manager.add_quality_test("/b", "h2", "q1").unwrap();

        manager.run_quality_tests("/a", "h1").unwrap();
        manager.run_quality_tests("/b", "h2").unwrap();

        assert_eq!(manager.element_reports("/a", "h1").len(), 1);
        assert_eq!(manager.element_reports("/b", "h2").len(), 1);
        assert_eq!(manager.reports().all().len(), 2);
    }

    #[test]
    fn booked_signal_fires_on_booking() {
        let manager = MonitorElementManager::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        manager.booked.connect(move |p: &Path| s.lock().unwrap().push(p.to_string()));

        let desc = XmlElement::parse(r#"<monitorElement type="int" name="n"/>"#).unwrap();
        manager.book_from_xml(&desc, None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/"]);
    }

    #[test]
    fn add_quality_test_rejects_unknown_element() {
        let manager = MonitorElementManager::new();
        let qtest_desc = XmlElement::parse(
            r#"<qtest type="DeadChannel" name="q1"/>"#,
        )
        .unwrap();
        manager.create_quality_test(&qtest_desc).unwrap();
        assert!(manager.add_quality_test("/", "missing", "q1").is_err());
    }
}
