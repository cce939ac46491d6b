//! Quality test reports and their aggregate storage across every monitor
//! element.
//!
//! A report carries a bounded quality scalar in `[0, 1]` alongside a
//! coarser flag drawn from a small lattice
//! (`SUCCESS`/`WARNING`/`ERROR`/`INVALID`/`INSUFFICIENT_STAT`/`UNDEFINED`);
//! the scalar is for ranking/trending, the flag is for at-a-glance
//! severity and for other qtests' threshold comparisons.

use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::status::{Error, Result};

/// Identifies one booked element by the directory path it lives in plus
/// its name within that directory (a directory can hold several elements).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementKey {
    pub path: String,
    pub name: String,
}

impl ElementKey {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// Coarse severity lattice a [`crate::quality::QualityTest`] report carries
/// alongside its quality scalar. Ordered worst-to-best is
/// `Invalid > Error > Warning > InsufficientStat > Undefined > Success`,
/// but callers compare via [`QFlag::severity`] rather than derived `Ord`,
/// since `Undefined` and `InsufficientStat` aren't really comparable to
/// the others.
///
/// Serializes as its lattice position (an integer), not a string, to match
/// the wire contract external report consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QFlag {
    Success,
    Undefined,
    InsufficientStat,
    Warning,
    Error,
    Invalid,
}

impl QFlag {
    /// A monotonically increasing severity order, used to fold several
    /// reports down to a single worst-case flag.
    pub fn severity(self) -> u8 {
        match self {
            QFlag::Success => 0,
            QFlag::Undefined => 1,
            QFlag::InsufficientStat => 2,
            QFlag::Warning => 3,
            QFlag::Error => 4,
            QFlag::Invalid => 5,
        }
    }

    fn from_severity(n: u8) -> Option<Self> {
        Some(match n {
            0 => QFlag::Success,
            1 => QFlag::Undefined,
            2 => QFlag::InsufficientStat,
            3 => QFlag::Warning,
            4 => QFlag::Error,
            5 => QFlag::Invalid,
            _ => return None,
        })
    }
}

impl Serialize for QFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.severity())
    }
}

impl<'de> Deserialize<'de> for QFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        QFlag::from_severity(n).ok_or_else(|| serde::de::Error::custom(format!("invalid QFlag lattice position: {n}")))
    }
}

/// The result of running one quality test against one monitor element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTestReport {
    pub qtest_name: String,
    pub algorithm: String,
    /// Bounded to `[0, 1]` by construction; `1.0` is the inclusive
    /// best-possible value — the `quality == 1` boundary counts as success,
    /// not merely "close to success".
    pub quality: f64,
    pub flag: QFlag,
    pub message: String,
    /// The configured test's own description, if it was given one.
    #[serde(default)]
    pub test_description: String,
    /// Identity of the element this report was run against, stamped in by
    /// the caller that has that context (the test algorithm itself only
    /// sees the bare statistics object).
    #[serde(default)]
    pub element_name: String,
    #[serde(default)]
    pub element_type: String,
    #[serde(default)]
    pub element_path: String,
    /// Auxiliary key/value data an algorithm may want to surface alongside
    /// `message`; unused by the built-in algorithms today.
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl QualityTestReport {
    pub fn new(
        qtest_name: impl Into<String>,
        algorithm: impl Into<String>,
        quality: f64,
        flag: QFlag,
        message: impl Into<String>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&quality) {
            return Err(Error::OutOfRange(format!(
                "quality {quality} is outside the required [0, 1] range"
            )));
        }
        Ok(Self {
            qtest_name: qtest_name.into(),
            algorithm: algorithm.into(),
            quality,
            flag,
            message: message.into(),
            test_description: String::new(),
            element_name: String::new(),
            element_type: String::new(),
            element_path: String::new(),
            extras: HashMap::new(),
        })
    }

    /// Stamps the configured test's own description onto this report.
    pub fn with_test_description(mut self, description: impl Into<String>) -> Self {
        self.test_description = description.into();
        self
    }

    /// Stamps the identity of the element this report was run against.
    pub fn with_element_identity(
        mut self,
        element_path: impl Into<String>,
        element_name: impl Into<String>,
        element_type: impl Into<String>,
    ) -> Self {
        self.element_path = element_path.into();
        self.element_name = element_name.into();
        self.element_type = element_type.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.flag == QFlag::Success
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Failure(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::InvalidParameter(e.to_string()))
    }
}

/// Returns `true` if `a`'s quality is strictly higher than `b`'s.
///
/// Both must already be within the documented `[0, 1]` contract;
/// `QualityTestReport::new` enforces that at construction, so this simply
/// compares — any value that reaches here out of range is a bug upstream,
/// not something this function re-validates.
pub fn reports_quality_higher(a: &QualityTestReport, b: &QualityTestReport) -> bool {
    a.quality > b.quality
}

pub fn reports_quality_lower(a: &QualityTestReport, b: &QualityTestReport) -> bool {
    a.quality < b.quality
}

/// Reports produced by quality tests across every monitor element, keyed
/// first by the element's `(path, name)` identity and then by test name —
/// so the whole set of reports attached to one element can be retrieved,
/// replaced or cleared as a unit, while reports for two elements that
/// happen to share a test name never collide.
#[derive(Default)]
pub struct ReportStorage {
    by_element: RwLock<IndexMap<ElementKey, IndexMap<String, QualityTestReport>>>,
}

impl ReportStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `report` under `key`, silently overwriting any prior report
    /// under the same element and test name.
    pub fn insert(&self, key: ElementKey, report: QualityTestReport) {
        self.by_element
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .insert(report.qtest_name.clone(), report);
    }

    /// Like [`ReportStorage::insert`], but returns the report it replaced,
    /// if any — a "warn on replace" mode, where the caller decides whether
    /// a replacement deserves a log line.
    pub fn insert_checked(&self, key: ElementKey, report: QualityTestReport) -> Option<QualityTestReport> {
        self.by_element
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .insert(report.qtest_name.clone(), report)
    }

    /// Every report attached to `key`'s element, in insertion order.
    pub fn for_element(&self, key: &ElementKey) -> Vec<QualityTestReport> {
        self.by_element
            .read()
            .unwrap()
            .get(key)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &ElementKey, qtest_name: &str) -> Option<QualityTestReport> {
        self.by_element.read().unwrap().get(key)?.get(qtest_name).cloned()
    }

    /// Every report across every element.
    pub fn all(&self) -> Vec<QualityTestReport> {
        self.by_element.read().unwrap().values().flat_map(|m| m.values().cloned()).collect()
    }

    /// Reports whose quality is at least `q`. `q` must lie in `[0, 1]`.
    pub fn filter_by_quality_at_least(&self, q: f64) -> Result<Vec<QualityTestReport>> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::OutOfRange(format!("quality threshold {q} is outside [0, 1]")));
        }
        Ok(self.all().into_iter().filter(|r| r.quality >= q).collect())
    }

    /// Reports whose quality is at most `q`. `q` must lie in `[0, 1]`.
    pub fn filter_by_quality_at_most(&self, q: f64) -> Result<Vec<QualityTestReport>> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::OutOfRange(format!("quality threshold {q} is outside [0, 1]")));
        }
        Ok(self.all().into_iter().filter(|r| r.quality <= q).collect())
    }

    pub fn filter_by_flag(&self, flag: QFlag) -> Vec<QualityTestReport> {
        self.all().into_iter().filter(|r| r.flag == flag).collect()
    }

    /// The single worst flag across every report attached to `key`'s
    /// element, or `None` if none are attached yet.
    pub fn worst_flag_for_element(&self, key: &ElementKey) -> Option<QFlag> {
        self.for_element(key).into_iter().map(|r| r.flag).max_by_key(|f| f.severity())
    }

    /// The single worst flag across every element.
    pub fn worst_flag(&self) -> Option<QFlag> {
        self.all().into_iter().map(|r| r.flag).max_by_key(|f| f.severity())
    }

    pub fn clear(&self) {
        self.by_element.write().unwrap().clear();
    }

    /// Drops every report attached to `key`'s element, e.g. when the
    /// element itself is removed.
    pub fn clear_element(&self, key: &ElementKey) {
        self.by_element.write().unwrap().shift_remove(key);
    }

    pub fn to_json(&self) -> Result<String> {
        let reports = self.all();
        serde_json::to_string(&reports).map_err(|e| Error::Failure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ElementKey {
        ElementKey::new("/det", name)
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        assert!(QualityTestReport::new("q", "Range", 1.5, QFlag::Error, "bad").is_err());
        assert!(QualityTestReport::new("q", "Range", -0.1, QFlag::Error, "bad").is_err());
    }

    #[test]
    fn quality_of_exactly_one_is_accepted() {
        let r = QualityTestReport::new("q", "Range", 1.0, QFlag::Success, "ok").unwrap();
        assert!(r.is_success());
    }

    #[test]
    fn flag_serializes_as_its_lattice_integer() {
        let r = QualityTestReport::new("q", "Range", 0.5, QFlag::Warning, "meh").unwrap();
        let json = r.to_json().unwrap();
        assert!(json.contains("\"flag\":3"));
    }

    #[test]
    fn two_elements_sharing_a_test_name_do_not_collide() {
        let storage = ReportStorage::new();
        storage.insert(key("h1"), QualityTestReport::new("q", "Range", 0.9, QFlag::Success, "ok").unwrap());
        storage.insert(key("h2"), QualityTestReport::new("q", "Range", 0.1, QFlag::Error, "bad").unwrap());

        assert_eq!(storage.for_element(&key("h1")).len(), 1);
        assert_eq!(storage.get(&key("h1"), "q").unwrap().quality, 0.9);
        assert_eq!(storage.get(&key("h2"), "q").unwrap().quality, 0.1);
        assert_eq!(storage.all().len(), 2);
    }

    #[test]
    fn worst_flag_picks_highest_severity() {
        let storage = ReportStorage::new();
        storage.insert(key("h1"), QualityTestReport::new("a", "Range", 1.0, QFlag::Success, "ok").unwrap());
        storage.insert(key("h1"), QualityTestReport::new("b", "Range", 0.2, QFlag::Warning, "meh").unwrap());
        storage.insert(key("h1"), QualityTestReport::new("c", "Range", 0.0, QFlag::Error, "bad").unwrap());
        assert_eq!(storage.worst_flag(), Some(QFlag::Error));
        assert_eq!(storage.worst_flag_for_element(&key("h1")), Some(QFlag::Error));
    }

    #[test]
    fn json_round_trips() {
        let r = QualityTestReport::new("q", "Range", 0.5, QFlag::Warning, "meh")
            .unwrap()
            .with_element_identity("/det", "h1", "TH1D");
        let json = r.to_json().unwrap();
        let back = QualityTestReport::from_json(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn filter_by_quality_rejects_out_of_range_threshold() {
        let storage = ReportStorage::new();
        assert!(storage.filter_by_quality_at_least(1.5).is_err());
        assert!(storage.filter_by_quality_at_most(-0.1).is_err());
    }

    #[test]
    fn filter_by_quality_bounds_are_inclusive() {
        let storage = ReportStorage::new();
        storage.insert(key("h1"), QualityTestReport::new("a", "Range", 0.5, QFlag::Warning, "").unwrap());
        storage.insert(key("h2"), QualityTestReport::new("b", "Range", 0.9, QFlag::Success, "").unwrap());
        assert_eq!(storage.filter_by_quality_at_least(0.5).unwrap().len(), 2);
        assert_eq!(storage.filter_by_quality_at_least(0.6).unwrap().len(), 1);
        assert_eq!(storage.filter_by_quality_at_most(0.5).unwrap().len(), 1);
    }

    #[test]
    fn insert_checked_reports_prior_value() {
        let storage = ReportStorage::new();
        assert!(storage.insert_checked(key("h1"), QualityTestReport::new("a", "Range", 0.1, QFlag::Error, "").unwrap()).is_none());
        let prior = storage.insert_checked(key("h1"), QualityTestReport::new("a", "Range", 0.9, QFlag::Success, "").unwrap());
        assert_eq!(prior.unwrap().quality, 0.1);
    }

    #[test]
    fn clear_element_only_drops_that_elements_reports() {
        let storage = ReportStorage::new();
        storage.insert(key("h1"), QualityTestReport::new("a", "Range", 0.5, QFlag::Warning, "").unwrap());
        storage.insert(key("h2"), QualityTestReport::new("a", "Range", 0.5, QFlag::Warning, "").unwrap());
        storage.clear_element(&key("h1"));
        assert!(storage.for_element(&key("h1")).is_empty());
        assert_eq!(storage.for_element(&key("h2")).len(), 1);
    }

    #[test]
    fn quality_comparison_helpers() {
        let hi = QualityTestReport::new("q", "Range", 0.9, QFlag::Success, "").unwrap();
        let lo = QualityTestReport::new("q", "Range", 0.1, QFlag::Error, "").unwrap();
        assert!(reports_quality_higher(&hi, &lo));
        assert!(reports_quality_lower(&lo, &hi));
        assert!(!reports_quality_higher(&lo, &hi));
    }
}
