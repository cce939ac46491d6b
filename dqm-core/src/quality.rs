//! Quality tests: pluggable algorithms that grade a statistics object (and
//! optionally compare it against a reference) into a [`QualityTestReport`]
//!.
//!
//! [`QualityTestAlgorithm`] is the narrow, user-supplied hook (the
//! equivalent of a `userRun`); [`ConfiguredQualityTest::run`] implements
//! the canonical execution flow around it — the insufficient-statistics
//! short-circuit, the failure guard around the user hook, and the
//! quality-to-flag classification — so every algorithm gets that behavior
//! for free rather than reimplementing it.
//!
//! Tests are registered and looked up by algorithm tag the same way
//! allocators are (see [`crate::alloc`]) — a process-wide, append-only
//! registry populated with built-ins and open to plugin extension.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::report::{QFlag, QualityTestReport};
use crate::stat::{Hist1D, Hist2D, Scalar, StatObject};
use crate::status::{Error, Result};
use crate::xml::XmlElement;

/// The user-supplied part of a quality test: compute a raw quality scalar
/// (not yet validated into `[0, 1]`) and a diagnostic message, or fail.
/// [`ConfiguredQualityTest::run`] runs this under a failure guard — a
/// returned `Err` never propagates past `run`, it becomes an `INVALID`
/// report instead.
pub trait QualityTestAlgorithm: Send + Sync {
    fn algorithm(&self) -> &'static str;

    fn user_run(&self, object: &dyn StatObject, reference: Option<&dyn StatObject>) -> std::result::Result<(f64, String), String>;

    /// Whether `object` carries enough data for this algorithm to produce
    /// a meaningful verdict. Defaults to always-true; algorithms with a
    /// minimum-entries requirement override it.
    fn enough_statistics(&self, _object: &dyn StatObject) -> bool {
        true
    }
}

struct Limits {
    warning: f64,
    error: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { warning: 1.0, error: 0.0 }
    }
}

fn validate_limits(warning: f64, error: f64) -> Result<()> {
    if error > warning || warning < 0.0 || error > 1.0 {
        return Err(Error::InvalidParameter(format!(
            "invalid qtest limits: warning={warning}, error={error} (need 0 <= error <= warning <= 1)"
        )));
    }
    Ok(())
}

/// A named, configured instance of a [`QualityTestAlgorithm`], with its own
/// warning/error thresholds.
pub struct ConfiguredQualityTest {
    name: String,
    description: RwLock<String>,
    limits: RwLock<Limits>,
    algorithm: Arc<dyn QualityTestAlgorithm>,
}

impl ConfiguredQualityTest {
    pub fn new(name: impl Into<String>, algorithm: Arc<dyn QualityTestAlgorithm>) -> Self {
        Self {
            name: name.into(),
            description: RwLock::new(String::new()),
            limits: RwLock::new(Limits::default()),
            algorithm,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.read().unwrap().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write().unwrap() = description.into();
    }

    pub fn algorithm_tag(&self) -> &'static str {
        self.algorithm.algorithm()
    }

    /// Rejects `err > warn`, `warn < 0`, `err > 1` with `INVALID_PARAMETER`
    ///.
    pub fn set_limits(&self, warning: f64, error: f64) -> Result<()> {
        validate_limits(warning, error)?;
        *self.limits.write().unwrap() = Limits { warning, error };
        Ok(())
    }

    /// The canonical execution flow: short-circuit on
    /// insufficient statistics, run the user hook under a failure guard,
    /// then classify into the flag lattice. Never fails — any failure
    /// becomes an `INVALID` report rather than a propagated error.
    pub fn run(&self, object: &dyn StatObject, reference: Option<&dyn StatObject>) -> QualityTestReport {
        if !self.algorithm.enough_statistics(object) {
            return self.report(0.0, QFlag::InsufficientStat, "not enough statistics to evaluate this test");
        }

        match self.algorithm.user_run(object, reference) {
            Err(message) => self.report(0.0, QFlag::Invalid, format!("{message} (quality test failed)")),
            Ok((quality, message)) => {
                if !(0.0..=1.0).contains(&quality) {
                    return self.report(0.0, QFlag::Invalid, format!("{message} (quality {quality} outside [0, 1])"));
                }
                let limits = self.limits.read().unwrap();
                let flag = if quality < limits.error {
                    QFlag::Error
                } else if quality < limits.warning {
                    QFlag::Warning
                } else {
                    QFlag::Success
                };
                self.report(quality, flag, message)
            }
        }
    }

    fn report(&self, quality: f64, flag: QFlag, message: impl Into<String>) -> QualityTestReport {
        QualityTestReport::new(&self.name, self.algorithm.algorithm(), quality, flag, message)
            .expect("quality is always clamped to [0, 1] before this call")
            .with_test_description(self.description())
    }
}

/// Flags any filled bin of a 1D histogram whose bin center falls outside
/// `[x_min, x_max]`. Raw quality is the fraction of filled bins that pass.
pub struct RangeAlgorithm {
    x_min: f64,
    x_max: f64,
}

impl QualityTestAlgorithm for RangeAlgorithm {
    fn algorithm(&self) -> &'static str {
        "XRange"
    }

    fn user_run(&self, object: &dyn StatObject, _reference: Option<&dyn StatObject>) -> std::result::Result<(f64, String), String> {
        let hist = object
            .as_any()
            .downcast_ref::<Hist1D>()
            .ok_or("XRange requires a Hist1D object")?;

        let width = (hist.max_x - hist.min_x) / hist.n_bins_x as f64;
        let mut filled = 0u64;
        let mut in_range = 0u64;
        for (i, content) in hist.bins.iter().enumerate().skip(1).take(hist.n_bins_x as usize) {
            if *content == 0.0 {
                continue;
            }
            filled += 1;
            let center = hist.min_x + width * (i as f64 - 0.5);
            if center >= self.x_min && center <= self.x_max {
                in_range += 1;
            }
        }

        let quality = if filled == 0 { 1.0 } else { in_range as f64 / filled as f64 };
        Ok((quality, format!("{in_range}/{filled} filled bins within [{}, {}]", self.x_min, self.x_max)))
    }
}

/// Flags a histogram whose fraction of never-filled bins exceeds a
/// threshold. Raw quality is `1 - dead_fraction`.
pub struct DeadChannelAlgorithm;

impl QualityTestAlgorithm for DeadChannelAlgorithm {
    fn algorithm(&self) -> &'static str {
        "DeadChannel"
    }

    fn user_run(&self, object: &dyn StatObject, _reference: Option<&dyn StatObject>) -> std::result::Result<(f64, String), String> {
        let (dead, total) = if let Some(h) = object.as_any().downcast_ref::<Hist1D>() {
            let body = &h.bins[1..h.bins.len() - 1];
            (body.iter().filter(|b| **b == 0.0).count(), body.len())
        } else if let Some(h) = object.as_any().downcast_ref::<Hist2D>() {
            (h.bins.iter().filter(|b| **b == 0.0).count(), h.bins.len())
        } else {
            return Err("DeadChannel requires a Hist1D or Hist2D object".into());
        };

        if total == 0 {
            return Ok((1.0, "empty histogram".into()));
        }
        Ok((1.0 - dead as f64 / total as f64, format!("{dead}/{total} channels dead")))
    }
}

/// Compares a histogram (or scalar) against its reference bin-by-bin
/// (value-by-value) for exact equality. Raw quality is the matching
/// fraction.
pub struct Comp2RefEqualAlgorithm;

impl QualityTestAlgorithm for Comp2RefEqualAlgorithm {
    fn algorithm(&self) -> &'static str {
        "Comp2RefEqual"
    }

    fn user_run(&self, object: &dyn StatObject, reference: Option<&dyn StatObject>) -> std::result::Result<(f64, String), String> {
        let reference = reference.ok_or("Comp2RefEqual requires a reference object")?;

        let quality = if let (Some(a), Some(b)) = (
            object.as_any().downcast_ref::<Hist1D>(),
            reference.as_any().downcast_ref::<Hist1D>(),
        ) {
            if a.bins.len() != b.bins.len() {
                return Err("object and reference have incompatible binning".into());
            }
            let matching = a.bins.iter().zip(&b.bins).filter(|(x, y)| x == y).count();
            matching as f64 / a.bins.len() as f64
        } else if let (Some(a), Some(b)) = (
            object.as_any().downcast_ref::<Scalar>(),
            reference.as_any().downcast_ref::<Scalar>(),
        ) {
            if a.value == b.value { 1.0 } else { 0.0 }
        } else {
            return Err("Comp2RefEqual requires matching Hist1D or Scalar types".into());
        };

        Ok((quality, "compared against reference".into()))
    }
}

/// Constructs a [`ConfiguredQualityTest`] from a `<qtest>` descriptor:
/// `type`/`name` attributes, optional `warningLimit`/`errorLimit`,
/// plus `<param key="..." value="...">` children specific to the
/// algorithm.
pub trait QTestFactory: Send + Sync {
    fn create(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>>;
}

fn params_of(desc: &XmlElement) -> HashMap<&str, &str> {
    desc.children
        .iter()
        .filter(|c| c.tag == "param")
        .filter_map(|c| Some((c.attr("key")?, c.attr("value").unwrap_or_default())))
        .collect()
}

fn param_f64(desc: &XmlElement, key: &str) -> Result<f64> {
    // `XmlElement` doesn't model element text content, only attributes, so
    // params are carried as `<param key="xmin" value="0"/>` rather than
    // `<param key="xmin">0</param>`.
    let params = params_of(desc);
    params
        .get(key)
        .ok_or_else(|| Error::InvalidParameter(format!("missing <param key={key:?}>")))?
        .parse()
        .map_err(|_| Error::InvalidParameter(format!("param {key:?} is not numeric")))
}

/// Applies the `warningLimit`/`errorLimit` attributes a descriptor may
/// carry, leaving the algorithm's defaults untouched if absent.
fn apply_limits(desc: &XmlElement, test: &ConfiguredQualityTest) -> Result<()> {
    let warning = match desc.attr("warningLimit") {
        Some(v) => v.parse().map_err(|_| Error::InvalidParameter("warningLimit is not numeric".into()))?,
        None => return Ok(()),
    };
    let error = match desc.attr("errorLimit") {
        Some(v) => v.parse().map_err(|_| Error::InvalidParameter("errorLimit is not numeric".into()))?,
        None => 0.0,
    };
    test.set_limits(warning, error)
}

/// Applies the optional `description` attribute a descriptor may carry.
fn apply_description(desc: &XmlElement, test: &ConfiguredQualityTest) {
    if let Some(description) = desc.attr("description") {
        test.set_description(description);
    }
}

struct RangeTestFactory;
impl QTestFactory for RangeTestFactory {
    fn create(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>> {
        let name = desc.require("name")?;
        let x_min = param_f64(desc, "xmin")?;
        let x_max = param_f64(desc, "xmax")?;
        let test = ConfiguredQualityTest::new(name, Arc::new(RangeAlgorithm { x_min, x_max }));
        apply_limits(desc, &test)?;
        apply_description(desc, &test);
        Ok(Arc::new(test))
    }
}

struct DeadChannelTestFactory;
impl QTestFactory for DeadChannelTestFactory {
    fn create(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>> {
        let name = desc.require("name")?;
        let test = ConfiguredQualityTest::new(name, Arc::new(DeadChannelAlgorithm));
        apply_limits(desc, &test)?;
        apply_description(desc, &test);
        Ok(Arc::new(test))
    }
}

struct Comp2RefEqualTestFactory;
impl QTestFactory for Comp2RefEqualTestFactory {
    fn create(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>> {
        let name = desc.require("name")?;
        let test = ConfiguredQualityTest::new(name, Arc::new(Comp2RefEqualAlgorithm));
        apply_limits(desc, &test)?;
        apply_description(desc, &test);
        Ok(Arc::new(test))
    }
}

#[derive(Default)]
pub struct QTestRegistry {
    factories: RwLock<HashMap<String, Arc<dyn QTestFactory>>>,
}

impl QTestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, algorithm: impl Into<String>, factory: Arc<dyn QTestFactory>) {
        self.factories.write().unwrap().insert(algorithm.into(), factory);
    }

    pub fn create(&self, desc: &XmlElement) -> Result<Arc<ConfiguredQualityTest>> {
        let algorithm = desc.require("type")?;
        let factory = self
            .factories
            .read()
            .unwrap()
            .get(algorithm)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no qtest algorithm registered for {algorithm:?}")))?;
        factory.create(desc)
    }
}

pub fn global() -> &'static QTestRegistry {
    static REGISTRY: OnceLock<QTestRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let reg = QTestRegistry::new();
        reg.register("XRange", Arc::new(RangeTestFactory));
        reg.register("DeadChannel", Arc::new(DeadChannelTestFactory));
        reg.register("Comp2RefEqual", Arc::new(Comp2RefEqualTestFactory));
        reg
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::NumericKind;

    fn configured(algorithm: Arc<dyn QualityTestAlgorithm>, warning: f64, error: f64) -> ConfiguredQualityTest {
        let test = ConfiguredQualityTest::new("t", algorithm);
        test.set_limits(warning, error).unwrap();
        test
    }

    #[test]
    fn range_test_flags_out_of_range_bins() {
        let mut h = Hist1D::new(NumericKind::Double, 10, 0.0, 10.0);
        h.fill(1.0, 1.0);
        h.fill(9.0, 1.0);
        let test = configured(Arc::new(RangeAlgorithm { x_min: 0.0, x_max: 5.0 }), 1.0, 0.0);
        let report = test.run(&h, None);
        assert_eq!(report.quality, 0.5);
    }

    #[test]
    fn dead_channel_test_counts_empty_bins() {
        let mut h = Hist1D::new(NumericKind::Double, 4, 0.0, 4.0);
        h.fill(0.5, 1.0);
        let test = configured(Arc::new(DeadChannelAlgorithm), 1.0, 0.0);
        let report = test.run(&h, None);
        assert_eq!(report.quality, 0.25);
    }

    #[test]
    fn comp2ref_requires_reference() {
        let h = Hist1D::new(NumericKind::Double, 4, 0.0, 4.0);
        let test = configured(Arc::new(Comp2RefEqualAlgorithm), 1.0, 0.0);
        let report = test.run(&h, None);
        assert_eq!(report.flag, QFlag::Invalid);
        assert_eq!(report.quality, 0.0);
    }

    #[test]
    fn comp2ref_identical_histograms_are_perfect_quality() {
        let h = Hist1D::new(NumericKind::Double, 4, 0.0, 4.0);
        let reference = h.clone();
        let test = configured(Arc::new(Comp2RefEqualAlgorithm), 1.0, 0.0);
        let report = test.run(&h, Some(&reference));
        assert_eq!(report.quality, 1.0);
        assert!(report.is_success());
    }

    #[test]
    fn set_limits_rejects_out_of_bounds() {
        let test = ConfiguredQualityTest::new("t", Arc::new(DeadChannelAlgorithm));
        assert!(test.set_limits(0.5, 0.6).is_err());
    }

    /// quality=0.9 with warn=0.8,err=0.5 -> SUCCESS; 0.7 -> WARNING;
    /// 0.3 -> ERROR; -0.1 (out of range) -> INVALID.
    struct FixedAlgorithm(f64);
    impl QualityTestAlgorithm for FixedAlgorithm {
        fn algorithm(&self) -> &'static str {
            "Fixed"
        }
        fn user_run(&self, _o: &dyn StatObject, _r: Option<&dyn StatObject>) -> std::result::Result<(f64, String), String> {
            Ok((self.0, "fixed".into()))
        }
    }

    #[test]
    fn quality_classification_matches_documented_lattice() {
        let h = Hist1D::new(NumericKind::Double, 1, 0.0, 1.0);
        for (quality, expected) in [(0.9, QFlag::Success), (0.7, QFlag::Warning), (0.3, QFlag::Error)] {
            let test = configured(Arc::new(FixedAlgorithm(quality)), 0.8, 0.5);
            assert_eq!(test.run(&h, None).flag, expected);
        }
        let invalid_test = configured(Arc::new(FixedAlgorithm(-0.1)), 0.8, 0.5);
        let report = invalid_test.run(&h, None);
        assert_eq!(report.flag, QFlag::Invalid);
        assert_eq!(report.quality, 0.0);
    }

    #[test]
    fn registry_creates_from_descriptor() {
        let desc = XmlElement::parse(
            r#"<qtest type="XRange" name="q6"><param key="xmin" value="0"/><param key="xmax" value="5"/></qtest>"#,
        )
        .unwrap();
        let test = global().create(&desc).unwrap();
        assert_eq!(test.name(), "q6");
        assert_eq!(test.algorithm_tag(), "XRange");
    }

    #[test]
    fn descriptor_description_is_carried_onto_reports() {
        let desc = XmlElement::parse(
            r#"<qtest type="DeadChannel" name="q7" description="flags dead channels"/>"#,
        )
        .unwrap();
        let test = global().create(&desc).unwrap();
        assert_eq!(test.description(), "flags dead channels");

        let h = Hist1D::new(NumericKind::Double, 4, 0.0, 4.0);
        let report = test.run(&h, None);
        assert_eq!(report.test_description, "flags dead channels");
    }
}
