//! The allocator registry: maps a declarative `type` tag to a constructor
//! for the matching statistics object.
//!
//! A process-wide, append-only mapping from a string tag to a boxed trait
//! object constructor, populated with built-ins at startup and left open
//! for plugins to extend. No generic runtime-composition layer sits on
//! top of it — this registry only ever needs `type-tag string ->
//! constructor`, never nested composition from URLs — see DESIGN.md.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::stat::{
    Hist1D, Hist2D, Hist3D, IrregularHist2D, NumericKind, Profile, Profile2D, Scalar,
    ScalarValue, StackedHist, StatObject,
};
use crate::status::Error;
use crate::xml::XmlElement;

pub trait Allocator: Send + Sync {
    /// Constructs a statistics object from a parsed element descriptor.
    /// A missing required attribute must fail loudly with no partial side
    /// effects; a missing optional one is filled with the allocator's
    /// default.
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error>;
}

#[derive(Default)]
pub struct AllocatorRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Allocator>>>,
}

impl AllocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `allocator` under `type_tag`. Append-only by convention:
    /// callers may overwrite an existing tag, but must do so only during
    /// startup, before any worker thread consumes the registry.
    pub fn register(&self, type_tag: impl Into<String>, allocator: Arc<dyn Allocator>) {
        self.entries.write().unwrap().insert(type_tag.into(), allocator);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries.read().unwrap().contains_key(type_tag)
    }

    /// Looks up `desc`'s `type` attribute and constructs the matching
    /// object.
    pub fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let type_tag = desc.require("type")?;
        let allocator = self
            .entries
            .read()
            .unwrap()
            .get(type_tag)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no allocator registered for type {type_tag:?}")))?;
        allocator.allocate(desc)
    }
}

/// The process-wide allocator registry, pre-populated with the built-in
/// allocators at first use. Plugin registration must happen
/// before any worker thread starts consuming it.
pub fn global() -> &'static AllocatorRegistry {
    static REGISTRY: OnceLock<AllocatorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let reg = AllocatorRegistry::new();
        register_builtins(&reg);
        reg
    })
}

struct HistogramAllocator {
    dims: u8,
    kind: NumericKind,
}

impl Allocator for HistogramAllocator {
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let n_bins_x = desc.require_u32("nBinsX")?;
        let min_x = desc.require_f64("minX")?;
        let max_x = desc.require_f64("maxX")?;

        Ok(match self.dims {
            1 => Box::new(Hist1D::new(self.kind, n_bins_x, min_x, max_x)),
            2 => {
                let n_bins_y = desc.require_u32("nBinsY")?;
                let min_y = desc.require_f64("minY")?;
                let max_y = desc.require_f64("maxY")?;
                Box::new(Hist2D::new(self.kind, n_bins_x, min_x, max_x, n_bins_y, min_y, max_y))
            }
            3 => {
                let n_bins_y = desc.require_u32("nBinsY")?;
                let min_y = desc.require_f64("minY")?;
                let max_y = desc.require_f64("maxY")?;
                let n_bins_z = desc.require_u32("nBinsZ")?;
                let min_z = desc.require_f64("minZ")?;
                let max_z = desc.require_f64("maxZ")?;
                Box::new(Hist3D::new(
                    self.kind, n_bins_x, min_x, max_x, n_bins_y, min_y, max_y, n_bins_z, min_z,
                    max_z,
                ))
            }
            d => unreachable!("unsupported histogram dimensionality {d}"),
        })
    }
}

struct ProfileAllocator;

impl Allocator for ProfileAllocator {
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let n_bins_x = desc.require_u32("nBinsX")?;
        let min_x = desc.require_f64("minX")?;
        let max_x = desc.require_f64("maxX")?;
        Ok(Box::new(Profile::new(n_bins_x, min_x, max_x)))
    }
}

struct Profile2DAllocator;

impl Allocator for Profile2DAllocator {
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let n_bins_x = desc.require_u32("nBinsX")?;
        let min_x = desc.require_f64("minX")?;
        let max_x = desc.require_f64("maxX")?;
        let n_bins_y = desc.require_u32("nBinsY")?;
        let min_y = desc.require_f64("minY")?;
        let max_y = desc.require_f64("maxY")?;
        Ok(Box::new(Profile2D::new(n_bins_x, min_x, max_x, n_bins_y, min_y, max_y)))
    }
}

struct StackedAllocator;

impl Allocator for StackedAllocator {
    fn allocate(&self, _desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        Ok(Box::new(StackedHist::new()))
    }
}

struct IrregularAllocator;

impl Allocator for IrregularAllocator {
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let mut polygons = Vec::new();
        for bin in desc.children.iter().filter(|c| c.tag == "bin") {
            let vertices = bin.require("vertices")?;
            let mut polygon = Vec::new();
            for pair in vertices.split(';') {
                let (x, y) = pair
                    .split_once(',')
                    .ok_or_else(|| Error::InvalidParameter(format!("malformed vertex {pair:?}")))?;
                let x: f64 = x
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidParameter(format!("malformed vertex x {x:?}")))?;
                let y: f64 = y
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidParameter(format!("malformed vertex y {y:?}")))?;
                polygon.push((x, y));
            }
            polygons.push(polygon);
        }
        if polygons.is_empty() {
            return Err(Error::InvalidParameter(
                "TH2Poly requires at least one <bin vertices=\"...\"/> child".into(),
            ));
        }
        Ok(Box::new(IrregularHist2D::new(polygons)))
    }
}

enum ScalarKind {
    Int,
    Float,
    Double,
    Short,
    Long,
    Long64,
}

struct ScalarAllocator(ScalarKind);

impl Allocator for ScalarAllocator {
    fn allocate(&self, desc: &XmlElement) -> Result<Box<dyn StatObject>, Error> {
        let raw = desc.attr("value").unwrap_or("0");
        let parse_err = |_| Error::InvalidParameter(format!("value {raw:?} is not valid for this scalar type"));
        let value = match self.0 {
            ScalarKind::Int => ScalarValue::Int(raw.parse().map_err(parse_err)?),
            ScalarKind::Float => ScalarValue::Float(raw.parse().map_err(parse_err)?),
            ScalarKind::Double => ScalarValue::Double(raw.parse().map_err(parse_err)?),
            ScalarKind::Short => ScalarValue::Short(raw.parse().map_err(parse_err)?),
            ScalarKind::Long => ScalarValue::Long(raw.parse().map_err(parse_err)?),
            ScalarKind::Long64 => ScalarValue::Long64(raw.parse().map_err(parse_err)?),
        };
        Ok(Box::new(Scalar::new(value)))
    }
}

fn register_builtins(reg: &AllocatorRegistry) {
    let kinds = [
        ("C", NumericKind::Char),
        ("S", NumericKind::Short),
        ("I", NumericKind::Int),
        ("F", NumericKind::Float),
        ("D", NumericKind::Double),
    ];
    for (suffix, kind) in kinds {
        reg.register(format!("TH1{suffix}"), Arc::new(HistogramAllocator { dims: 1, kind }));
        reg.register(format!("TH2{suffix}"), Arc::new(HistogramAllocator { dims: 2, kind }));
        reg.register(format!("TH3{suffix}"), Arc::new(HistogramAllocator { dims: 3, kind }));
    }
    reg.register("TProfile", Arc::new(ProfileAllocator));
    reg.register("TProfile2D", Arc::new(Profile2DAllocator));
    reg.register("THStack", Arc::new(StackedAllocator));
    reg.register("TH2Poly", Arc::new(IrregularAllocator));

    reg.register("int", Arc::new(ScalarAllocator(ScalarKind::Int)));
    reg.register("real", Arc::new(ScalarAllocator(ScalarKind::Float)));
    reg.register("float", Arc::new(ScalarAllocator(ScalarKind::Float)));
    reg.register("double", Arc::new(ScalarAllocator(ScalarKind::Double)));
    reg.register("short", Arc::new(ScalarAllocator(ScalarKind::Short)));
    reg.register("long", Arc::new(ScalarAllocator(ScalarKind::Long)));
    reg.register("long64", Arc::new(ScalarAllocator(ScalarKind::Long64)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_1d_histogram() {
        let reg = AllocatorRegistry::new();
        register_builtins(&reg);
        let desc = XmlElement::parse(
            r#"<monitorElement type="TH1D" name="h" nBinsX="10" minX="0" maxX="1"/>"#,
        )
        .unwrap();
        let obj = reg.allocate(&desc).unwrap();
        assert_eq!(obj.type_tag(), "Hist1D");
    }

    #[test]
    fn missing_required_attribute_fails_construction() {
        let reg = AllocatorRegistry::new();
        register_builtins(&reg);
        let desc = XmlElement::parse(r#"<monitorElement type="TH1D" name="h"/>"#).unwrap();
        assert!(reg.allocate(&desc).is_err());
    }

    #[test]
    fn scalar_defaults_to_zero() {
        let reg = AllocatorRegistry::new();
        register_builtins(&reg);
        let desc = XmlElement::parse(r#"<monitorElement type="int" name="s"/>"#).unwrap();
        let obj = reg.allocate(&desc).unwrap();
        let scalar = obj.as_any().downcast_ref::<Scalar>().unwrap();
        assert_eq!(scalar.value, ScalarValue::Int(0));
    }

    #[test]
    fn unknown_type_tag_fails() {
        let reg = AllocatorRegistry::new();
        register_builtins(&reg);
        let desc = XmlElement::parse(r#"<monitorElement type="Bogus" name="x"/>"#).unwrap();
        assert!(reg.allocate(&desc).is_err());
    }
}
