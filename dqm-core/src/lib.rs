//! Hierarchical, path-addressed storage of monitor elements, with
//! pluggable allocation and a quality-test subsystem built on top.
//!
//! This crate owns the data plane: [`Path`] and [`Directory`]/[`Storage`]
//! for the hierarchy itself, [`stat`]'s envelope types plus [`alloc`]'s
//! allocator registry for constructing them declaratively,
//! [`element::MonitorElement`] for the booked object plus its metadata,
//! and [`quality`]/[`report`] for grading elements against reference
//! objects or fixed thresholds. [`manager::MonitorElementManager`] ties
//! these together into the one entry point other crates (transport,
//! run control, archiving) are expected to depend on.
//!
//! What it deliberately does not own: the statistical math inside a
//! [`stat::StatObject`] (means, merges, binary (de)serialization — an
//! external statistics library's job), general XML/JSON parsing beyond the
//! small element and quality-test descriptor shapes it defines, and any
//! notion of a network transport or run-control state machine (see the
//! sibling `dqm-transport`, `dqm-runcontrol` and `dqm-archive` crates).

pub mod alloc;
pub mod directory;
pub mod element;
pub mod manager;
pub mod path;
pub mod quality;
pub mod report;
pub mod signal;
pub mod stat;
pub mod status;
pub mod storage;
pub mod xml;

pub use alloc::AllocatorRegistry;
pub use directory::Directory;
pub use element::{ElementFlags, MonitorElement, OnlineElement};
pub use manager::MonitorElementManager;
pub use path::{Path, PathError, PathSegment, SegmentError};
pub use quality::{ConfiguredQualityTest, QTestFactory, QTestRegistry, QualityTestAlgorithm};
pub use report::{ElementKey, QFlag, QualityTestReport, ReportStorage};
pub use signal::Signal;
pub use stat::{
    Hist1D, Hist2D, Hist3D, IrregularHist2D, NumericKind, Profile, Profile2D, Scalar,
    ScalarValue, StackedHist, StatObject,
};
pub use status::{Error, Result, Status};
pub use storage::Storage;
pub use xml::XmlElement;
