//! Acquisition and curve reconstruction for a serial-attached potentiostat.
//!
//! A run goes: [`params`] are validated and encoded into one device command
//! ([`encoder`]), a background session streams `;`-separated reply lines
//! ([`engine`], [`decoder`]), the accepted samples are turned into a curve
//! ([`reconstruct`]) and smoothed ([`smoothing`]), and the result is stored
//! as CSV with optional PNG plots ([`recorder`]). [`instrument::Instrument`]
//! drives that cycle for one technique.

pub mod config;
pub mod curve;
pub mod decoder;
pub mod drivers;
pub mod encoder;
pub mod engine;
pub mod instrument;
pub mod params;
pub mod reconstruct;
pub mod recorder;
pub mod smoothing;
pub mod technique;
pub mod types;

pub use curve::{Axis, Curve, CurvePoint, Series};
pub use drivers::{EngineError, ManualReply, ManualTransport, SerialTransport, Transport};
pub use instrument::{AcquisitionReport, Instrument};
pub use params::TechniqueParameters;
pub use recorder::{CurveStore, ExportedFiles};
pub use smoothing::FilterKind;
pub use types::{AcquisitionState, SessionEvent, Technique};
