//! Foreground controller for one technique: connect, run, stop, filter, export.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::curve::Curve;
use crate::drivers::pipeline::CurvePipeline;
use crate::drivers::{EngineError, PlotRenderer, SampleBuffer, Transport};
use crate::encoder::encode;
use crate::engine::{spawn_session, AcquisitionPlan, SessionConfig, SessionHandle};
use crate::params::TechniqueParameters;
use crate::recorder::{CurveStore, ExportedFiles};
use crate::smoothing::FilterKind;
use crate::types::{AcquisitionState, SessionEvent, Technique};

/// Summary of a finished session.
#[derive(Debug)]
pub struct AcquisitionReport {
    pub state: AcquisitionState,
    pub received: usize,
    pub expected: usize,
    pub misses: usize,
    /// Set when the transport failed mid-session.
    pub transport_error: Option<EngineError>,
    /// Set when the samples could not be turned into a curve.
    pub curve_error: Option<EngineError>,
}

impl AcquisitionReport {
    pub fn has_curve(&self) -> bool {
        self.curve_error.is_none()
    }
}

pub struct Instrument {
    technique: Technique,
    session_config: SessionConfig,
    transport: Option<Box<dyn Transport>>,
    session: Option<SessionHandle>,
    events: Option<Sender<SessionEvent>>,
    params: TechniqueParameters,
    filter: FilterKind,
    samples: SampleBuffer,
    curve: Option<Curve>,
    last_state: AcquisitionState,
}

impl Instrument {
    pub fn new(technique: Technique, session_config: SessionConfig) -> Self {
        Self {
            technique,
            session_config,
            transport: None,
            session: None,
            events: None,
            params: TechniqueParameters::defaults_for(technique),
            filter: technique.profile().default_filter,
            samples: SampleBuffer::default(),
            curve: None,
            last_state: AcquisitionState::Idle,
        }
    }

    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some() || self.session.is_some()
    }

    pub fn state(&self) -> AcquisitionState {
        self.session
            .as_ref()
            .map_or(self.last_state, SessionHandle::state)
    }

    pub fn received(&self) -> usize {
        self.session
            .as_ref()
            .map_or(self.samples.len(), SessionHandle::received)
    }

    pub fn params(&self) -> &TechniqueParameters {
        &self.params
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn curve(&self) -> Option<&Curve> {
        self.curve.as_ref()
    }

    pub fn connect(&mut self, mut transport: Box<dyn Transport>) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::SessionBusy);
        }
        transport.clear_input()?;
        log::info!("{}: connected to {}", self.technique, transport.name());
        self.transport = Some(transport);
        Ok(())
    }

    /// Drop the transport. A running session is stopped and finalised first.
    pub fn disconnect(&mut self) -> Result<Option<AcquisitionReport>, EngineError> {
        let report = if let Some(handle) = &self.session {
            handle.request_stop();
            Some(self.wait()?)
        } else {
            None
        };
        if let Some(transport) = self.transport.take() {
            log::info!("{}: disconnected from {}", self.technique, transport.name());
        }
        Ok(report)
    }

    /// Validate, encode and launch a session. Rejected while one is receiving.
    pub fn start(&mut self, params: TechniqueParameters) -> Result<(), EngineError> {
        if params.technique() != self.technique {
            return Err(EngineError::TechniqueMismatch {
                expected: self.technique,
                actual: params.technique(),
            });
        }
        if let Some(handle) = &self.session {
            if !handle.is_finished() {
                return Err(EngineError::SessionBusy);
            }
            let report = self.wait()?;
            log::debug!("{}: collected finished session {:?}", self.technique, report.state);
        }
        let encoded = encode(&params)?;
        let transport = self.transport.take().ok_or(EngineError::NotConnected)?;

        self.params = params;
        self.samples = SampleBuffer::default();
        self.curve = None;
        let plan = AcquisitionPlan::new(self.technique.profile(), encoded);
        log::info!(
            "{}: starting, {} samples expected",
            self.technique,
            plan.expected_samples
        );
        self.session = Some(spawn_session(
            transport,
            plan,
            self.session_config.clone(),
            self.events.clone(),
        ));
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(handle) = &self.session {
            handle.request_stop();
        }
    }

    /// Stop flag of the running session, for signal handlers.
    pub fn stop_signal(&self) -> Option<Arc<AtomicBool>> {
        self.session.as_ref().map(SessionHandle::stop_signal)
    }

    /// Finalise the session if its worker has exited.
    pub fn poll(&mut self) -> Result<Option<AcquisitionReport>, EngineError> {
        match &self.session {
            Some(handle) if handle.is_finished() => self.wait().map(Some),
            _ => Ok(None),
        }
    }

    /// Block until the session ends, then rebuild the curve from its samples.
    pub fn wait(&mut self) -> Result<AcquisitionReport, EngineError> {
        let handle = self.session.take().ok_or(EngineError::NotConnected)?;
        let outcome = handle.join()?;
        self.transport = Some(outcome.transport);
        self.samples = outcome.samples;
        self.last_state = outcome.state;

        let curve_error = match CurvePipeline::new(self.params, self.filter)
            .build(&self.samples, outcome.state)
        {
            Ok(curve) => {
                self.curve = Some(curve);
                None
            }
            Err(e) => {
                log::warn!(
                    "{}: no curve from {} samples: {e}",
                    self.technique,
                    self.samples.len()
                );
                self.curve = None;
                Some(e)
            }
        };

        Ok(AcquisitionReport {
            state: outcome.state,
            received: self.samples.len(),
            expected: outcome.expected,
            misses: outcome.misses,
            transport_error: outcome.error,
            curve_error,
        })
    }

    /// Select a filter and recompute the filtered series from raw values.
    pub fn set_filter(&mut self, filter: FilterKind) {
        self.filter = filter;
        if let Some(curve) = &mut self.curve {
            curve.apply_filter(filter);
        }
    }

    pub fn clear(&mut self) {
        self.samples = SampleBuffer::default();
        self.curve = None;
    }

    pub fn export(
        &self,
        path: &Path,
        renderer: Option<&dyn PlotRenderer>,
    ) -> Result<ExportedFiles, EngineError> {
        let curve = self
            .curve
            .clone()
            .ok_or(EngineError::InsufficientData {
                needed: 1,
                got: self.samples.len(),
            })?;
        CurveStore::new(self.params, self.filter, curve).export(path, renderer)
    }

    /// Load a previously exported curve. Blank filtered columns are recomputed
    /// with the filter recorded in the file.
    pub fn import(&mut self, path: &Path) -> Result<(), EngineError> {
        let stored = CurveStore::import(self.technique, path)?;
        self.params = stored.params;
        self.filter = stored.filter;
        let mut curve = stored.curve;
        if curve
            .series
            .iter()
            .any(|s| s.smoothed && s.filtered.len() != s.raw.len())
        {
            curve.apply_filter(self.filter);
        }
        self.curve = Some(curve);
        self.samples = SampleBuffer::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ManualReply, ManualTransport};
    use crate::params::SweepParams;
    use std::thread;
    use std::time::{Duration, Instant};

    fn quick() -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_millis(5),
            miss_threshold: 100_000,
        }
    }

    fn lsv() -> TechniqueParameters {
        TechniqueParameters::Lsv(SweepParams {
            start_mv: -200,
            end_mv: 700,
            step_mv: 10,
        })
    }

    fn silent_after(lines: usize) -> Box<dyn Transport> {
        let mut replies: Vec<ManualReply> = (0..lines)
            .map(|i| ManualReply::Line(format!("{i};{}", i as f64 / 10.0)))
            .collect();
        replies.push(ManualReply::Silence);
        Box::new(ManualTransport::with_replies(replies))
    }

    fn wait_until(instrument: &Instrument, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while instrument.received() < count {
            assert!(Instant::now() < deadline, "session stalled");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn start_requires_a_transport() {
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        assert!(matches!(instrument.start(lsv()), Err(EngineError::NotConnected)));
    }

    #[test]
    fn rejects_foreign_parameters_and_bad_ranges_without_io() {
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        let transport = ManualTransport::new(["0;1"]);
        let log = transport.command_log();
        instrument.connect(Box::new(transport)).unwrap();
        assert!(matches!(
            instrument.start(TechniqueParameters::defaults_for(Technique::Cv)),
            Err(EngineError::TechniqueMismatch { .. })
        ));
        let bad = TechniqueParameters::Lsv(SweepParams {
            start_mv: 0,
            end_mv: 100,
            step_mv: -5,
        });
        assert!(matches!(instrument.start(bad), Err(EngineError::InvalidParameters(_))));
        assert!(log.lock().is_empty());
        assert!(instrument.is_connected());
    }

    #[test]
    fn second_start_while_receiving_is_busy() {
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        instrument.connect(silent_after(3)).unwrap();
        instrument.start(lsv()).unwrap();
        wait_until(&instrument, 3);
        assert!(matches!(instrument.start(lsv()), Err(EngineError::SessionBusy)));
        instrument.stop();
        let report = instrument.wait().unwrap();
        assert_eq!(report.state, AcquisitionState::Aborted);
    }

    #[test]
    fn disconnect_mid_run_aborts_and_keeps_partial_curve() {
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        instrument.connect(silent_after(40)).unwrap();
        instrument.start(lsv()).unwrap();
        wait_until(&instrument, 40);

        let report = instrument.disconnect().unwrap().unwrap();
        assert_eq!(report.state, AcquisitionState::Aborted);
        assert_eq!(report.received, 40);
        assert_eq!(report.expected, 91);
        assert!(!instrument.is_connected());

        let curve = instrument.curve().unwrap();
        assert!(!curve.complete);
        assert_eq!(curve.len(), 40);
        assert_eq!(curve.x[39], 190.0);
    }

    #[test]
    fn cv_short_run_reports_insufficient_data() {
        let mut instrument = Instrument::new(Technique::Cv, quick());
        instrument.connect(silent_after(10)).unwrap();
        instrument
            .start(TechniqueParameters::defaults_for(Technique::Cv))
            .unwrap();
        wait_until(&instrument, 10);
        instrument.stop();
        let report = instrument.wait().unwrap();
        assert!(matches!(
            report.curve_error,
            Some(EngineError::InsufficientData { needed: 162, got: 10 })
        ));
        assert!(instrument.curve().is_none());
        assert_eq!(instrument.samples().len(), 10);
        // the transport comes back for the next run
        assert!(instrument.is_connected());
    }

    #[test]
    fn filter_change_recomputes_from_raw() {
        let lines: Vec<String> = (0..91).map(|i| format!("{i};{}", (i % 5) as f64)).collect();
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        instrument.connect(Box::new(ManualTransport::new(lines))).unwrap();
        instrument.start(lsv()).unwrap();
        let report = instrument.wait().unwrap();
        assert_eq!(report.state, AcquisitionState::Completed);
        assert!(report.has_curve());

        instrument.set_filter(FilterKind::Median);
        let median = instrument.curve().unwrap().series[0].filtered.clone();
        instrument.set_filter(FilterKind::MovingAverage9);
        instrument.set_filter(FilterKind::Median);
        assert_eq!(instrument.curve().unwrap().series[0].filtered, median);
        assert!(instrument.curve().unwrap().complete);

        instrument.clear();
        assert!(instrument.curve().is_none());
        assert!(instrument.samples().is_empty());
    }

    #[test]
    fn import_refilters_blank_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.csv");
        std::fs::write(
            &path,
            "Start Voltage,0,[mV]\nEnd Voltage,30,[mV]\nStep,10,[mV]\n\
             Voltage (mV),Current (uA)\n0,1\n10,2\n20,3\n30,4\n",
        )
        .unwrap();
        let mut instrument = Instrument::new(Technique::Lsv, quick());
        instrument.import(&path).unwrap();
        let current = &instrument.curve().unwrap().series[0];
        assert_eq!(current.filtered, vec![1.0, 1.5, 2.0, 3.0]);
    }
}
