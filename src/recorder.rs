//! CSV persistence for finished curves.
//!
//! Layout: parameter rows `name,value,[unit]`, a header row, then one row per
//! point: independent value, raw value of every series, filtered value of
//! every smoothed series.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::curve::{Curve, Series};
use crate::drivers::{EngineError, PlotRenderer};
use crate::params::{
    AsvParams, CaParams, CvParams, DpvParams, Eis2Params, EisParams, HoldPhase, SweepParams,
    SwvParams, TechniqueParameters,
};
use crate::smoothing::FilterKind;
use crate::types::Technique;

const FILTER_ROW: &str = "Filter Type";

/// A curve together with the settings that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct CurveStore {
    pub params: TechniqueParameters,
    pub filter: FilterKind,
    pub curve: Curve,
}

#[derive(Debug)]
pub struct ExportedFiles {
    pub csv: PathBuf,
    pub images: Vec<PathBuf>,
}

struct ParamRow {
    name: &'static str,
    value: String,
    unit: &'static str,
}

fn row(name: &'static str, value: impl ToString, unit: &'static str) -> ParamRow {
    ParamRow {
        name,
        value: value.to_string(),
        unit,
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn sweep_rows(start: i32, end: i32, step: i32) -> Vec<ParamRow> {
    vec![
        row("Start Voltage", start, "mV"),
        row("End Voltage", end, "mV"),
        row("Step", step, "mV"),
    ]
}

fn param_rows(params: &TechniqueParameters, filter: FilterKind) -> Vec<ParamRow> {
    let filter_row = row(FILTER_ROW, filter.label(), "type");
    match params {
        TechniqueParameters::Lsv(p) => {
            let mut rows = sweep_rows(p.start_mv, p.end_mv, p.step_mv);
            rows.push(filter_row);
            rows
        }
        TechniqueParameters::Asv(p) => {
            let mut rows = sweep_rows(p.start_mv, p.end_mv, p.step_mv);
            rows.extend([
                row("Clean Voltage", p.clean.voltage_mv, "mV"),
                row("Clean Time", p.clean.time_ms, "ms"),
                row("Deposition Voltage", p.deposition.voltage_mv, "mV"),
                row("Deposition Time", p.deposition.time_ms, "ms"),
                row("Equilibrium Voltage", p.equilibrium.voltage_mv, "mV"),
                row("Equilibrium Time", p.equilibrium.time_ms, "ms"),
                filter_row,
            ]);
            rows
        }
        TechniqueParameters::Dpv(p) => {
            let dep = p.deposition.unwrap_or(HoldPhase {
                voltage_mv: 0,
                time_ms: 0,
            });
            let mut rows = sweep_rows(p.start_mv, p.end_mv, p.step_mv);
            rows.extend([
                row("Pulse Amplitude", p.amplitude_mv, "mV"),
                row("Pulse Width", p.pulse_width_ms, "ms"),
                filter_row,
                row("Use Deposition", flag(p.deposition.is_some()), "bool"),
                row("Deposition Voltage", dep.voltage_mv, "mV"),
                row("Deposition Time", dep.time_ms, "ms"),
            ]);
            rows
        }
        TechniqueParameters::Swv(p) => {
            let mut rows = sweep_rows(p.start_mv, p.end_mv, p.step_mv);
            rows.extend([
                row("Amplitude", p.amplitude_mv, "mV"),
                row("Frequency", p.frequency_hz, "Hz"),
                filter_row,
            ]);
            rows
        }
        TechniqueParameters::Cv(p) => {
            let mut rows = sweep_rows(p.start_mv, p.end_mv, p.step_mv);
            rows.extend([
                row("Scan Rate", p.scan_rate_mv_s, "mV/s"),
                row("Repeat Times", p.repeats, "times"),
                filter_row,
            ]);
            rows
        }
        TechniqueParameters::Ca(p) => vec![
            row("Time Run", p.run_time_s, "s"),
            row("E Voltage", p.voltage_mv, "mV"),
            row("Time Interval", p.interval_ms, "ms"),
            filter_row,
        ],
        TechniqueParameters::Eis3(p) => vec![
            row("Start Frequency", p.start_hz, "Hz"),
            row("Stop Frequency", p.stop_hz, "Hz"),
            row("Sweep Points", p.sweep_points, "points"),
            row("Repeat Times", p.repeats, "times"),
            filter_row,
        ],
        TechniqueParameters::Eis2(p) => vec![
            row("Start Frequency", p.start_hz, "Hz"),
            row("Stop Frequency", p.stop_hz, "Hz"),
            row("Sweep Points", p.sweep_points, "points"),
            row("Repeat Times", p.repeats, "times"),
            row("Logarithmic", flag(p.logarithmic), "bool"),
            filter_row,
        ],
    }
}

/// Parameter rows read back from a file, keyed by name.
struct ParamTable(HashMap<String, String>);

impl ParamTable {
    fn raw(&self, name: &str) -> Result<&str, EngineError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EngineError::CsvLayout(format!("missing parameter row {name:?}")))
    }

    fn int(&self, name: &str) -> Result<i32, EngineError> {
        let raw = self.raw(name)?;
        // older files may carry integral values as "10.0"
        raw.parse::<i32>()
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0 && v.abs() <= f64::from(i32::MAX))
                    .map(|v| v as i32)
            })
            .ok_or_else(|| EngineError::CsvLayout(format!("{name} = {raw:?} is not an integer")))
    }

    fn float(&self, name: &str) -> Result<f64, EngineError> {
        let raw = self.raw(name)?;
        raw.parse::<f64>()
            .map_err(|_| EngineError::CsvLayout(format!("{name} = {raw:?} is not a number")))
    }

    fn flag(&self, name: &str) -> Result<Option<bool>, EngineError> {
        match self.0.get(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) if v == "true" || v == "1" => Ok(Some(true)),
            Some(v) if v == "false" || v == "0" => Ok(Some(false)),
            Some(v) => Err(EngineError::CsvLayout(format!("{name} = {v:?} is not a flag"))),
        }
    }

    fn sweep(&self) -> Result<SweepParams, EngineError> {
        Ok(SweepParams {
            start_mv: self.int("Start Voltage")?,
            end_mv: self.int("End Voltage")?,
            step_mv: self.int("Step")?,
        })
    }

    fn hold(&self, voltage: &str, time: &str) -> Result<HoldPhase, EngineError> {
        Ok(HoldPhase {
            voltage_mv: self.int(voltage)?,
            time_ms: self.int(time)?,
        })
    }

    fn params(&self, technique: Technique) -> Result<TechniqueParameters, EngineError> {
        Ok(match technique {
            Technique::Lsv => TechniqueParameters::Lsv(self.sweep()?),
            Technique::Asv => {
                let sweep = self.sweep()?;
                TechniqueParameters::Asv(AsvParams {
                    start_mv: sweep.start_mv,
                    end_mv: sweep.end_mv,
                    step_mv: sweep.step_mv,
                    clean: self.hold("Clean Voltage", "Clean Time")?,
                    deposition: self.hold("Deposition Voltage", "Deposition Time")?,
                    equilibrium: self.hold("Equilibrium Voltage", "Equilibrium Time")?,
                })
            }
            Technique::Dpv => {
                let sweep = self.sweep()?;
                let deposition = match self.flag("Use Deposition")? {
                    Some(true) => Some(self.hold("Deposition Voltage", "Deposition Time")?),
                    _ => None,
                };
                TechniqueParameters::Dpv(DpvParams {
                    start_mv: sweep.start_mv,
                    end_mv: sweep.end_mv,
                    step_mv: sweep.step_mv,
                    amplitude_mv: self.int("Pulse Amplitude")?,
                    pulse_width_ms: self.int("Pulse Width")?,
                    deposition,
                })
            }
            Technique::Swv => {
                let sweep = self.sweep()?;
                TechniqueParameters::Swv(SwvParams {
                    start_mv: sweep.start_mv,
                    end_mv: sweep.end_mv,
                    step_mv: sweep.step_mv,
                    amplitude_mv: self.int("Amplitude")?,
                    frequency_hz: self.int("Frequency")?,
                })
            }
            Technique::Cv => {
                let sweep = self.sweep()?;
                TechniqueParameters::Cv(CvParams {
                    start_mv: sweep.start_mv,
                    end_mv: sweep.end_mv,
                    step_mv: sweep.step_mv,
                    scan_rate_mv_s: self.float("Scan Rate")?,
                    repeats: self.int("Repeat Times")?,
                })
            }
            Technique::Ca => TechniqueParameters::Ca(CaParams {
                voltage_mv: self.int("E Voltage")?,
                run_time_s: self.int("Time Run")?,
                interval_ms: self.int("Time Interval")?,
            }),
            Technique::Eis3 => TechniqueParameters::Eis3(EisParams {
                start_hz: self.int("Start Frequency")?,
                stop_hz: self.int("Stop Frequency")?,
                sweep_points: self.int("Sweep Points")?,
                repeats: self.int("Repeat Times")?,
            }),
            Technique::Eis2 => TechniqueParameters::Eis2(Eis2Params {
                start_hz: self.int("Start Frequency")?,
                stop_hz: self.int("Stop Frequency")?,
                sweep_points: self.int("Sweep Points")?,
                repeats: self.int("Repeat Times")?,
                logarithmic: self.flag("Logarithmic")?.unwrap_or(true),
            }),
        })
    }
}

fn is_param_record(record: &csv::StringRecord) -> bool {
    record.len() == 3
        && record
            .get(2)
            .map(|u| {
                let u = u.trim();
                u.starts_with('[') && u.ends_with(']')
            })
            .unwrap_or(false)
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

fn parse_cell(cell: &str, column: &str, line: usize) -> Result<f64, EngineError> {
    cell.trim().parse::<f64>().map_err(|_| {
        EngineError::CsvLayout(format!("row {line}: {column} = {cell:?} is not a number"))
    })
}

impl CurveStore {
    pub fn new(params: TechniqueParameters, filter: FilterKind, curve: Curve) -> Self {
        Self {
            params,
            filter,
            curve,
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        let mut out = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);

        for p in param_rows(&self.params, self.filter) {
            let unit = format!("[{}]", p.unit);
            out.write_record([p.name, p.value.as_str(), unit.as_str()])?;
        }

        let smoothed: Vec<&Series> = self.curve.series.iter().filter(|s| s.smoothed).collect();
        let mut header = vec![self.curve.axis.column()];
        header.extend(self.curve.series.iter().map(Series::raw_column));
        header.extend(smoothed.iter().map(|s| s.filtered_column()));
        out.write_record(&header)?;

        for (i, x) in self.curve.x.iter().enumerate() {
            let mut record = Vec::with_capacity(header.len());
            record.push(x.to_string());
            for series in &self.curve.series {
                record.push(series.raw.get(i).map(f64::to_string).unwrap_or_default());
            }
            for series in &smoothed {
                record.push(series.filtered.get(i).map(f64::to_string).unwrap_or_default());
            }
            out.write_record(&record)?;
        }
        out.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, EngineError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| EngineError::CsvLayout(e.to_string()))
    }

    /// Read a curve exported for `technique`. Filtered columns may be blank or
    /// missing; the filtered series are then left empty.
    pub fn read_csv<R: Read>(technique: Technique, reader: R) -> Result<Self, EngineError> {
        let profile = technique.profile();
        let mut input = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut params = HashMap::new();
        let mut header_seen = false;
        let mut x = Vec::new();
        let mut raw: Vec<Vec<f64>> = vec![Vec::new(); profile.series.len()];
        let smoothed_idx: Vec<usize> = profile
            .series
            .iter()
            .enumerate()
            .filter(|(_, s)| s.smoothed)
            .map(|(i, _)| i)
            .collect();
        let mut filtered: Vec<Vec<Option<f64>>> = vec![Vec::new(); smoothed_idx.len()];

        for (line, record) in input.records().enumerate() {
            let record = record?;
            if is_blank(&record) {
                continue;
            }
            if !header_seen {
                if is_param_record(&record) {
                    params.insert(record[0].to_string(), record[1].to_string());
                } else {
                    if record.len() < 1 + profile.series.len() {
                        return Err(EngineError::CsvLayout(format!(
                            "header has {} columns, {technique} needs at least {}",
                            record.len(),
                            1 + profile.series.len()
                        )));
                    }
                    header_seen = true;
                }
                continue;
            }

            let line = line + 1;
            let first = record.get(0).unwrap_or_default();
            x.push(parse_cell(first, "x", line)?);
            for (s, column) in raw.iter_mut().enumerate() {
                let cell = record.get(1 + s).unwrap_or_default();
                column.push(parse_cell(cell, profile.series[s].name, line)?);
            }
            for (f, column) in filtered.iter_mut().enumerate() {
                let cell = record.get(1 + profile.series.len() + f).unwrap_or_default();
                let value = if cell.is_empty() {
                    None
                } else {
                    Some(parse_cell(cell, "filtered", line)?)
                };
                column.push(value);
            }
        }

        if !header_seen {
            return Err(EngineError::CsvLayout("no header row found".into()));
        }

        let table = ParamTable(params);
        let params = table.params(technique)?;
        let filter = table
            .0
            .get(FILTER_ROW)
            .and_then(|label| FilterKind::from_label(label))
            .unwrap_or(profile.default_filter);

        let mut series: Vec<Series> = profile
            .series
            .iter()
            .zip(raw)
            .map(|(layout, raw)| Series::new(layout.name, layout.unit, raw, layout.smoothed))
            .collect();
        for (column, &idx) in filtered.into_iter().zip(&smoothed_idx) {
            let values: Option<Vec<f64>> = column.into_iter().collect();
            match values {
                Some(values) => series[idx].filtered = values,
                None => log::debug!(
                    "{} has blank filtered cells; leaving it unfiltered",
                    series[idx].name
                ),
            }
        }

        let curve = Curve::new(technique, profile.axis.clone(), x, series);
        Ok(Self {
            params,
            filter,
            curve,
        })
    }

    /// Write `<path>` and then hand the curve to `renderer`. The CSV stays on
    /// disk if rendering fails.
    pub fn export(
        &self,
        path: &Path,
        renderer: Option<&dyn PlotRenderer>,
    ) -> Result<ExportedFiles, EngineError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| EngineError::file(dir, e))?;
        }
        let file = File::create(path).map_err(|e| EngineError::file(path, e))?;
        self.write_csv(file)?;
        log::info!("{} curve saved to {}", self.curve.technique, path.display());

        let images = match renderer {
            Some(renderer) => renderer.render(&self.curve, path)?,
            None => Vec::new(),
        };
        Ok(ExportedFiles {
            csv: path.to_path_buf(),
            images,
        })
    }

    pub fn import(technique: Technique, path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| EngineError::file(path, e))?;
        Self::read_csv(technique, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::pipeline::CurvePipeline;
    use crate::drivers::SampleBuffer;
    use crate::types::{AcquisitionState, RawSample, SampleValue};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn acquired(technique: Technique) -> CurveStore {
        let params = TechniqueParameters::defaults_for(technique);
        let mut rng = StdRng::seed_from_u64(technique as u64);
        let samples: Vec<RawSample> = (0..200)
            .map(|i| RawSample {
                seq: i,
                tag: 10.0 + i as f64 * 0.37,
                values: vec![
                    SampleValue::Finite(rng.gen_range(-3.0..3.0)),
                    SampleValue::Finite(rng.gen_range(-80.0..80.0)),
                ],
            })
            .collect();
        let filter = technique.profile().default_filter;
        let curve = CurvePipeline::new(params, filter)
            .build(&SampleBuffer::from(samples), AcquisitionState::Completed)
            .unwrap();
        CurveStore::new(params, filter, curve)
    }

    #[test]
    fn round_trips_every_technique() {
        for technique in Technique::ALL {
            let store = acquired(technique);
            let text = store.to_csv_string().unwrap();
            let back = CurveStore::read_csv(technique, text.as_bytes()).unwrap();
            assert_eq!(back, store, "{technique}");
        }
    }

    #[test]
    fn lsv_layout() {
        let mut store = acquired(Technique::Lsv);
        store.curve.x.truncate(1);
        for s in &mut store.curve.series {
            s.raw = vec![1.5];
            s.filtered = vec![1.5];
        }
        let text = store.to_csv_string().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Start Voltage,-200,[mV]",
                "End Voltage,700,[mV]",
                "Step,10,[mV]",
                "Filter Type,1/3 (Moving Avg 3pt),[type]",
                "Voltage (mV),Current (uA),Current Filtered (uA)",
                "-200,1.5,1.5",
            ]
        );
    }

    #[test]
    fn tolerates_blank_filtered_column_and_blank_lines() {
        let text = "Start Voltage,0,[mV]\n\nEnd Voltage,20,[mV]\nStep,10,[mV]\n\
                    Voltage (mV),Current (uA),Current Filtered (uA)\n0,1.0,\n10,2.0,\n\n20,3.0\n";
        let store = CurveStore::read_csv(Technique::Lsv, text.as_bytes()).unwrap();
        let current = store.curve.primary().unwrap();
        assert_eq!(current.raw, vec![1.0, 2.0, 3.0]);
        assert!(current.filtered.is_empty());
        assert_eq!(store.filter, FilterKind::MovingAverage3);
    }

    #[test]
    fn dpv_without_deposition_rows_imports() {
        let text = "Start Voltage,-200,[mV]\nEnd Voltage,600,[mV]\nStep,5,[mV]\n\
                    Pulse Amplitude,50,[mV]\nPulse Width,50,[ms]\nFilter Type,1/7 (Moving Avg 7pt),[type]\n\
                    Voltage (mV),Current (μA),Filtered (μA)\n-200,0.5,0.5\n";
        let store = CurveStore::read_csv(Technique::Dpv, text.as_bytes()).unwrap();
        let TechniqueParameters::Dpv(p) = store.params else {
            panic!("expected dpv parameters");
        };
        assert!(p.deposition.is_none());
        assert_eq!(store.filter, FilterKind::MovingAverage7);
        assert_eq!(store.curve.primary().unwrap().filtered, vec![0.5]);
    }

    #[test]
    fn missing_parameter_is_a_layout_error() {
        let text = "Start Voltage,0,[mV]\nVoltage (mV),Current (uA)\n0,1.0\n";
        assert!(matches!(
            CurveStore::read_csv(Technique::Lsv, text.as_bytes()),
            Err(EngineError::CsvLayout(_))
        ));
    }

    #[test]
    fn export_writes_csv_before_rendering() {
        struct FailingRenderer;
        impl PlotRenderer for FailingRenderer {
            fn render(&self, _: &Curve, _: &Path) -> Result<Vec<PathBuf>, EngineError> {
                Err(EngineError::Plot("no display".into()))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cv.csv");
        let store = acquired(Technique::Cv);
        assert!(store.export(&path, Some(&FailingRenderer)).is_err());
        let back = CurveStore::import(Technique::Cv, &path).unwrap();
        assert_eq!(back, store);

        let files = store.export(&path, None).unwrap();
        assert_eq!(files.csv, path);
        assert!(files.images.is_empty());
    }
}
