// src/main.rs
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn, LevelFilter};

use potentiostat::config::{load_config_or_default, AppConfig};
use potentiostat::drivers::{PlotRenderer, PlotStyle, PngRenderer, SerialTransport};
use potentiostat::engine::SessionConfig;
use potentiostat::smoothing::CATALOG;
use potentiostat::{
    AcquisitionState, CurveStore, FilterKind, Instrument, SessionEvent, Technique,
    TechniqueParameters,
};

/// Potentiostat acquisition tool
#[derive(Parser, Debug)]
#[command(name = "potentiostat")]
#[command(about = "Run electrochemical techniques and smooth stored curves", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one technique and store the curve as CSV
    Run {
        #[arg(short, long, value_parser = parse_technique)]
        technique: Technique,
        /// Parameters as JSON, inline or `@file.json`; bench defaults if omitted
        #[arg(short, long)]
        params: Option<String>,
        /// Output CSV; defaults to `<output_dir>/<technique>_<unix time>.csv`
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Filter label, e.g. "1/7" or "Savitzky-Golay"
        #[arg(short, long, value_parser = parse_filter)]
        filter: Option<FilterKind>,
        /// Serial port, overrides the config file
        #[arg(long)]
        port: Option<String>,
        /// Skip PNG rendering
        #[arg(long)]
        no_plot: bool,
    },
    /// Re-filter a stored CSV
    Smooth {
        input: PathBuf,
        #[arg(short, long, value_parser = parse_technique)]
        technique: Technique,
        #[arg(short, long, value_parser = parse_filter)]
        filter: FilterKind,
        /// Output CSV; overwrites the input if omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        no_plot: bool,
    },
    /// Print default parameters for a technique as JSON
    Defaults {
        #[arg(value_parser = parse_technique)]
        technique: Technique,
    },
    /// List the available filters
    Filters,
}

fn parse_technique(s: &str) -> Result<Technique, String> {
    Technique::ALL
        .into_iter()
        .find(|t| {
            t.short_name().eq_ignore_ascii_case(s) || format!("{t:?}").eq_ignore_ascii_case(s)
        })
        .ok_or_else(|| {
            let names: Vec<&str> = Technique::ALL.iter().map(|t| t.short_name()).collect();
            format!("unknown technique {s:?}, expected one of {}", names.join(", "))
        })
}

fn parse_filter(s: &str) -> Result<FilterKind, String> {
    FilterKind::from_label(s).ok_or_else(|| format!("unknown filter {s:?}, see `filters`"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    initialize_logging(&log_level);

    match args.command {
        Command::Run {
            technique,
            params,
            out,
            filter,
            port,
            no_plot,
        } => {
            let params = load_params(technique, params.as_deref())?;
            run(&config, params, out, filter, port, no_plot)
        }
        Command::Smooth {
            input,
            technique,
            filter,
            out,
            no_plot,
        } => smooth(&config, &input, technique, filter, out.as_deref(), no_plot),
        Command::Defaults { technique } => {
            println!("{}", TechniqueParameters::defaults_for(technique).to_json()?);
            Ok(())
        }
        Command::Filters => {
            for entry in CATALOG.iter() {
                println!("{:<24} {}", entry.label, entry.description);
            }
            Ok(())
        }
    }
}

fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn load_params(technique: Technique, arg: Option<&str>) -> Result<TechniqueParameters> {
    let Some(arg) = arg else {
        return Ok(TechniqueParameters::defaults_for(technique));
    };
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading parameters from {path}"))?,
        None => arg.to_owned(),
    };
    // the technique tag may be left out on the command line
    let mut value: serde_json::Value =
        serde_json::from_str(&text).context("parameters are not valid JSON")?;
    if let Some(object) = value.as_object_mut() {
        object
            .entry("technique")
            .or_insert_with(|| serde_json::to_value(technique).unwrap_or_default());
    }
    let params: TechniqueParameters =
        serde_json::from_value(value).context("parameters do not match the technique")?;
    if params.technique() != technique {
        bail!("parameters are for {}, not {technique}", params.technique());
    }
    Ok(params)
}

fn renderer(config: &AppConfig, no_plot: bool) -> Option<PngRenderer> {
    (config.export.render_plots && !no_plot).then(|| {
        PngRenderer::new(PlotStyle {
            width: config.export.plot_width,
            height: config.export.plot_height,
            ..PlotStyle::default()
        })
    })
}

/// Ctrl+C raises the session's own stop flag; the partial curve is still stored.
fn setup_shutdown_handler(stop: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Ctrl+C received - stopping acquisition...");
        stop.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")
}

fn run(
    config: &AppConfig,
    params: TechniqueParameters,
    out: Option<PathBuf>,
    filter: Option<FilterKind>,
    port: Option<String>,
    no_plot: bool,
) -> Result<()> {
    let technique = params.technique();
    let mut serial = config.serial.clone();
    if let Some(port) = port {
        serial.port = port;
    }

    let (tx, rx) = mpsc::channel();
    let session = SessionConfig {
        read_timeout: Duration::from_millis(serial.read_timeout_ms),
        miss_threshold: config.acquisition.miss_threshold,
    };
    let mut instrument = Instrument::new(technique, session).with_events(tx);
    if let Some(filter) = filter.or(config.smoothing.default_filter) {
        instrument.set_filter(filter);
    }

    let transport = SerialTransport::open(&serial)
        .with_context(|| format!("opening serial port {}", serial.port))?;
    instrument.connect(Box::new(transport))?;

    instrument.start(params)?;
    if let Some(stop) = instrument.stop_signal() {
        setup_shutdown_handler(stop)?;
    }
    info!("{technique} running with filter {}", instrument.filter());

    let mut last_report = Instant::now();
    let report = loop {
        for event in rx.try_iter() {
            match event {
                SessionEvent::Log(line) => log::debug!("{line}"),
                SessionEvent::State(state) => info!("state: {state:?}"),
                SessionEvent::Progress { received, expected } => {
                    if last_report.elapsed() >= Duration::from_secs(1) || received == expected {
                        info!("{received}/{expected} samples");
                        last_report = Instant::now();
                    }
                }
            }
        }
        if let Some(report) = instrument.poll()? {
            break report;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    info!(
        "{technique} finished {:?}: {}/{} samples, {} misses",
        report.state, report.received, report.expected, report.misses
    );
    if let Some(e) = &report.transport_error {
        warn!("transport failed during the run: {e}");
    }
    if let Some(e) = report.curve_error {
        bail!("no curve from {} samples: {e}", report.received);
    }
    if report.state != AcquisitionState::Completed {
        warn!("storing a partial curve");
    }

    let path = out.unwrap_or_else(|| default_output(config, technique));
    let renderer = renderer(config, no_plot);
    let files = instrument
        .export(&path, renderer.as_ref().map(|r| r as &dyn PlotRenderer))
        .with_context(|| format!("exporting to {}", path.display()))?;
    println!("{}", files.csv.display());
    for image in files.images {
        println!("{}", image.display());
    }
    instrument.disconnect()?;
    Ok(())
}

fn smooth(
    config: &AppConfig,
    input: &Path,
    technique: Technique,
    filter: FilterKind,
    out: Option<&Path>,
    no_plot: bool,
) -> Result<()> {
    let mut store = CurveStore::import(technique, input)
        .with_context(|| format!("reading {}", input.display()))?;
    store.filter = filter;
    store.curve.apply_filter(filter);
    let path = out.unwrap_or(input);
    let renderer = renderer(config, no_plot);
    let files = store.export(path, renderer.as_ref().map(|r| r as &dyn PlotRenderer))?;
    info!("{} re-filtered with {filter}", files.csv.display());
    Ok(())
}

fn default_output(config: &AppConfig, technique: Technique) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Path::new(&config.export.output_dir).join(format!(
        "{}_{stamp}.csv",
        technique.short_name().to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technique_names_parse_case_insensitively() {
        assert_eq!(parse_technique("eis3e"), Ok(Technique::Eis3));
        assert_eq!(parse_technique("Cv"), Ok(Technique::Cv));
        assert!(parse_technique("xyz").is_err());
    }

    #[test]
    fn params_accept_missing_tag() {
        let params = load_params(
            Technique::Lsv,
            Some(r#"{"start_mv":0,"end_mv":100,"step_mv":5}"#),
        )
        .unwrap();
        assert_eq!(params.technique(), Technique::Lsv);
        let tagged = r#"{"technique":"lsv","start_mv":0,"end_mv":100,"step_mv":5}"#;
        assert!(load_params(Technique::Cv, Some(tagged)).is_err());
        assert_eq!(
            load_params(Technique::Ca, None).unwrap(),
            TechniqueParameters::defaults_for(Technique::Ca)
        );
    }
}
