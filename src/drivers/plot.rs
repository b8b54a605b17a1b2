use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;

use crate::curve::Curve;
use crate::drivers::EngineError;

/// Receives a curve after its CSV was written and produces images next to it.
pub trait PlotRenderer {
    fn render(&self, curve: &Curve, csv_path: &Path) -> Result<Vec<PathBuf>, EngineError>;
}

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub raw: RGBColor,
    pub filtered: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            background: RGBColor(10, 10, 10),
            raw: RGBColor(90, 160, 255),
            filtered: RED,
        }
    }
}

/// Label-free PNG charts; axis names and units live in the CSV header.
#[derive(Clone, Debug, Default)]
pub struct PngRenderer {
    pub style: PlotStyle,
}

impl PngRenderer {
    pub fn new(style: PlotStyle) -> Self {
        Self { style }
    }
}

impl PlotRenderer for PngRenderer {
    fn render(&self, curve: &Curve, csv_path: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let paths = image_paths(curve, csv_path);
        let images = if curve.technique.is_impedance() {
            vec![
                render_bode_png(curve, &self.style)?,
                render_nyquist_png(curve, &self.style)?,
            ]
        } else {
            vec![render_curve_png(curve, &self.style)?]
        };
        for (path, png) in paths.iter().zip(images) {
            std::fs::write(path, png).map_err(|e| EngineError::file(path, e))?;
            log::info!("plot saved to {}", path.display());
        }
        Ok(paths)
    }
}

/// `<base>_plot.png`, or `<base>_bode_plot.png` and `<base>_nyquist_plot.png`
/// for impedance curves.
pub fn image_paths(curve: &Curve, csv_path: &Path) -> Vec<PathBuf> {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "curve".to_owned());
    let sibling = |suffix: &str| csv_path.with_file_name(format!("{stem}_{suffix}.png"));
    if curve.technique.is_impedance() {
        vec![sibling("bode_plot"), sibling("nyquist_plot")]
    } else {
        vec![sibling("plot")]
    }
}

/// Primary series against the independent axis, raw and filtered.
pub fn render_curve_png(curve: &Curve, style: &PlotStyle) -> Result<Vec<u8>, EngineError> {
    let primary = curve
        .primary()
        .filter(|s| !s.raw.is_empty())
        .ok_or_else(|| EngineError::Plot("curve has no samples".into()))?;
    let mut lines = vec![(zip(&curve.x, &primary.raw), style.raw)];
    if !primary.filtered.is_empty() {
        lines.push((zip(&curve.x, &primary.filtered), style.filtered));
    }
    draw_lines(&lines, style)
}

/// Magnitude over log10 frequency.
pub fn render_bode_png(curve: &Curve, style: &PlotStyle) -> Result<Vec<u8>, EngineError> {
    let magnitude = curve
        .series("Magnitude")
        .filter(|s| !s.raw.is_empty())
        .ok_or_else(|| EngineError::Plot("curve has no impedance magnitude".into()))?;
    let log_f: Vec<f64> = curve.x.iter().map(|f| f.max(f64::MIN_POSITIVE).log10()).collect();
    let mut lines = vec![(zip(&log_f, &magnitude.raw), style.raw)];
    if !magnitude.filtered.is_empty() {
        lines.push((zip(&log_f, &magnitude.filtered), style.filtered));
    }
    draw_lines(&lines, style)
}

/// Re(Z) against -Im(Z).
pub fn render_nyquist_png(curve: &Curve, style: &PlotStyle) -> Result<Vec<u8>, EngineError> {
    let (Some(re), Some(im)) = (curve.series("Re(Z)"), curve.series("Im(Z)")) else {
        return Err(EngineError::Plot("curve has no impedance components".into()));
    };
    if re.raw.is_empty() {
        return Err(EngineError::Plot("curve has no samples".into()));
    }
    let neg_im: Vec<f64> = im.raw.iter().map(|v| -v).collect();
    draw_lines(&[(zip(&re.raw, &neg_im), style.raw)], style)
}

fn zip(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter().copied().zip(y.iter().copied()).collect()
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn draw_lines(
    lines: &[(Vec<(f64, f64)>, RGBColor)],
    style: &PlotStyle,
) -> Result<Vec<u8>, EngineError> {
    let points = || lines.iter().flat_map(|(pts, _)| pts.iter());
    let (x_min, x_max) = bounds(points().map(|p| p.0));
    let (y_min, y_max) = bounds(points().map(|p| p.1));

    let size = (style.width as usize)
        .checked_mul(style.height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| {
            EngineError::Plot(format!("{}x{} plot is too large", style.width, style.height))
        })?;
    let mut buffer = vec![0u8; size];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .x_labels(0)
            .y_labels(0)
            .light_line_style(&WHITE.mix(0.1))
            .bold_line_style(&WHITE.mix(0.25))
            .draw()?;
        for (pts, color) in lines {
            chart.draw_series(LineSeries::new(pts.iter().copied(), color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, EngineError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| EngineError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
