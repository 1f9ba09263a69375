//! ==============================================================================
//! chart.rs - png line charts for the plot endpoints
//! ==============================================================================
//!
//! purpose:
//!     draws one panel per series, stacked top to bottom, into an in-memory
//!     rgb buffer (plotters bitmap backend) and encodes it as png.
//!
//! notes:
//!     - x axis is epoch milliseconds, labels are formatted back to time
//!     - an empty series still renders an (empty) frame
//!     - text is rasterised with dejavu sans embedded from assets/, registered
//!       with plotters once per process as "sans-serif"
//!     - y axis ends stay within +-Y_LIMIT so the span is always finite
//!     - this is cpu work; callers run it on spawn_blocking
//!
//! ==============================================================================

use std::ops::Range;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::domain::{Metric, Reading};
use crate::error::AppError;

pub struct Panel {
    pub metric: Metric,
    pub color: RGBColor,
    pub readings: Vec<Reading>,
}

impl Panel {
    pub fn new(metric: Metric, readings: Vec<Reading>) -> Self {
        let color = match metric {
            Metric::Temperature => BLUE,
            Metric::Humidity => GREEN,
            Metric::Mq6 => RED,
        };
        Self { metric, color, readings }
    }
}

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const FONT_FAMILY: &str = "sans-serif";
const FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// largest magnitude a y axis end may take
const Y_LIMIT: f64 = f64::MAX / 2.0;

static FONT: OnceLock<Result<(), String>> = OnceLock::new();

fn ensure_font() -> Result<(), AppError> {
    FONT.get_or_init(|| {
        plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
            .map_err(|_| "embedded chart font is not a valid ttf".to_string())
    })
    .clone()
    .map_err(AppError::Render)
}

/// render `panels` into a `width` x `height` png
pub fn render_png(panels: &[Panel], width: u32, height: u32) -> Result<Vec<u8>, AppError> {
    let pixels = render_rgb(panels, width, height)?;
    encode_png(&pixels, width, height)
}

/// raw rgb8 frame, row-major
fn render_rgb(panels: &[Panel], width: u32, height: u32) -> Result<Vec<u8>, AppError> {
    if panels.is_empty() || width == 0 || height == 0 {
        return Err(AppError::Render("nothing to draw".into()));
    }
    ensure_font()?;

    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let areas = root.split_evenly((panels.len(), 1));
        for (area, panel) in areas.iter().zip(panels) {
            draw_panel(area, panel).map_err(render_err)?;
        }
        root.present().map_err(render_err)?;
    }

    Ok(pixels)
}

fn render_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Render(e.to_string())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (x_range, y_range) = bounds(&panel.readings);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.metric.title(), (FONT_FAMILY, 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc("Timestamp")
        .y_desc(panel.metric.axis_label())
        .x_labels(8)
        .x_label_formatter(&|ms| format_timestamp(*ms))
        .draw()?;

    let points: Vec<(i64, f64)> = panel
        .readings
        .iter()
        .filter(|r| r.value.is_finite())
        .map(|r| (r.timestamp.timestamp_millis(), r.value.clamp(-Y_LIMIT, Y_LIMIT)))
        .collect();

    chart.draw_series(LineSeries::new(points.iter().copied(), panel.color.stroke_width(2)))?;
    chart.draw_series(
        points
            .iter()
            .map(|&p| Circle::new(p, 3, panel.color.filled())),
    )?;

    Ok(())
}

/// axis ranges with a little headroom; never empty, always finite
fn bounds(readings: &[Reading]) -> (Range<i64>, Range<f64>) {
    let millis = readings.iter().map(|r| r.timestamp.timestamp_millis());
    let x_range = match (millis.clone().min(), millis.max()) {
        (Some(lo), Some(hi)) if lo < hi => lo..hi,
        (Some(at), _) => at - 30_000..at + 30_000,
        _ => {
            let now = Utc::now().timestamp_millis();
            now - 3_600_000..now
        }
    };
    (x_range, value_range(readings.iter().map(|r| r.value)))
}

fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let extent = values
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(-Y_LIMIT, Y_LIMIT))
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
    let Some((lo, hi)) = extent else {
        return 0.0..1.0;
    };

    // relative headroom: a flat 1e17 series needs more than +-1
    let pad = if hi > lo { (hi - lo) * 0.05 } else { (lo.abs() * 0.05).max(1.0) };
    let start = (lo - pad).max(-Y_LIMIT);
    let end = (hi + pad).min(Y_LIMIT);
    if start < end {
        start..end
    } else {
        0.0..1.0
    }
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(render_err)?;
        writer.write_image_data(rgb).map_err(render_err)?;
        writer.finish().map_err(render_err)?;
    }
    Ok(out)
}
