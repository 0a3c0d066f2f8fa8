//! Bit-difference-per-round chart.
//!
//! Each task is drawn as a polyline of its round bit differences on a
//! white canvas. A dashed grey line marks half the block width, the ideal
//! avalanche level. The image carries no text, so [`legend`] gives the
//! task for each colour.

use std::path::{Path, PathBuf};

use image::{ImageError, Rgba, RgbaImage};
use thiserror::Error;

use crate::report::AnalysisResultSet;

const MARGIN: u32 = 40;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([0, 0, 0, 255]);
const GRID: Rgba<u8> = Rgba([170, 170, 170, 255]);

const PALETTE: [Rgba<u8>; 8] = [
    Rgba([31, 119, 180, 255]),
    Rgba([255, 127, 14, 255]),
    Rgba([44, 160, 44, 255]),
    Rgba([214, 39, 40, 255]),
    Rgba([148, 103, 189, 255]),
    Rgba([140, 86, 75, 255]),
    Rgba([227, 119, 194, 255]),
    Rgba([23, 190, 207, 255]),
];

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("nothing to plot: no task has any rounds")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

/// Canvas size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
        }
    }
}

/// Colour used for the task at `index`, cycling through the palette.
pub fn task_color(index: usize) -> Rgba<u8> {
    PALETTE[index % PALETTE.len()]
}

/// Task id and line colour, in drawing order.
pub fn legend(results: &AnalysisResultSet) -> Vec<(String, Rgba<u8>)> {
    results
        .iter()
        .enumerate()
        .map(|(index, task)| (task.task.clone(), task_color(index)))
        .collect()
}

/// `#rrggbb` form of a colour.
pub fn hex_color(color: Rgba<u8>) -> String {
    let Rgba([r, g, b, _]) = color;
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// File name for a chart: `avalanche_<FAMILY>_<CRITERIA>.png`.
pub fn chart_file_name(results: &AnalysisResultSet) -> String {
    format!("avalanche_{}_{}.png", results.family, results.criteria)
}

/// Draw the chart into a new image.
pub fn render_chart(
    results: &AnalysisResultSet,
    options: ChartOptions,
) -> Result<RgbaImage, ChartError> {
    let rounds = results.max_rounds();
    if rounds == 0 {
        return Err(ChartError::Empty);
    }

    // Y range covers the widest block so the half-width line is meaningful.
    let block_width = results
        .iter()
        .flat_map(|t| &t.rounds)
        .map(|r| r.width)
        .max()
        .unwrap_or(0);
    let peak = results
        .iter()
        .flat_map(|t| &t.rounds)
        .map(|r| r.bit_difference)
        .max()
        .unwrap_or(0);
    let y_max = (block_width as u32).max(peak).max(1);

    let width = options.width.max(2 * MARGIN + 2);
    let height = options.height.max(2 * MARGIN + 2);
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    let plot = PlotArea {
        left: MARGIN,
        right: width - MARGIN,
        top: MARGIN,
        bottom: height - MARGIN,
        rounds,
        y_max,
    };

    // Axes and round ticks
    draw_line(&mut canvas, (plot.left, plot.top), (plot.left, plot.bottom), AXIS);
    draw_line(&mut canvas, (plot.left, plot.bottom), (plot.right, plot.bottom), AXIS);
    for i in 0..rounds {
        let x = plot.x(i);
        draw_line(&mut canvas, (x, plot.bottom), (x, plot.bottom + 4), AXIS);
    }

    // Ideal avalanche: half the block flips
    let half = plot.y(y_max / 2);
    let mut x = plot.left;
    while x < plot.right {
        draw_line(&mut canvas, (x, half), ((x + 6).min(plot.right), half), GRID);
        x += 12;
    }

    for (index, task) in results.iter().enumerate() {
        let color = task_color(index);
        let points: Vec<(u32, u32)> = task
            .rounds
            .iter()
            .enumerate()
            .map(|(i, r)| (plot.x(i), plot.y(r.bit_difference)))
            .collect();
        for pair in points.windows(2) {
            draw_line(&mut canvas, pair[0], pair[1], color);
        }
        for &(px, py) in &points {
            fill_rect(&mut canvas, px.saturating_sub(2), py.saturating_sub(2), 5, 5, color);
        }
    }

    Ok(canvas)
}

/// Render the chart and write it as PNG into `dir`, returning the file path.
pub fn save_chart(
    results: &AnalysisResultSet,
    dir: &Path,
    options: ChartOptions,
) -> Result<PathBuf, ChartError> {
    let canvas = render_chart(results, options)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(chart_file_name(results));
    canvas.save(&path)?;
    tracing::info!(path = %path.display(), "chart written");
    for (task, color) in legend(results) {
        tracing::debug!(task = %task, color = %hex_color(color), "chart legend");
    }
    Ok(path)
}

struct PlotArea {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
    rounds: usize,
    y_max: u32,
}

impl PlotArea {
    fn x(&self, round_index: usize) -> u32 {
        if self.rounds <= 1 {
            return (self.left + self.right) / 2;
        }
        let span = u64::from(self.right - self.left);
        self.left + (span * round_index as u64 / (self.rounds as u64 - 1)) as u32
    }

    fn y(&self, bits: u32) -> u32 {
        let span = u64::from(self.bottom - self.top);
        let bits = u64::from(bits.min(self.y_max));
        self.bottom - (span * bits / u64::from(self.y_max)) as u32
    }
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let (cw, ch) = (canvas.width(), canvas.height());
    for dy in 0..h {
        for dx in 0..w {
            let px = x + dx;
            let py = y + dy;
            if px < cw && py < ch {
                canvas.put_pixel(px, py, color);
            }
        }
    }
}

/// Bresenham line between two points, clipped to the canvas.
fn draw_line(canvas: &mut RgbaImage, from: (u32, u32), to: (u32, u32), color: Rgba<u8>) {
    let (mut x0, mut y0) = (i64::from(from.0), i64::from(from.1));
    let (x1, y1) = (i64::from(to.0), i64::from(to.1));
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));

    loop {
        if (0..cw).contains(&x0) && (0..ch).contains(&y0) {
            canvas.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
