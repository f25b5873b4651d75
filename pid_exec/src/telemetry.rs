//! Telemetry recording for the control loop
//!
//! Every computation the control loop performs appends one sample here. The
//! four fields are kept as parallel sequences in arrival order, matching the
//! on-disk format of one file per field with one value per line. Because the
//! input channels run at independent rates the sequences can end misaligned,
//! so they are truncated to the minimum common length before persistence.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use image::{Rgb, RgbImage};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Width of the rendered results plot in pixels.
const PLOT_WIDTH: u32 = 800;

/// Height of the rendered results plot in pixels.
const PLOT_HEIGHT: u32 = 600;

/// Margin between the plot axes and the image border in pixels.
const PLOT_MARGIN: u32 = 40;

/// Padding applied around the data ranges, in data units.
const PLOT_RANGE_PAD: f64 = 2.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single aligned control-loop sample.
///
/// Created when an actuation command is published and immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct TelemetrySample {
    pub desired_velocity: f64,
    pub current_velocity: f64,
    pub timestamp: f64,
    pub acceleration: f64,
}

/// Accumulates control-loop samples for persistence and plotting at shutdown.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    desired_velocity: Vec<f64>,
    current_velocity: Vec<f64>,
    current_time: Vec<f64>,
    acceleration: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while persisting telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Could not write the telemetry file {0:?}: {1}")]
    WriteError(PathBuf, std::io::Error),

    #[error("Could not render the results plot: {0}")]
    PlotError(image::ImageError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TelemetryStore {
    /// Append a sample to all four sequences.
    pub fn record(&mut self, sample: TelemetrySample) {
        self.desired_velocity.push(sample.desired_velocity);
        self.current_velocity.push(sample.current_velocity);
        self.current_time.push(sample.timestamp);
        self.acceleration.push(sample.acceleration);
    }

    /// Number of samples currently recorded (before alignment this is the
    /// length of the longest sequence).
    pub fn len(&self) -> usize {
        self.desired_velocity
            .len()
            .max(self.current_velocity.len())
            .max(self.current_time.len())
            .max(self.acceleration.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Align the four sequences by truncating them to the minimum common
    /// length, keeping the earliest samples.
    ///
    /// Idempotent: finalizing an already aligned store changes nothing.
    /// Returns the aligned sample count.
    pub fn finalize(&mut self) -> usize {
        let aligned = self
            .desired_velocity
            .len()
            .min(self.current_velocity.len())
            .min(self.current_time.len())
            .min(self.acceleration.len());

        self.desired_velocity.truncate(aligned);
        self.current_velocity.truncate(aligned);
        self.current_time.truncate(aligned);
        self.acceleration.truncate(aligned);

        aligned
    }

    /// Write the four per-field log files into the given directory, one
    /// value per line in arrival order.
    ///
    /// Call [`TelemetryStore::finalize`] first so the files line up row by
    /// row.
    pub fn write_logs(&self, dir: &Path) -> Result<(), TelemetryError> {
        write_field(&dir.join("desired_velocity.log"), &self.desired_velocity)?;
        write_field(&dir.join("current_velocity.log"), &self.current_velocity)?;
        write_field(&dir.join("current_time.log"), &self.current_time)?;
        write_field(&dir.join("acceleration.log"), &self.acceleration)?;

        debug!("Telemetry logs written to {:?}", dir);

        Ok(())
    }

    /// Render the desired velocity (green), current velocity (blue) and
    /// acceleration (orange) time series into a PNG at the given path.
    ///
    /// This is a plain pixel polyline plot, enough to eyeball the step
    /// response of a run. Requires an aligned, non-empty store.
    pub fn render_plot(&self, path: &Path) -> Result<(), TelemetryError> {
        let mut img = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, Rgb([255, 255, 255]));

        // Data ranges, padded so traces don't hug the axes
        let t_range = padded_range(&self.current_time);
        let v_range = padded_range(
            &[
                self.desired_velocity.as_slice(),
                self.current_velocity.as_slice(),
                self.acceleration.as_slice(),
            ]
            .concat(),
        );

        draw_axes(&mut img);

        draw_series(
            &mut img,
            &self.current_time,
            &self.desired_velocity,
            t_range,
            v_range,
            Rgb([44, 160, 44]),
        );
        draw_series(
            &mut img,
            &self.current_time,
            &self.current_velocity,
            t_range,
            v_range,
            Rgb([31, 119, 180]),
        );
        draw_series(
            &mut img,
            &self.current_time,
            &self.acceleration,
            t_range,
            v_range,
            Rgb([255, 127, 14]),
        );

        img.save(path).map_err(TelemetryError::PlotError)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Write one field sequence as a one-value-per-line text file.
fn write_field(path: &Path, values: &[f64]) -> Result<(), TelemetryError> {
    let file =
        File::create(path).map_err(|e| TelemetryError::WriteError(path.to_path_buf(), e))?;
    let mut writer = BufWriter::new(file);

    for value in values {
        writeln!(writer, "{}", value)
            .map_err(|e| TelemetryError::WriteError(path.to_path_buf(), e))?;
    }

    writer
        .flush()
        .map_err(|e| TelemetryError::WriteError(path.to_path_buf(), e))
}

/// Get the padded (min, max) range of a value sequence.
///
/// A degenerate range (empty or constant data) is widened so the pixel
/// mapping never divides by zero.
fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if min.is_finite() && max.is_finite() {
        (min - PLOT_RANGE_PAD, max + PLOT_RANGE_PAD)
    } else {
        (-PLOT_RANGE_PAD, PLOT_RANGE_PAD)
    }
}

/// Draw the left and bottom axis lines.
fn draw_axes(img: &mut RgbImage) {
    let grey = Rgb([180, 180, 180]);

    for y in PLOT_MARGIN..(PLOT_HEIGHT - PLOT_MARGIN) {
        img.put_pixel(PLOT_MARGIN, y, grey);
    }
    for x in PLOT_MARGIN..(PLOT_WIDTH - PLOT_MARGIN) {
        img.put_pixel(x, PLOT_HEIGHT - PLOT_MARGIN, grey);
    }
}

/// Draw one time series as a polyline.
fn draw_series(
    img: &mut RgbImage,
    times: &[f64],
    values: &[f64],
    t_range: (f64, f64),
    v_range: (f64, f64),
    colour: Rgb<u8>,
) {
    let points: Vec<(i32, i32)> = times
        .iter()
        .zip(values.iter())
        .map(|(&t, &v)| (map_to_px(t, t_range, true), map_to_px(v, v_range, false)))
        .collect();

    for pair in points.windows(2) {
        draw_line(img, pair[0], pair[1], colour);
    }
}

/// Map a data value to a pixel coordinate on the x or y axis.
fn map_to_px(value: f64, range: (f64, f64), x_axis: bool) -> i32 {
    let frac = (value - range.0) / (range.1 - range.0);

    if x_axis {
        let span = (PLOT_WIDTH - 2 * PLOT_MARGIN) as f64;
        (PLOT_MARGIN as f64 + frac * span).round() as i32
    } else {
        // Pixel y grows downwards
        let span = (PLOT_HEIGHT - 2 * PLOT_MARGIN) as f64;
        ((PLOT_HEIGHT - PLOT_MARGIN) as f64 - frac * span).round() as i32
    }
}

/// Draw a line between two pixel points (Bresenham).
fn draw_line(img: &mut RgbImage, from: (i32, i32), to: (i32, i32), colour: Rgb<u8>) {
    let (mut x, mut y) = from;
    let (x1, y1) = to;

    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x >= 0 && y >= 0 && (x as u32) < PLOT_WIDTH && (y as u32) < PLOT_HEIGHT {
            img.put_pixel(x as u32, y as u32, colour);
        }

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn sample(t: f64) -> TelemetrySample {
        TelemetrySample {
            desired_velocity: 10.0,
            current_velocity: t,
            timestamp: t,
            acceleration: 10.0 - t,
        }
    }

    #[test]
    fn test_finalize_truncates_to_min_length() {
        let mut store = TelemetryStore::default();

        for i in 0..5 {
            store.record(sample(i as f64));
        }

        // Simulate a trailing misaligned entry: one sequence one short
        store.current_time.truncate(4);

        assert_eq!(store.finalize(), 4);
        assert_eq!(store.desired_velocity.len(), 4);
        assert_eq!(store.current_velocity.len(), 4);
        assert_eq!(store.current_time.len(), 4);
        assert_eq!(store.acceleration.len(), 4);

        // Earliest-first order is preserved
        assert_eq!(store.current_velocity, vec![0.0, 1.0, 2.0, 3.0]);

        // Idempotent
        assert_eq!(store.finalize(), 4);
        assert_eq!(store.current_velocity, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_write_logs() {
        let mut store = TelemetryStore::default();
        store.record(sample(1.0));
        store.record(sample(2.0));
        store.finalize();

        let dir = std::env::temp_dir().join(format!("pid_telem_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        store.write_logs(&dir).unwrap();

        let times = std::fs::read_to_string(dir.join("current_time.log")).unwrap();
        assert_eq!(times, "1\n2\n");

        let accs = std::fs::read_to_string(dir.join("acceleration.log")).unwrap();
        assert_eq!(accs, "9\n8\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_plot() {
        let mut store = TelemetryStore::default();
        for i in 0..10 {
            store.record(sample(i as f64));
        }
        store.finalize();

        let path = std::env::temp_dir().join(format!("pid_plot_test_{}.png", std::process::id()));

        store.render_plot(&path).unwrap();
        assert!(path.exists());

        std::fs::remove_file(&path).ok();
    }
}
