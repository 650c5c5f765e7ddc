//! Motion history image (MHI).
//!
//! Each pixel holds the timestamp of the last frame it moved in. Rendering
//! maps that age linearly onto intensity: a pixel refreshed at `t` shows 255
//! at `t` and reaches 0 exactly `duration` frames later.

use image::{GrayImage, Luma};
use ndarray::Array2;

/// Timestamp of a pixel that has not moved within the window.
const NEVER: f32 = f32::NEG_INFINITY;

#[derive(Debug, Clone)]
pub struct MotionHistory {
    timestamps: Array2<f32>,
    duration: f32,
}

impl MotionHistory {
    pub fn new(width: u32, height: u32, duration: u32) -> Self {
        Self {
            timestamps: Array2::from_elem((height as usize, width as usize), NEVER),
            duration: duration.max(1) as f32,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let (rows, cols) = self.timestamps.dim();
        (cols as u32, rows as u32)
    }

    /// Stamp foreground pixels with `timestamp`; forget pixels older than the window.
    pub fn update(&mut self, foreground: &GrayImage, timestamp: f32) {
        let horizon = timestamp - self.duration;
        for ((row, col), ts) in self.timestamps.indexed_iter_mut() {
            let moving = (col as u32) < foreground.width()
                && (row as u32) < foreground.height()
                && foreground.get_pixel(col as u32, row as u32)[0] > 0;
            if moving {
                *ts = timestamp;
            } else if *ts < horizon {
                *ts = NEVER;
            }
        }
    }

    /// Intensity of one pixel at `timestamp`.
    pub fn intensity_at(&self, x: u32, y: u32, timestamp: f32) -> u8 {
        let ts = self.timestamps[[y as usize, x as usize]];
        let age = (ts - (timestamp - self.duration)) / self.duration;
        (255.0 * age.clamp(0.0, 1.0)).round() as u8
    }

    pub fn render(&self, timestamp: f32) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| Luma([self.intensity_at(x, y, timestamp)]))
    }
}

/// Binary foreground: `|prev − curr| > threshold` → 255.
pub fn foreground_mask(prev: &GrayImage, curr: &GrayImage, threshold: u8) -> GrayImage {
    let (w, h) = curr.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let moved = x < prev.width()
            && y < prev.height()
            && prev.get_pixel(x, y)[0].abs_diff(curr.get_pixel(x, y)[0]) > threshold;
        Luma([if moved { 255 } else { 0 }])
    })
}
