//! Pyramidal Lucas–Kanade sparse optical flow.

use image::GrayImage;

use crate::config::FlowConfig;

/// Single-channel float image, intensities scaled to `[0, 1]`.
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Bilinear sample with clamped borders.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let (x0, y0) = (x.floor() as usize, y.floor() as usize);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (fx, fy) = (x - x0 as f32, y - y0 as f32);
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Half-resolution copy by 2×2 box averaging.
    fn downsample(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (2 * x, 2 * y);
                let (sx1, sy1) = ((sx + 1).min(self.width - 1), (sy + 1).min(self.height - 1));
                data.push(
                    (self.at(sx, sy) + self.at(sx1, sy) + self.at(sx, sy1) + self.at(sx1, sy1)) / 4.0,
                );
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }

    /// Central-difference gradients `(dI/dx, dI/dy)`.
    fn gradients(&self) -> (Plane, Plane) {
        let (w, h) = (self.width, self.height);
        let mut gx = vec![0f32; w * h];
        let mut gy = vec![0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
                let (yu, yd) = (y.saturating_sub(1), (y + 1).min(h - 1));
                if xr > xl {
                    gx[y * w + x] = (self.at(xr, y) - self.at(xl, y)) / (xr - xl) as f32;
                }
                if yd > yu {
                    gy[y * w + x] = (self.at(x, yd) - self.at(x, yu)) / (yd - yu) as f32;
                }
            }
        }
        (
            Plane { width: w, height: h, data: gx },
            Plane { width: w, height: h, data: gy },
        )
    }
}

fn pyramid(base: Plane, max_level: usize, min_side: usize) -> Vec<Plane> {
    let mut levels = vec![base];
    while levels.len() <= max_level {
        let Some(last) = levels.last() else { break };
        if last.width / 2 < min_side || last.height / 2 < min_side {
            break;
        }
        let next = last.downsample();
        levels.push(next);
    }
    levels
}

/// Track `points` from `prev` into `curr`.
///
/// Each result is the new position, or `None` when the point was lost:
/// too little texture under the window, or it left the image.
pub fn track_points(
    prev: &GrayImage,
    curr: &GrayImage,
    points: &[(f32, f32)],
    config: &FlowConfig,
) -> Vec<Option<(f32, f32)>> {
    if prev.dimensions() != curr.dimensions() || prev.width() < 2 || prev.height() < 2 {
        return vec![None; points.len()];
    }

    let half = (config.window_size.max(3) / 2) as i32;
    let min_side = (2 * half + 1) as usize;
    let prev_pyr = pyramid(Plane::from_gray(prev), config.max_level, min_side);
    let curr_pyr = pyramid(Plane::from_gray(curr), prev_pyr.len() - 1, min_side);
    let grads: Vec<(Plane, Plane)> = prev_pyr.iter().map(Plane::gradients).collect();
    let window_area = ((2 * half + 1) * (2 * half + 1)) as f32;
    let (width, height) = (prev.width() as f32, prev.height() as f32);

    points
        .iter()
        .map(|&(px, py)| {
            let mut guess = (0f32, 0f32);
            for level in (0..prev_pyr.len()).rev() {
                let scale = 1.0 / (1u32 << level) as f32;
                let (cx, cy) = (px * scale, py * scale);
                let (img_i, img_j) = (&prev_pyr[level], &curr_pyr[level]);
                let (gx, gy) = (&grads[level].0, &grads[level].1);

                let mut samples = Vec::with_capacity(window_area as usize);
                let (mut gxx, mut gxy, mut gyy) = (0f32, 0f32, 0f32);
                for wy in -half..=half {
                    for wx in -half..=half {
                        let (sx, sy) = (cx + wx as f32, cy + wy as f32);
                        let ix = gx.sample(sx, sy);
                        let iy = gy.sample(sx, sy);
                        gxx += ix * ix;
                        gxy += ix * iy;
                        gyy += iy * iy;
                        samples.push((wx as f32, wy as f32, img_i.sample(sx, sy), ix, iy));
                    }
                }

                let det = gxx * gyy - gxy * gxy;
                let min_eigen = (gxx + gyy) / 2.0 - (((gxx - gyy) / 2.0).powi(2) + gxy * gxy).sqrt();
                if min_eigen / window_area < config.min_eigen_threshold || det.abs() < f32::EPSILON {
                    // Only the base level decides; coarser levels just pass the guess down.
                    if level == 0 {
                        return None;
                    }
                    guess = (2.0 * guess.0, 2.0 * guess.1);
                    continue;
                }

                let mut delta = (0f32, 0f32);
                for _ in 0..config.max_iterations {
                    let (ox, oy) = (cx + guess.0 + delta.0, cy + guess.1 + delta.1);
                    let (mut bx, mut by) = (0f32, 0f32);
                    for &(wx, wy, value, ix, iy) in &samples {
                        let diff = value - img_j.sample(ox + wx, oy + wy);
                        bx += diff * ix;
                        by += diff * iy;
                    }
                    let step_x = (gyy * bx - gxy * by) / det;
                    let step_y = (gxx * by - gxy * bx) / det;
                    delta.0 += step_x;
                    delta.1 += step_y;
                    if step_x * step_x + step_y * step_y < config.epsilon * config.epsilon {
                        break;
                    }
                }

                guess = if level > 0 {
                    (2.0 * (guess.0 + delta.0), 2.0 * (guess.1 + delta.1))
                } else {
                    (guess.0 + delta.0, guess.1 + delta.1)
                };
            }

            let (nx, ny) = (px + guess.0, py + guess.1);
            let inside = nx >= 0.0 && ny >= 0.0 && nx <= width - 1.0 && ny <= height - 1.0;
            (inside && nx.is_finite() && ny.is_finite()).then_some((nx, ny))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Smooth blob texture, shifted by `(dx, dy)`.
    fn blobs(width: u32, height: u32, dx: f32, dy: f32) -> GrayImage {
        let centres = [(30.0, 30.0), (80.0, 40.0), (50.0, 75.0), (95.0, 85.0)];
        GrayImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as f32 - dx, y as f32 - dy);
            let v: f32 = centres
                .iter()
                .map(|&(cx, cy)| {
                    let d2 = (x - cx) * (x - cx) + (y - cy) * (y - cy);
                    200.0 * (-d2 / (2.0 * 36.0)).exp()
                })
                .sum();
            Luma([v.min(255.0) as u8])
        })
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let img = blobs(128, 112, 0.0, 0.0);
        let points = [(30.0, 24.0), (74.0, 40.0), (50.0, 69.0)];
        let tracked = track_points(&img, &img, &points, &FlowConfig::default());
        for (p, t) in points.iter().zip(&tracked) {
            assert_eq!(Some(*p), *t);
        }
    }

    #[test]
    fn test_recovers_small_translation() {
        let prev = blobs(128, 112, 0.0, 0.0);
        let curr = blobs(128, 112, 3.0, -2.0);
        let points = [(24.0, 30.0), (80.0, 34.0), (56.0, 75.0)];
        let tracked = track_points(&prev, &curr, &points, &FlowConfig::default());
        for (p, t) in points.iter().zip(&tracked) {
            let (x, y) = t.expect("point tracked");
            assert!((x - p.0 - 3.0).abs() < 0.5, "x {x} from {}", p.0);
            assert!((y - p.1 + 2.0).abs() < 0.5, "y {y} from {}", p.1);
        }
    }

    #[test]
    fn test_textureless_point_is_lost() {
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        let tracked = track_points(&flat, &flat, &[(32.0, 32.0)], &FlowConfig::default());
        assert_eq!(tracked, vec![None]);
    }
}
