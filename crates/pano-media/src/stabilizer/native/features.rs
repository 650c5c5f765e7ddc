//! Shi–Tomasi corner detection.

use image::GrayImage;

use crate::config::CornerConfig;

/// A corner position and its minimum-eigenvalue response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Strongest well-separated corners of `gray`, best first.
pub fn good_features_to_track(gray: &GrayImage, config: &CornerConfig) -> Vec<Corner> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let radius = config.block_size.max(1) / 2;
    // Gradients are undefined on the outer ring; the window adds `radius` more.
    let margin = 1 + radius;
    if w <= 2 * margin || h <= 2 * margin || config.max_corners == 0 {
        return Vec::new();
    }

    let px = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as f32;
    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            gx[y * w + x] = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            gy[y * w + x] = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
        }
    }

    let mut response = vec![0f32; w * h];
    let mut max_response = 0f32;
    for y in margin..h - margin {
        for x in margin..w - margin {
            let (mut a, mut b, mut c) = (0f32, 0f32, 0f32);
            for wy in y - radius..=y + radius {
                for wx in x - radius..=x + radius {
                    let ix = gx[wy * w + wx];
                    let iy = gy[wy * w + wx];
                    a += ix * ix;
                    b += ix * iy;
                    c += iy * iy;
                }
            }
            let half_trace = (a + c) / 2.0;
            let lambda = half_trace - (((a - c) / 2.0).powi(2) + b * b).sqrt();
            response[y * w + x] = lambda;
            max_response = max_response.max(lambda);
        }
    }
    if max_response <= 0.0 {
        return Vec::new();
    }

    let floor = config.quality_level * max_response;
    let mut candidates = Vec::new();
    for y in margin..h - margin {
        for x in margin..w - margin {
            let r = response[y * w + x];
            if r <= 0.0 || r < floor {
                continue;
            }
            let is_peak = (y - 1..=y + 1)
                .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (nx, ny)))
                .all(|(nx, ny)| response[ny * w + nx] <= r);
            if is_peak {
                candidates.push(Corner {
                    x: x as f32,
                    y: y as f32,
                    score: r,
                });
            }
        }
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let min_dist_sq = config.min_distance * config.min_distance;
    let mut kept: Vec<Corner> = Vec::with_capacity(config.max_corners.min(candidates.len()));
    for corner in candidates {
        let far_enough = kept.iter().all(|k| {
            let (dx, dy) = (k.x - corner.x, k.y - corner.y);
            dx * dx + dy * dy >= min_dist_sq
        });
        if far_enough {
            kept.push(corner);
            if kept.len() == config.max_corners {
                break;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn squares(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let on = (20..40).contains(&x) && (20..40).contains(&y)
                || (70..90).contains(&x) && (50..80).contains(&y);
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(good_features_to_track(&flat, &CornerConfig::default()).is_empty());
    }

    #[test]
    fn test_square_corners_found_and_separated() {
        let config = CornerConfig {
            min_distance: 10.0,
            ..Default::default()
        };
        let corners = good_features_to_track(&squares(120, 100), &config);
        assert!(corners.len() >= 8, "found {}", corners.len());
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                let d = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(d >= 10.0);
            }
        }
        assert!(corners.windows(2).all(|p| p[0].score >= p[1].score));
    }

    #[test]
    fn test_max_corners_respected() {
        let config = CornerConfig {
            max_corners: 3,
            min_distance: 1.0,
            ..Default::default()
        };
        assert_eq!(good_features_to_track(&squares(120, 100), &config).len(), 3);
    }
}
