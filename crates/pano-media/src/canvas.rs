//! Alpha compositing of RGBA layers.
//!
//! Lines, discs and outlines are drawn with `imageproc::drawing`; those
//! overwrite pixels, so anything translucent goes through [`blend_over`].

use image::{Rgba, RgbaImage};

/// Porter–Duff "over" of `src` onto `dst` with its top-left at `(x, y)`.
///
/// `opacity` scales the source alpha; out-of-canvas parts are clipped.
pub fn blend_over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + src.width() as i64).min(dw);
    let y_end = (y + src.height() as i64).min(dh);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let s = src.get_pixel((tx - x) as u32, (ty - y) as u32);
            let d = dst.get_pixel_mut(tx as u32, ty as u32);
            *d = over(*s, *d, opacity);
        }
    }
}

fn over(src: Rgba<u8>, dst: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
