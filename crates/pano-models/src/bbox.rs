use serde::{Deserialize, Serialize};

/// An axis-aligned pixel box in `(x1, y1, x2, y2)` form, exclusive of
/// `x2`/`y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from detector output, truncating each coordinate toward zero.
    pub fn from_xyxy(coords: [f32; 4]) -> Self {
        Self::new(
            coords[0] as i32,
            coords[1] as i32,
            coords[2] as i32,
            coords[3] as i32,
        )
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// `(x, y)` of the top-left corner.
    pub fn top_left(&self) -> (i32, i32) {
        (self.x1, self.y1)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Clip to `[0, width) x [0, height)`.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as i32;
        let h = height as i32;
        BoundingBox::new(
            self.x1.clamp(0, w),
            self.y1.clamp(0, h),
            self.x2.clamp(0, w),
            self.y2.clamp(0, h),
        )
    }

    /// Width and height ratios `self / anchor`, or `None` for a degenerate anchor.
    pub fn scale_from(&self, anchor: &BoundingBox) -> Option<(f64, f64)> {
        if anchor.is_empty() {
            return None;
        }
        Some((
            self.width() as f64 / anchor.width() as f64,
            self.height() as f64 / anchor.height() as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_and_extent() {
        let b = BoundingBox::from_xyxy([10.9, 20.2, 50.7, 60.0]);
        assert_eq!(b, BoundingBox::new(10, 20, 50, 60));
        assert_eq!(b.width(), 40);
        assert_eq!(b.height(), 40);
        assert_eq!(b.area(), 1600);
    }

    #[test]
    fn test_union_and_clamp() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, -3, 20, 8);
        assert_eq!(a.union(&b), BoundingBox::new(0, -3, 20, 10));
        assert_eq!(a.union(&b).clamp_to(16, 16), BoundingBox::new(0, 0, 16, 10));
    }

    #[test]
    fn test_scale_from_degenerate_anchor() {
        let current = BoundingBox::new(0, 0, 20, 10);
        assert_eq!(current.scale_from(&BoundingBox::new(0, 0, 10, 10)), Some((2.0, 1.0)));
        assert_eq!(current.scale_from(&BoundingBox::new(3, 3, 3, 9)), None);
    }
}
