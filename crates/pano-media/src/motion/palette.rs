//! Trajectory colours per label.

use image::{Rgb, Rgba};
use std::collections::HashMap;

/// Fixed colours for common tabletop objects, RGB.
const LABEL_COLOURS: &[(&str, [u8; 3])] = &[
    ("apple", [141, 64, 48]),
    ("jar", [155, 102, 68]),
    ("suitcase", [51, 46, 41]),
    ("basket", [203, 163, 112]),
    ("flower_pot", [56, 120, 31]),
    ("hat", [94, 79, 63]),
    ("cup", [183, 197, 216]),
    ("banana", [248, 206, 118]),
    ("crock_pot", [200, 200, 200]),
    ("bottle", [213, 220, 230]),
    ("person", [10, 10, 50]),
    ("watch", [70, 151, 189]),
    ("ball", [255, 255, 255]),
    ("figurine", [255, 255, 255]),
    ("book", [0, 0, 0]),
    ("knife", [0, 0, 0]),
    ("orange_(fruit)", [255, 149, 0]),
    ("keychain", [255, 215, 0]),
];

/// Light gray used for the whole-session trail overlay.
pub const TRAIL_COLOUR: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone)]
pub struct LabelPalette {
    fixed: HashMap<String, Rgba<u8>>,
}

impl Default for LabelPalette {
    fn default() -> Self {
        Self {
            fixed: LABEL_COLOURS
                .iter()
                .map(|(label, [r, g, b])| (label.to_string(), Rgba([*r, *g, *b, 255])))
                .collect(),
        }
    }
}

impl LabelPalette {
    /// Table colour for `label`, else the sampled pixel colour.
    pub fn resolve(&self, label: &str, sampled: Rgb<u8>) -> Rgba<u8> {
        self.fixed
            .get(label)
            .copied()
            .unwrap_or(Rgba([sampled[0], sampled[1], sampled[2], 255]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_colour_wins_over_sample() {
        let palette = LabelPalette::default();
        assert_eq!(palette.resolve("cup", Rgb([1, 2, 3])), Rgba([183, 197, 216, 255]));
        assert_eq!(palette.resolve("keychain", Rgb([1, 2, 3])), Rgba([255, 215, 0, 255]));
    }

    #[test]
    fn test_unknown_label_uses_sample() {
        let palette = LabelPalette::default();
        assert_eq!(palette.resolve("teapot", Rgb([9, 8, 7])), Rgba([9, 8, 7, 255]));
    }
}
