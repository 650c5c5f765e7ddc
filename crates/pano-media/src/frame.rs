//! Indexed viewport frames.

use image::{GrayImage, RgbImage};
use pano_models::FrameIndex;
use std::sync::Arc;

/// A viewport frame and its position in the accepted sequence.
///
/// The pixel buffer is shared so the same frame can sit in the detection
/// queue, the saliency window and the persistence path without copies.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: FrameIndex,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: FrameIndex, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_gray(&self) -> GrayImage {
        to_gray(&self.image)
    }
}

/// Luma conversion used everywhere a grayscale view is needed.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}
