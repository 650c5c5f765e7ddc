//! Marker-relative viewport locator.
//!
//! Calibration stores the angular offset between the viewport centre and
//! the marker; afterwards every frame is cropped at `marker + offset`, so
//! the viewport follows the marker as the camera turns.

use image::RgbImage;
use pano_models::AngularOffset;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collaborators::{MarkerLocator, PerspectiveProjector};
use crate::config::ViewportConfig;
use crate::error::MediaResult;

/// Result of locating the viewport in one frame.
#[derive(Debug)]
pub enum RoiOutcome {
    Located(RgbImage),
    /// The marker was not visible in this frame.
    MarkerLost,
    /// No offset has been calibrated yet.
    Uncalibrated,
}

pub struct RoiLocator {
    marker: Arc<dyn MarkerLocator>,
    projector: Arc<dyn PerspectiveProjector>,
    config: ViewportConfig,
    offset: Option<AngularOffset>,
}

impl RoiLocator {
    pub fn new(
        marker: Arc<dyn MarkerLocator>,
        projector: Arc<dyn PerspectiveProjector>,
        config: ViewportConfig,
    ) -> Self {
        Self {
            marker,
            projector,
            config,
            offset: None,
        }
    }

    pub fn offset(&self) -> Option<AngularOffset> {
        self.offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.offset.is_some()
    }

    /// `(width, height)` of the viewport cut from `frame`.
    pub fn view_size(&self, frame: &RgbImage) -> (u32, u32) {
        self.config.view_size(frame.width(), frame.height())
    }

    fn marker_angles(&self, frame: &RgbImage) -> MediaResult<Option<AngularOffset>> {
        Ok(self.marker.locate(frame)?.map(|(x, y)| {
            let (theta, phi) = self.projector.pixel_to_spherical(frame, x, y);
            AngularOffset::new(theta, phi)
        }))
    }

    /// Store `centre − marker`. Returns the new offset, or `None` (keeping
    /// any previous offset) when the marker is not visible.
    pub fn calibrate(&mut self, frame: &RgbImage) -> MediaResult<Option<AngularOffset>> {
        let Some(marker) = self.marker_angles(frame)? else {
            warn!("Marker not visible during calibration");
            return Ok(None);
        };

        let centre_x = frame.width() as f64 / self.config.width_divisor.max(1) as f64;
        let centre_y = frame.height() as f64 / self.config.height_divisor.max(1) as f64;
        let (theta, phi) = self.projector.pixel_to_spherical(frame, centre_x, centre_y);
        let centre = AngularOffset::new(theta, phi) + self.config.calibration_bias;

        let offset = centre - marker;
        info!(%centre, %marker, %offset, "Calibrated viewport offset");
        self.offset = Some(offset);
        Ok(Some(offset))
    }

    /// Crop this frame's viewport.
    pub fn locate(&self, frame: &RgbImage) -> MediaResult<RoiOutcome> {
        let Some(offset) = self.offset else {
            return Ok(RoiOutcome::Uncalibrated);
        };
        let Some(marker) = self.marker_angles(frame)? else {
            return Ok(RoiOutcome::MarkerLost);
        };

        let view = marker + offset;
        let (width, height) = self.view_size(frame);
        debug!(direction = %view, width, height, "Cropping viewport");
        let roi = self
            .projector
            .crop(frame, self.config.fov, view.theta, view.phi, height, width)?;
        Ok(RoiOutcome::Located(roi))
    }
}
