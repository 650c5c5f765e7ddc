//! Viewport ingest: equirectangular frame in, indexed stabilized viewport
//! out.
//!
//! The frame counter is advanced before the marker is looked up and rolled
//! back when the frame is dropped, so accepted frames always carry
//! contiguous indices.

use std::borrow::Cow;
use std::sync::Arc;

use image::RgbImage;
use pano_media::{
    metrics, EquirectRotator, Frame, OutputKind, OutputLayout, RoiLocator, RoiOutcome,
    StabilizationOutcome, Stabilizer,
};
use pano_models::{FrameIndex, RotationSpec};
use tracing::{debug, warn};

use crate::error::WorkerResult;

/// Why a frame produced no viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MarkerLost,
    Uncalibrated,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MarkerLost => "marker_lost",
            DropReason::Uncalibrated => "uncalibrated",
        }
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Accepted {
        frame: Frame,
        stabilization: StabilizationOutcome,
    },
    Dropped(DropReason),
}

pub struct ViewportIngest {
    locator: RoiLocator,
    stabilizer: Stabilizer,
    rotation: Option<RotationSpec>,
    rotator: Option<EquirectRotator>,
    output: Option<Arc<OutputLayout>>,
    next_index: FrameIndex,
    dropped: u64,
}

impl ViewportIngest {
    pub fn new(
        locator: RoiLocator,
        stabilizer: Stabilizer,
        rotation: Option<RotationSpec>,
        output: Option<Arc<OutputLayout>>,
    ) -> Self {
        Self {
            locator,
            stabilizer,
            rotation: rotation.filter(|spec| !spec.is_identity()),
            rotator: None,
            output,
            next_index: 0,
            dropped: 0,
        }
    }

    /// Number of accepted frames, which is also the next index handed out.
    pub fn accepted(&self) -> FrameIndex {
        self.next_index
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_calibrated(&self) -> bool {
        self.locator.is_calibrated()
    }

    /// Apply the configured rotation, building its table on first use.
    fn orient<'a>(&mut self, frame: &'a RgbImage) -> WorkerResult<Cow<'a, RgbImage>> {
        let Some(spec) = self.rotation else {
            return Ok(Cow::Borrowed(frame));
        };
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let stale = self
            .rotator
            .as_ref()
            .map_or(true, |r| r.mapping().width() != width || r.mapping().height() != height);
        if stale {
            self.rotator = Some(EquirectRotator::new(height, width, spec)?);
        }
        match &self.rotator {
            Some(rotator) => Ok(Cow::Owned(rotator.rotate(frame)?)),
            None => Ok(Cow::Borrowed(frame)),
        }
    }

    /// Calibrate the viewport offset on `frame`. `false` if the marker is
    /// not visible.
    pub fn calibrate(&mut self, frame: &RgbImage) -> WorkerResult<bool> {
        let oriented = self.orient(frame)?;
        let calibrated = self.locator.calibrate(&oriented)?.is_some();
        if calibrated {
            self.stabilizer.reset();
        }
        Ok(calibrated)
    }

    pub fn ingest(&mut self, frame: &RgbImage) -> WorkerResult<IngestOutcome> {
        let oriented = self.orient(frame)?;
        let index = self.next_index;
        self.next_index += 1;
        metrics::record_frame_ingested();

        if let Some(layout) = &self.output {
            layout.write(&OutputKind::OriginalEr, index, frame.clone())?;
        }

        let roi = match self.locator.locate(&oriented)? {
            RoiOutcome::Located(roi) => roi,
            RoiOutcome::MarkerLost => return Ok(self.drop_frame(index, DropReason::MarkerLost)),
            RoiOutcome::Uncalibrated => return Ok(self.drop_frame(index, DropReason::Uncalibrated)),
        };

        let stabilized = self.stabilizer.stabilize(&roi)?;
        if let Some(layout) = &self.output {
            layout.write(&OutputKind::PrimaryRegion, index, stabilized.image.clone())?;
        }
        debug!(frame = index, outcome = ?stabilized.outcome, "Viewport accepted");
        Ok(IngestOutcome::Accepted {
            frame: Frame::new(index, stabilized.image),
            stabilization: stabilized.outcome,
        })
    }

    fn drop_frame(&mut self, index: FrameIndex, reason: DropReason) -> IngestOutcome {
        self.next_index -= 1;
        self.dropped += 1;
        metrics::record_frame_dropped(reason.as_str());
        warn!(frame = index, reason = reason.as_str(), "Frame dropped");
        IngestOutcome::Dropped(reason)
    }
}
