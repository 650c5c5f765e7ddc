//! Frame sources for equirectangular input.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::collaborators::FrameSource;
use crate::error::{MediaError, MediaResult};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Reads a directory of still images in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(MediaError::FileNotFound(dir));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        info!(dir = %dir.display(), frames = files.len(), "Opened image sequence");
        Ok(Self {
            dir,
            files,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        debug!(path = %path.display(), "Reading frame");
        Ok(Some(image::open(path)?.to_rgb8()))
    }

    fn stem(&self) -> Option<String> {
        self.dir.file_name().map(|n| n.to_string_lossy().into_owned())
    }
}

#[cfg(feature = "opencv")]
pub use capture::VideoCaptureSource;

#[cfg(feature = "opencv")]
mod capture {
    use super::*;
    use opencv::core::Mat;
    use opencv::imgproc;
    use opencv::prelude::{MatTraitConst, MatTraitConstManual, VideoCaptureTrait, VideoCaptureTraitConst};
    use opencv::videoio::{VideoCapture, CAP_ANY};

    /// OpenCV `VideoCapture` over a file or a camera index.
    pub struct VideoCaptureSource {
        cap: VideoCapture,
        stem: Option<String>,
    }

    impl VideoCaptureSource {
        pub fn from_file(path: impl AsRef<Path>) -> MediaResult<Self> {
            let path = path.as_ref();
            let path_str = path
                .to_str()
                .ok_or_else(|| MediaError::source_failed(format!("non UTF-8 path: {}", path.display())))?;
            let cap = VideoCapture::from_file(path_str, CAP_ANY)?;
            if !cap.is_opened()? {
                return Err(MediaError::source_failed(format!("failed to open {}", path.display())));
            }
            Ok(Self {
                cap,
                stem: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            })
        }

        pub fn from_camera(index: i32) -> MediaResult<Self> {
            let cap = VideoCapture::new(index, CAP_ANY)?;
            if !cap.is_opened()? {
                return Err(MediaError::source_failed(format!("failed to open camera {index}")));
            }
            Ok(Self { cap, stem: None })
        }
    }

    impl FrameSource for VideoCaptureSource {
        fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            let mut bgr = Mat::default();
            if !self.cap.read(&mut bgr)? || bgr.empty() {
                return Ok(None);
            }
            let mut rgb = Mat::default();
            imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;
            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            let bytes = rgb.data_bytes()?.to_vec();
            RgbImage::from_raw(width, height, bytes)
                .map(Some)
                .ok_or_else(|| MediaError::source_failed("decoded frame has unexpected size"))
        }

        fn stem(&self) -> Option<String> {
            self.stem.clone()
        }
    }
}
