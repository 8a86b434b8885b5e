//! Where frames come from. The transport treats frames as opaque bytes; a
//! source only has to hand over one encoded JPEG per call.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no .jpg or .jpeg files in {0}")]
    NoFrames(PathBuf),

    #[error("{0} is not a JPEG file")]
    NotJpeg(PathBuf),
}

pub trait FrameSource: Send {
    /// Produce the frame for the current moment.
    fn generate_frame(&mut self) -> Result<Bytes, FrameSourceError>;
}

/// Cycles through pre-encoded JPEG files, holding each for a fixed interval.
pub struct SlideshowSource {
    slides: Vec<Bytes>,
    interval: Duration,
    current: usize,
    shown_since: Instant,
}

impl SlideshowSource {
    /// Load every `.jpg`/`.jpeg` file of `dir`, sorted by path.
    pub fn load(dir: &Path, interval: Duration) -> Result<Self, FrameSourceError> {
        let io_err = |source| FrameSourceError::Io { path: dir.to_path_buf(), source };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_jpeg_name(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut slides = Vec::with_capacity(paths.len());
        for path in paths {
            let data = std::fs::read(&path).map_err(|source| FrameSourceError::Io {
                path: path.clone(),
                source,
            })?;
            if !data.starts_with(&JPEG_SOI) {
                return Err(FrameSourceError::NotJpeg(path));
            }
            debug!("slide {}: {} bytes", path.display(), data.len());
            slides.push(Bytes::from(data));
        }

        info!("Loaded {} slides from {}", slides.len(), dir.display());
        Self::from_slides(slides, interval).ok_or_else(|| FrameSourceError::NoFrames(dir.to_path_buf()))
    }

    /// In-memory slideshow; None when `slides` is empty.
    pub fn from_slides(slides: Vec<Bytes>, interval: Duration) -> Option<Self> {
        if slides.is_empty() {
            return None;
        }
        Some(Self {
            slides,
            interval,
            current: 0,
            shown_since: Instant::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Move to the slide due at `now` and return it.
    fn frame_at(&mut self, now: Instant) -> Bytes {
        if !self.interval.is_zero() && now.saturating_duration_since(self.shown_since) >= self.interval {
            self.current = (self.current + 1) % self.slides.len();
            self.shown_since = now;
        }
        self.slides[self.current].clone()
    }
}

impl FrameSource for SlideshowSource {
    fn generate_frame(&mut self) -> Result<Bytes, FrameSourceError> {
        Ok(self.frame_at(Instant::now()))
    }
}

fn is_jpeg_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}
