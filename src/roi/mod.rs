use crate::lane::{LaneId, Point, Quad};
use std::io::Cursor;
use thiserror::Error;

pub mod http;
pub mod mock;
pub mod session;

pub use session::{CommitOutcome, RoiSession, RoiState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoiError {
    #[error("exactly four points required (have {found})")]
    Validation { found: usize },
    #[error("failed to load reference frame: {0}")]
    Fetch(String),
    #[error("failed to commit roi for lane {lane}: {reason}")]
    Commit { lane: LaneId, reason: String },
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

/// Still image every lane polygon is drawn against. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFrame {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl ReferenceFrame {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
        }
    }

    /// Reads the image header to learn the frame dimensions.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, RoiError> {
        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|err| RoiError::Fetch(format!("unreadable image: {err}")))?
            .into_dimensions()
            .map_err(|err| RoiError::Fetch(format!("unsupported image: {err}")))?;
        Ok(Self::new(bytes, width, height))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x.is_finite()
            && point.y.is_finite()
            && (0.0..=f64::from(self.width)).contains(&point.x)
            && (0.0..=f64::from(self.height)).contains(&point.y)
    }
}

/// A polygon ready to be sent to the server for one lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitRequest {
    pub lane: LaneId,
    pub points: Quad,
}

/// Request/response channel to the service that stores lane polygons.
#[allow(async_fn_in_trait)]
pub trait RoiClient {
    async fn fetch_reference_frame(&self) -> Result<ReferenceFrame, RoiError>;

    async fn commit_roi(&self, request: CommitRequest) -> Result<(), RoiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
        let image = image::RgbImage::new(width, height);
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }

    #[test]
    fn decode_reads_dimensions() -> Result<(), Box<dyn std::error::Error>> {
        let frame = ReferenceFrame::decode(png_bytes(64, 48)?)?;

        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert!(!frame.bytes().is_empty());
        Ok(())
    }

    #[test]
    fn decode_rejects_non_image_payload() {
        let result = ReferenceFrame::decode(br#"{"message":"nope"}"#.to_vec());

        assert!(matches!(result, Err(RoiError::Fetch(_))));
    }

    #[test]
    fn contains_checks_frame_bounds() {
        let frame = ReferenceFrame::new(Vec::new(), 640, 480);

        assert!(frame.contains(Point::new(0.0, 0.0)));
        assert!(frame.contains(Point::new(640.0, 480.0)));
        assert!(!frame.contains(Point::new(641.0, 10.0)));
        assert!(!frame.contains(Point::new(-1.0, 10.0)));
        assert!(!frame.contains(Point::new(f64::NAN, 10.0)));
    }

    #[test]
    fn validation_error_names_required_count() {
        let err = RoiError::Validation { found: 3 };

        assert_eq!(err.to_string(), "exactly four points required (have 3)");
    }
}
