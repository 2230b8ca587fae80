use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

pub type LaneId = u8;

/// Lanes served by the installation, in display order.
pub const LANE_IDS: [LaneId; 4] = [1, 2, 3, 4];
pub const LAST_LANE: LaneId = 4;

pub fn is_known_lane(lane_id: LaneId) -> bool {
    LANE_IDS.contains(&lane_id)
}

/// Pixel coordinate on a camera frame. Travels on the wire as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

/// Four vertices in traversal order; the last one connects back to the first.
pub type Quad = [Point; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Green,
    Red,
}

/// Control message announcing the next frame of a lane.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LaneMetadata {
    pub lane_id: LaneId,
    pub vehicle_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub green_time: Option<f64>,
    #[serde(default)]
    pub roi: Option<Quad>,
    #[serde(default)]
    pub detections: Option<Vec<BoundingBox>>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl LaneMetadata {
    /// Checks the constraints serde cannot express. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !is_known_lane(self.lane_id) {
            return Err(format!("lane_id {} outside {:?}", self.lane_id, LANE_IDS));
        }
        if let Some(green_time) = self.green_time
            && (!green_time.is_finite() || green_time < 0.0)
        {
            return Err(format!("green_time {green_time} is not a non-negative duration"));
        }
        Ok(())
    }
}

/// Latest known state of one lane.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneSnapshot {
    pub lane_id: LaneId,
    pub vehicle_counts: BTreeMap<String, u32>,
    pub green_time: f64,
    pub roi: Option<Quad>,
    pub detections: Vec<BoundingBox>,
    pub recommendation: Option<String>,
    pub location: Option<GeoPoint>,
    pub frame: Option<Vec<u8>>,
    pub received_at: SystemTime,
}

impl LaneSnapshot {
    pub fn from_metadata(metadata: LaneMetadata, received_at: SystemTime) -> Self {
        let location = match (metadata.latitude, metadata.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Self {
            lane_id: metadata.lane_id,
            vehicle_counts: metadata.vehicle_counts,
            green_time: metadata.green_time.unwrap_or(0.0),
            roi: metadata.roi,
            detections: metadata.detections.unwrap_or_default(),
            recommendation: metadata.recommendation,
            location,
            frame: None,
            received_at,
        }
    }

    pub fn with_frame(mut self, frame: Vec<u8>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// A snapshot can be drawn once both metadata and a frame are present.
    pub fn is_renderable(&self) -> bool {
        self.frame.is_some()
    }

    pub fn total_vehicles(&self) -> u32 {
        self.vehicle_counts.values().sum()
    }

    pub fn signal(&self) -> Signal {
        if self.green_time > 0.0 {
            Signal::Green
        } else {
            Signal::Red
        }
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }
}
