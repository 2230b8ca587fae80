use crate::lane::{LaneId, LaneSnapshot, Signal};
use crate::roi::{RoiSession, RoiState};
use crate::state::{LaneBoard, LinkStatus};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;

pub fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn link_banner(link: &LinkStatus) -> String {
    match link {
        LinkStatus::Connecting => "Connecting to traffic data...".to_string(),
        LinkStatus::Live => "Connected to traffic data.".to_string(),
        LinkStatus::Closed { reason } => {
            format!("Disconnected: {reason} (showing last known data)")
        }
        LinkStatus::Failed { error } => {
            format!("Connection error: {error} (showing last known data)")
        }
    }
}

pub fn render_board(board: &LaneBoard, recommended: &BTreeSet<LaneId>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {}", link_banner(board.link()));
    for (lane_id, snapshot) in board.slots() {
        let is_active = board.active_lane() == Some(lane_id);
        let is_recommended = recommended.contains(&lane_id);
        match snapshot {
            Some(snapshot) => render_lane(&mut out, snapshot, is_active, is_recommended),
            None => {
                let _ = writeln!(out, "Lane {lane_id}: Waiting for data...");
            }
        }
    }
    out
}

fn render_lane(out: &mut String, lane: &LaneSnapshot, is_active: bool, is_recommended: bool) {
    let mut title = format!("Lane {}", lane.lane_id);
    if is_active {
        title.push_str(" [ACTIVE]");
    }
    if is_recommended {
        title.push_str(" [RECOMMENDED]");
    }
    let signal = match lane.signal() {
        Signal::Green => "green",
        Signal::Red => "red",
    };
    let updated = format_timestamp(lane.received_at);
    let _ = writeln!(out, "{title} signal={signal} updated={updated}");

    if let Some(recommendation) = &lane.recommendation {
        let _ = writeln!(out, "  Recommendation: {recommendation}");
    }
    let counts: Vec<String> = lane
        .vehicle_counts
        .iter()
        .map(|(class, count)| format!("{class}={count}"))
        .collect();
    let _ = writeln!(
        out,
        "  Vehicles: {} ({})",
        lane.total_vehicles(),
        counts.join(", ")
    );
    if is_active {
        let _ = writeln!(out, "  Green Time: {}s", lane.green_time);
    }
    let frame_bytes = lane.frame.as_ref().map_or(0, Vec::len);
    let _ = writeln!(
        out,
        "  Frame: {frame_bytes} bytes, roi: {}, detections: {}",
        if lane.roi.is_some() { "set" } else { "none" },
        lane.detections.len()
    );
    if let Some(location) = lane.location() {
        let _ = writeln!(
            out,
            "  Light at {:.4}, {:.4}",
            location.latitude, location.longitude
        );
    }
}

pub fn render_roi(session: &RoiSession) -> String {
    match session.state() {
        RoiState::Loading => "Loading frame from server...".to_string(),
        RoiState::Capturing { lane, points } => {
            let mut out = format!("Configure Detection Zone for Lane {lane}: ");
            out.push_str(&render_points(points));
            if points.len() == 4 {
                out.push_str(" (closed)");
                if *lane < crate::lane::LAST_LANE {
                    out.push_str(" -> 'commit' for next lane");
                } else {
                    out.push_str(" -> 'commit' to start detection");
                }
            } else {
                let _ = write!(out, " ({} of 4 points)", points.len());
            }
            out
        }
        RoiState::Committing(request) => {
            format!("Saving detection zone for Lane {}...", request.lane)
        }
        RoiState::Configured => "All lanes configured.".to_string(),
        RoiState::Failed { error, retry } => match retry {
            Some(_) => format!("Error: {error} ('retry' or 'restart')"),
            None => format!("Error: {error} ('restart' to try again)"),
        },
        RoiState::Closed => "ROI mapping closed.".to_string(),
    }
}

fn render_points(points: &[crate::lane::Point]) -> String {
    if points.is_empty() {
        return "no points".to_string();
    }
    points
        .iter()
        .enumerate()
        .map(|(index, point)| format!("{}:({}, {})", index + 1, point.x, point.y))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Redraws the lane board whenever the store publishes a new one.
pub struct BoardRenderer<W: Write> {
    board_rx: watch::Receiver<LaneBoard>,
    out: W,
}

impl<W: Write> BoardRenderer<W> {
    pub fn new(board_rx: watch::Receiver<LaneBoard>, out: W) -> Self {
        Self { board_rx, out }
    }

    /// Draws only if the board changed since the last draw. Returns whether it drew.
    pub fn refresh(&mut self, recommended: &BTreeSet<LaneId>) -> io::Result<bool> {
        if !self.board_rx.has_changed().unwrap_or(false) {
            return Ok(false);
        }
        self.draw(recommended)?;
        Ok(true)
    }

    pub fn draw(&mut self, recommended: &BTreeSet<LaneId>) -> io::Result<()> {
        let text = render_board(&self.board_rx.borrow_and_update(), recommended);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
