use crate::error::AppError;
use crate::lane::{LANE_IDS, LaneId, LaneSnapshot, is_known_lane};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Live,
    Closed { reason: String },
    Failed { error: String },
}

impl LinkStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Immutable view of every lane, published after each mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneBoard {
    lanes: BTreeMap<LaneId, Arc<LaneSnapshot>>,
    active_lane: Option<LaneId>,
    link: LinkStatus,
}

impl LaneBoard {
    fn new() -> Self {
        Self {
            lanes: BTreeMap::new(),
            active_lane: None,
            link: LinkStatus::Connecting,
        }
    }

    pub fn lane(&self, lane_id: LaneId) -> Option<&LaneSnapshot> {
        self.lanes.get(&lane_id).map(Arc::as_ref)
    }

    pub fn active_lane(&self) -> Option<LaneId> {
        self.active_lane
    }

    pub fn link(&self) -> &LinkStatus {
        &self.link
    }

    /// Shown lanes stay on screen after the link drops but are no longer current.
    pub fn is_stale(&self) -> bool {
        !self.link.is_live()
    }

    /// Every known lane in display order, `None` where nothing arrived yet.
    pub fn slots(&self) -> impl Iterator<Item = (LaneId, Option<&LaneSnapshot>)> + '_ {
        LANE_IDS.iter().map(|lane_id| (*lane_id, self.lane(*lane_id)))
    }
}

/// Latest snapshot per lane plus the active-lane pointer.
///
/// The store is the only writer of lane state. Readers hold a
/// `watch::Receiver<LaneBoard>` and always see a whole published board.
#[derive(Debug)]
pub struct LaneStateStore {
    board: LaneBoard,
    board_tx: watch::Sender<LaneBoard>,
}

impl LaneStateStore {
    pub fn new() -> Self {
        let board = LaneBoard::new();
        let (board_tx, _board_rx) = watch::channel(board.clone());
        Self { board, board_tx }
    }

    pub fn board(&self) -> &LaneBoard {
        &self.board
    }

    pub fn subscribe(&self) -> watch::Receiver<LaneBoard> {
        self.board_tx.subscribe()
    }

    pub fn lane(&self, lane_id: LaneId) -> Option<&LaneSnapshot> {
        self.board.lane(lane_id)
    }

    pub fn active_lane(&self) -> Option<LaneId> {
        self.board.active_lane()
    }

    /// Replaces the lane entry wholesale and marks it active.
    pub fn apply_snapshot(
        &mut self,
        lane_id: LaneId,
        snapshot: LaneSnapshot,
    ) -> Result<(), AppError> {
        if !is_known_lane(lane_id) {
            return Err(AppError::UnknownLane(lane_id));
        }
        if snapshot.lane_id != lane_id {
            return Err(AppError::LaneMismatch {
                key: lane_id,
                snapshot: snapshot.lane_id,
            });
        }

        self.board.lanes.insert(lane_id, Arc::new(snapshot));
        self.board.active_lane = Some(lane_id);
        self.publish();
        Ok(())
    }

    pub fn set_link(&mut self, link: LinkStatus) {
        if self.board.link == link {
            return;
        }
        self.board.link = link;
        self.publish();
    }

    fn publish(&self) {
        // send_replace stores the board even while nobody is subscribed.
        self.board_tx.send_replace(self.board.clone());
    }
}

impl Default for LaneStateStore {
    fn default() -> Self {
        Self::new()
    }
}
