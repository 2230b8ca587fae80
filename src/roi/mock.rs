use crate::lane::LaneId;
use crate::roi::{CommitRequest, ReferenceFrame, RoiClient, RoiError};
use std::cell::RefCell;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct MockRoiBehavior {
    pub frame_ok: bool,
    pub width: u32,
    pub height: u32,
    /// Lanes whose commit is rejected by the mock server.
    pub reject_lanes: BTreeSet<LaneId>,
}

impl MockRoiBehavior {
    pub fn ok() -> Self {
        Self {
            frame_ok: true,
            width: 640,
            height: 480,
            reject_lanes: BTreeSet::new(),
        }
    }

    pub fn fail_fetch() -> Self {
        Self {
            frame_ok: false,
            ..Self::ok()
        }
    }

    pub fn reject_lane(lane: LaneId) -> Self {
        Self {
            reject_lanes: BTreeSet::from([lane]),
            ..Self::ok()
        }
    }
}

/// In-memory stand-in for the ROI service that records every commit.
#[derive(Debug)]
pub struct MockRoiClient {
    behavior: RefCell<MockRoiBehavior>,
    commits: RefCell<Vec<CommitRequest>>,
}

impl MockRoiClient {
    pub fn new(behavior: MockRoiBehavior) -> Self {
        Self {
            behavior: RefCell::new(behavior),
            commits: RefCell::new(Vec::new()),
        }
    }

    pub fn commits(&self) -> Vec<CommitRequest> {
        self.commits.borrow().clone()
    }

    /// Lets a previously rejected lane through, e.g. before a retry.
    pub fn accept_lane(&self, lane: LaneId) {
        self.behavior.borrow_mut().reject_lanes.remove(&lane);
    }
}

impl RoiClient for MockRoiClient {
    async fn fetch_reference_frame(&self) -> Result<ReferenceFrame, RoiError> {
        let behavior = self.behavior.borrow().clone();
        if behavior.frame_ok {
            Ok(ReferenceFrame::new(
                vec![0xff, 0xd8, 0xff, 0xd9],
                behavior.width,
                behavior.height,
            ))
        } else {
            Err(RoiError::Fetch("mock frame unavailable".to_string()))
        }
    }

    async fn commit_roi(&self, request: CommitRequest) -> Result<(), RoiError> {
        self.commits.borrow_mut().push(request);
        if self.behavior.borrow().reject_lanes.contains(&request.lane) {
            Err(RoiError::Commit {
                lane: request.lane,
                reason: "mock rejected".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
