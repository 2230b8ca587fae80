//! Operator workflow for drawing one detection polygon per lane.
//!
//! Lanes are configured in order against a single reference frame. Each lane
//! collects four clicks, then the polygon is committed to the server; the
//! session only advances once the server accepts it.

use crate::lane::{LAST_LANE, LaneId, Point, Quad};
use crate::roi::{CommitRequest, ReferenceFrame, RoiClient, RoiError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FIRST_LANE: LaneId = 1;
const POINTS_PER_LANE: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum RoiState {
    Loading,
    Capturing { lane: LaneId, points: Vec<Point> },
    Committing(CommitRequest),
    Configured,
    /// `retry` holds the polygon when the failure came from a commit.
    Failed {
        error: RoiError,
        retry: Option<CommitRequest>,
    },
    Closed,
}

impl RoiState {
    pub fn name(&self) -> &'static str {
        match self {
            RoiState::Loading => "loading",
            RoiState::Capturing { .. } => "capturing",
            RoiState::Committing(_) => "committing",
            RoiState::Configured => "configured",
            RoiState::Failed { .. } => "failed",
            RoiState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Server accepted the polygon; capture continues on `next_lane`.
    Advanced { next_lane: LaneId },
    /// Last lane accepted; live monitoring can start.
    Configured,
    Failed(RoiError),
    /// The response no longer matches the session (closed or superseded).
    Ignored,
}

#[derive(Debug)]
pub struct RoiSession {
    state: RoiState,
    reference: Option<Arc<ReferenceFrame>>,
    committed: BTreeMap<LaneId, Quad>,
}

impl RoiSession {
    pub fn new() -> Self {
        Self {
            state: RoiState::Loading,
            reference: None,
            committed: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> &RoiState {
        &self.state
    }

    pub fn reference(&self) -> Option<&Arc<ReferenceFrame>> {
        self.reference.as_ref()
    }

    /// Polygons the server has accepted so far.
    pub fn committed(&self) -> &BTreeMap<LaneId, Quad> {
        &self.committed
    }

    pub fn current_lane(&self) -> Option<LaneId> {
        match &self.state {
            RoiState::Capturing { lane, .. } => Some(*lane),
            RoiState::Committing(request) => Some(request.lane),
            _ => None,
        }
    }

    pub fn points(&self) -> &[Point] {
        match &self.state {
            RoiState::Capturing { points, .. } => points,
            RoiState::Committing(request) => &request.points,
            _ => &[],
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, RoiState::Configured)
    }

    /// Applies the outcome of the reference frame fetch.
    pub fn frame_loaded(
        &mut self,
        result: Result<ReferenceFrame, RoiError>,
    ) -> Result<(), RoiError> {
        if !matches!(self.state, RoiState::Loading) {
            return Err(self.invalid("load a reference frame"));
        }

        match result {
            Ok(frame) => {
                info!(
                    width = frame.width(),
                    height = frame.height(),
                    "Reference frame loaded"
                );
                self.reference = Some(Arc::new(frame));
                self.state = RoiState::Capturing {
                    lane: FIRST_LANE,
                    points: Vec::with_capacity(POINTS_PER_LANE),
                };
            }
            Err(error) => {
                warn!(error = %error, "Reference frame unavailable");
                self.state = RoiState::Failed { error, retry: None };
            }
        }
        Ok(())
    }

    /// Records a vertex. Returns `false` when the click was ignored.
    pub fn click(&mut self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        if let Some(reference) = &self.reference
            && !reference.contains(point)
        {
            debug!(x, y, "Ignoring click outside the reference frame");
            return false;
        }

        match &mut self.state {
            RoiState::Capturing { lane, points } if points.len() < POINTS_PER_LANE => {
                points.push(point);
                debug!(lane = *lane, vertex = points.len(), x, y, "Vertex captured");
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) -> Result<(), RoiError> {
        match &mut self.state {
            RoiState::Capturing { points, .. } => {
                points.clear();
                Ok(())
            }
            _ => Err(self.invalid("reset points")),
        }
    }

    /// Moves to `Committing` when exactly four vertices are captured.
    pub fn begin_commit(&mut self) -> Result<CommitRequest, RoiError> {
        let RoiState::Capturing { lane, points } = &self.state else {
            return Err(self.invalid("commit"));
        };
        let points: Quad = points
            .as_slice()
            .try_into()
            .map_err(|_| RoiError::Validation {
                found: points.len(),
            })?;

        let request = CommitRequest {
            lane: *lane,
            points,
        };
        info!(lane = request.lane, "Committing lane polygon");
        self.state = RoiState::Committing(request);
        Ok(request)
    }

    /// Re-issues the polygon whose commit failed.
    pub fn retry_commit(&mut self) -> Result<CommitRequest, RoiError> {
        let RoiState::Failed {
            retry: Some(request),
            ..
        } = &self.state
        else {
            return Err(self.invalid("retry commit"));
        };
        let request = *request;
        info!(lane = request.lane, "Retrying lane polygon commit");
        self.state = RoiState::Committing(request);
        Ok(request)
    }

    /// Applies a commit response; stale responses are ignored.
    pub fn finish_commit(
        &mut self,
        request: CommitRequest,
        result: Result<(), RoiError>,
    ) -> CommitOutcome {
        if self.state != RoiState::Committing(request) {
            debug!(
                lane = request.lane,
                state = self.state.name(),
                "Ignoring commit response for an abandoned request"
            );
            return CommitOutcome::Ignored;
        }

        match result {
            Ok(()) => {
                self.committed.insert(request.lane, request.points);
                if request.lane >= LAST_LANE {
                    info!("All lanes configured");
                    self.state = RoiState::Configured;
                    CommitOutcome::Configured
                } else {
                    let next_lane = request.lane + 1;
                    info!(lane = request.lane, next_lane, "Lane polygon accepted");
                    self.state = RoiState::Capturing {
                        lane: next_lane,
                        points: Vec::with_capacity(POINTS_PER_LANE),
                    };
                    CommitOutcome::Advanced { next_lane }
                }
            }
            Err(error) => {
                warn!(lane = request.lane, error = %error, "Lane polygon rejected");
                self.state = RoiState::Failed {
                    error: error.clone(),
                    retry: Some(request),
                };
                CommitOutcome::Failed(error)
            }
        }
    }

    /// Ends the session; any in-flight commit response will be ignored.
    pub fn close(&mut self) {
        if let RoiState::Committing(request) = &self.state {
            info!(lane = request.lane, "Abandoning in-flight commit");
        }
        self.state = RoiState::Closed;
    }

    pub async fn load<C: RoiClient>(&mut self, client: &C) -> Result<(), RoiError> {
        let result = client.fetch_reference_frame().await;
        self.frame_loaded(result)
    }

    /// Validates, commits and applies the response in one step.
    pub async fn commit<C: RoiClient>(&mut self, client: &C) -> Result<CommitOutcome, RoiError> {
        let request = self.begin_commit()?;
        let result = client.commit_roi(request).await;
        Ok(self.finish_commit(request, result))
    }

    fn invalid(&self, action: &'static str) -> RoiError {
        RoiError::InvalidState {
            action,
            state: self.state.name(),
        }
    }
}

impl Default for RoiSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capturing_session() -> Result<RoiSession, RoiError> {
        let mut session = RoiSession::new();
        session.frame_loaded(Ok(ReferenceFrame::new(vec![0], 640, 480)))?;
        Ok(session)
    }

    fn click_square(session: &mut RoiSession) {
        for (x, y) in [(10.0, 10.0), (100.0, 10.0), (100.0, 100.0), (10.0, 100.0)] {
            assert!(session.click(x, y));
        }
    }

    #[test]
    fn starts_loading_then_captures_lane_one() -> Result<(), RoiError> {
        let session = capturing_session()?;

        assert_eq!(session.current_lane(), Some(1));
        assert!(session.points().is_empty());
        assert_eq!(session.reference().map(|r| r.width()), Some(640));
        Ok(())
    }

    #[test]
    fn fetch_failure_moves_to_failed_without_retry() {
        let mut session = RoiSession::new();

        let applied = session.frame_loaded(Err(RoiError::Fetch("video missing".to_string())));

        assert!(applied.is_ok());
        assert!(matches!(session.state(), RoiState::Failed { retry: None, .. }));
        assert!(session.retry_commit().is_err());
    }

    #[test]
    fn fifth_click_is_ignored() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        click_square(&mut session);

        assert!(!session.click(50.0, 50.0));

        assert_eq!(session.points().len(), 4);
        assert_eq!(session.points()[3], Point::new(10.0, 100.0));
        Ok(())
    }

    #[test]
    fn click_outside_reference_frame_is_ignored() -> Result<(), RoiError> {
        let mut session = capturing_session()?;

        assert!(!session.click(700.0, 10.0));
        assert!(session.points().is_empty());
        Ok(())
    }

    #[test]
    fn commit_with_too_few_points_changes_nothing() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        session.click(1.0, 1.0);
        session.click(2.0, 2.0);
        let before = session.state().clone();

        let result = session.begin_commit();

        assert_eq!(result, Err(RoiError::Validation { found: 2 }));
        assert_eq!(session.state(), &before);
        Ok(())
    }

    #[test]
    fn reset_clears_points_for_current_lane() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        click_square(&mut session);

        session.reset()?;

        assert!(session.points().is_empty());
        assert_eq!(session.current_lane(), Some(1));
        Ok(())
    }

    #[test]
    fn successful_commits_walk_all_lanes_to_configured() -> Result<(), RoiError> {
        let mut session = capturing_session()?;

        for lane in 1..=3 {
            click_square(&mut session);
            let request = session.begin_commit()?;
            assert_eq!(request.lane, lane);
            assert_eq!(
                session.finish_commit(request, Ok(())),
                CommitOutcome::Advanced { next_lane: lane + 1 }
            );
            assert!(session.points().is_empty());
        }

        click_square(&mut session);
        let request = session.begin_commit()?;
        assert_eq!(session.finish_commit(request, Ok(())), CommitOutcome::Configured);
        assert!(session.is_configured());
        assert_eq!(session.committed().len(), 4);
        Ok(())
    }

    #[test]
    fn clicks_and_reset_are_rejected_while_committing() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        click_square(&mut session);
        session.begin_commit()?;

        assert!(!session.click(5.0, 5.0));
        assert!(session.reset().is_err());
        assert!(matches!(
            session.begin_commit(),
            Err(RoiError::InvalidState { state: "committing", .. })
        ));
        Ok(())
    }

    #[test]
    fn failed_commit_can_be_retried_with_same_points() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        click_square(&mut session);
        let request = session.begin_commit()?;
        let error = RoiError::Commit {
            lane: 1,
            reason: "http status 500".to_string(),
        };

        assert_eq!(
            session.finish_commit(request, Err(error.clone())),
            CommitOutcome::Failed(error)
        );

        let retried = session.retry_commit()?;
        assert_eq!(retried, request);
        assert_eq!(
            session.finish_commit(retried, Ok(())),
            CommitOutcome::Advanced { next_lane: 2 }
        );
        Ok(())
    }

    #[test]
    fn late_response_after_close_is_ignored() -> Result<(), RoiError> {
        let mut session = capturing_session()?;
        click_square(&mut session);
        let request = session.begin_commit()?;

        session.close();

        assert_eq!(session.finish_commit(request, Ok(())), CommitOutcome::Ignored);
        assert_eq!(session.state(), &RoiState::Closed);
        assert!(session.committed().is_empty());
        Ok(())
    }
}
