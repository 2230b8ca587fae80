//! Pairs each metadata message with the binary frame that follows it.
//!
//! The wire carries no correlation id, so pairing is by strict adjacency: a
//! text message is held until the next binary message arrives. Only one pair is
//! ever in flight; a newer text message replaces an unconsumed older one.

use crate::lane::{LaneId, LaneMetadata, LaneSnapshot};
use crate::stream::{ConnectionEvent, StreamPayload};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),
    #[error("orphan frame of {bytes} bytes with no pending metadata")]
    OrphanFrame { bytes: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotReady {
    pub lane_id: LaneId,
    pub snapshot: LaneSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub assembled: u64,
    pub malformed: u64,
    pub orphaned: u64,
    pub superseded: u64,
}

#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Option<LaneMetadata>,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_lane(&self) -> Option<LaneId> {
        self.pending.as_ref().map(|metadata| metadata.lane_id)
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Forgets any half-received pair, e.g. after the connection reopened.
    pub fn reset(&mut self) {
        if let Some(discarded) = self.pending.take() {
            debug!(lane_id = discarded.lane_id, "Dropping pending metadata on reset");
        }
    }

    /// Feeds one connection event. Lifecycle events reset pairing state.
    pub fn on_event(
        &mut self,
        event: ConnectionEvent,
    ) -> Result<Option<SnapshotReady>, AssemblyError> {
        match event {
            ConnectionEvent::MessageReceived(payload) => self.on_payload(payload),
            ConnectionEvent::Opened | ConnectionEvent::Closed(_) | ConnectionEvent::Failed(_) => {
                self.reset();
                Ok(None)
            }
        }
    }

    /// Binary payloads move into the snapshot without copying.
    pub fn on_payload(
        &mut self,
        payload: StreamPayload,
    ) -> Result<Option<SnapshotReady>, AssemblyError> {
        match payload {
            StreamPayload::Text(text) => {
                self.on_text(&text)?;
                Ok(None)
            }
            StreamPayload::Binary(bytes) => self.on_binary(bytes).map(Some),
        }
    }

    /// Parses metadata and holds it until its frame arrives.
    pub fn on_text(&mut self, text: &str) -> Result<(), AssemblyError> {
        let metadata = match parse_metadata(text) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.stats.malformed += 1;
                warn!(error = %err, "Dropping malformed metadata");
                return Err(err);
            }
        };

        if let Some(superseded) = self.pending.replace(metadata) {
            self.stats.superseded += 1;
            debug!(
                lane_id = superseded.lane_id,
                "Metadata superseded before its frame arrived"
            );
        }
        Ok(())
    }

    /// Completes the pending pair with `frame`.
    pub fn on_binary(&mut self, frame: Vec<u8>) -> Result<SnapshotReady, AssemblyError> {
        self.on_binary_at(frame, SystemTime::now())
    }

    fn on_binary_at(
        &mut self,
        frame: Vec<u8>,
        received_at: SystemTime,
    ) -> Result<SnapshotReady, AssemblyError> {
        let Some(metadata) = self.pending.take() else {
            self.stats.orphaned += 1;
            warn!(bytes = frame.len(), "Dropping frame with no pending metadata");
            return Err(AssemblyError::OrphanFrame { bytes: frame.len() });
        };

        self.stats.assembled += 1;
        let lane_id = metadata.lane_id;
        let snapshot = LaneSnapshot::from_metadata(metadata, received_at).with_frame(frame);
        debug!(
            lane_id,
            bytes = snapshot.frame.as_ref().map_or(0, Vec::len),
            "Snapshot assembled"
        );
        Ok(SnapshotReady { lane_id, snapshot })
    }
}

fn parse_metadata(text: &str) -> Result<LaneMetadata, AssemblyError> {
    let metadata: LaneMetadata = serde_json::from_str(text)
        .map_err(|err| AssemblyError::MalformedMetadata(err.to_string()))?;
    metadata.validate().map_err(AssemblyError::MalformedMetadata)?;
    Ok(metadata)
}
