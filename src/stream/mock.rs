use crate::stream::{ConnectionEvent, EventFeed, StreamPayload};
use std::collections::VecDeque;

/// Replays a fixed sequence of connection events.
#[derive(Debug, Default)]
pub struct ScriptedFeed {
    events: VecDeque<ConnectionEvent>,
    closed: bool,
}

impl ScriptedFeed {
    pub fn new(events: impl IntoIterator<Item = ConnectionEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            closed: false,
        }
    }

    pub fn text(text: impl Into<String>) -> ConnectionEvent {
        ConnectionEvent::MessageReceived(StreamPayload::Text(text.into()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> ConnectionEvent {
        ConnectionEvent::MessageReceived(StreamPayload::Binary(bytes.into()))
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl EventFeed for ScriptedFeed {
    async fn next_event(&mut self) -> Option<ConnectionEvent> {
        if self.closed {
            return None;
        }
        self.events.pop_front()
    }

    async fn close(&mut self) {
        self.closed = true;
        self.events.clear();
    }
}
