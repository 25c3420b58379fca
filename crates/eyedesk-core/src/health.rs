//! Per-channel transport health
//!
//! A lost channel freezes its part of the scene at the last good state. The
//! monitor makes that observable: link state, last accepted message time and
//! accept/reject counters are tracked independently for every channel.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::ChannelKind;

/// Transport state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Connecting,
    Open,
    Closed,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHealth {
    pub kind: ChannelKind,
    pub state: LinkState,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub accepted: u64,
    pub rejected: u64,
    /// Valid messages that were dropped without touching the scene
    #[serde(default)]
    pub skipped: u64,
    pub last_error: Option<String>,
}

impl ChannelHealth {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            state: LinkState::Connecting,
            opened_at: None,
            last_message_at: None,
            accepted: 0,
            rejected: 0,
            skipped: 0,
            last_error: None,
        }
    }

    pub fn on_open(&mut self, now: DateTime<Utc>) {
        self.state = LinkState::Open;
        self.opened_at = Some(now);
    }

    pub fn on_accepted(&mut self, now: DateTime<Utc>) {
        self.accepted += 1;
        self.last_message_at = Some(now);
    }

    pub fn on_skipped(&mut self, now: DateTime<Utc>) {
        self.skipped += 1;
        self.last_message_at = Some(now);
    }

    pub fn on_rejected(&mut self, error: impl Into<String>) {
        self.rejected += 1;
        self.last_error = Some(error.into());
    }

    /// An errored link stays errored when the close that follows arrives
    pub fn on_closed(&mut self) {
        if self.state != LinkState::Errored {
            self.state = LinkState::Closed;
        }
    }

    pub fn on_error(&mut self, error: impl Into<String>) {
        self.state = LinkState::Errored;
        self.last_error = Some(error.into());
    }

    /// Whether the channel can no longer deliver updates
    pub fn is_frozen(&self) -> bool {
        matches!(self.state, LinkState::Closed | LinkState::Errored)
    }

    /// Time since the last accepted message, or since the link opened
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_message_at.or(self.opened_at).map(|t| now - t)
    }
}

/// Health of all three channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMonitor {
    channels: [ChannelHealth; 3],
}

impl Default for ChannelMonitor {
    fn default() -> Self {
        Self {
            channels: ChannelKind::ALL.map(ChannelHealth::new),
        }
    }
}

impl ChannelMonitor {
    pub fn get(&self, kind: ChannelKind) -> &ChannelHealth {
        &self.channels[kind.index()]
    }

    pub fn get_mut(&mut self, kind: ChannelKind) -> &mut ChannelHealth {
        &mut self.channels[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelHealth> {
        self.channels.iter()
    }

    pub fn all_open(&self) -> bool {
        self.channels.iter().all(|c| c.state == LinkState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_is_per_channel() {
        let t0 = Utc::now();
        let mut monitor = ChannelMonitor::default();
        for kind in ChannelKind::ALL {
            monitor.get_mut(kind).on_open(t0);
        }
        monitor
            .get_mut(ChannelKind::Kinematic)
            .on_accepted(t0 + Duration::seconds(5));

        let now = t0 + Duration::seconds(8);
        assert_eq!(
            monitor.get(ChannelKind::Kinematic).staleness(now),
            Some(Duration::seconds(3))
        );
        assert_eq!(
            monitor.get(ChannelKind::Object).staleness(now),
            Some(Duration::seconds(8))
        );
        assert!(monitor.all_open());
    }

    #[test]
    fn test_closed_channel_is_frozen() {
        let mut health = ChannelHealth::new(ChannelKind::Control);
        assert_eq!(health.state, LinkState::Connecting);
        assert_eq!(health.staleness(Utc::now()), None);

        health.on_open(Utc::now());
        assert!(!health.is_frozen());
        health.on_error("connection reset");
        assert!(health.is_frozen());
        assert_eq!(health.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_close_after_error_keeps_errored() {
        let mut health = ChannelHealth::new(ChannelKind::Object);
        health.on_open(Utc::now());
        health.on_error("socket error");
        health.on_closed();
        assert_eq!(health.state, LinkState::Errored);
        assert_eq!(health.last_error.as_deref(), Some("socket error"));

        let mut clean = ChannelHealth::new(ChannelKind::Object);
        clean.on_open(Utc::now());
        clean.on_closed();
        assert_eq!(clean.state, LinkState::Closed);
    }
}
