//! Application state management

use eyedesk_core::{
    ArucoPosition, ChannelKind, ChannelMessage, ChannelStats, DrawBatch, DrawObject,
    ProjectorCommand,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Joint frames for `/jointsWs`
    pub kinematic: ChannelHub,
    /// Object snapshots for `/primitiveWs`
    pub objects: ChannelHub,
    /// Camera deltas for `/controlsWs`
    pub control: ChannelHub,
    /// Projector overlay for `/DrawWs`
    pub projector: Projector,
    /// Marker positions from the newest camera detection
    pub arucos: RwLock<Vec<ArucoPosition>>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Arc<Self> {
        let capacity = config.channels.capacity.max(1);
        let timeout = Duration::from_millis(config.channels.size_timeout_ms);
        Arc::new(Self {
            kinematic: ChannelHub::new(ChannelKind::Kinematic, capacity),
            objects: ChannelHub::new(ChannelKind::Object, capacity),
            control: ChannelHub::new(ChannelKind::Control, capacity),
            projector: Projector::new(capacity, timeout),
            arucos: RwLock::new(Vec::new()),
            config,
        })
    }

    pub fn hub(&self, kind: ChannelKind) -> &ChannelHub {
        match kind {
            ChannelKind::Kinematic => &self.kinematic,
            ChannelKind::Object => &self.objects,
            ChannelKind::Control => &self.control,
        }
    }

    /// Number of joints a kinematic frame must carry
    pub fn joint_count(&self) -> usize {
        self.config.robot.joints.len()
    }

    /// Route a message to the hub of its channel
    pub async fn publish(&self, message: ChannelMessage) -> usize {
        self.hub(message.kind()).publish(message).await
    }

    pub async fn channel_stats(&self) -> Vec<ChannelStats> {
        let mut stats = Vec::with_capacity(ChannelKind::ALL.len());
        for kind in ChannelKind::ALL {
            stats.push(self.hub(kind).stats().await);
        }
        stats
    }
}

/// A published message and its position in the channel's history
#[derive(Debug, Clone)]
pub struct Sequenced {
    pub seq: u64,
    pub message: ChannelMessage,
}

/// Fan-out for one scene channel
pub struct ChannelHub {
    kind: ChannelKind,
    sender: broadcast::Sender<Sequenced>,
    /// Replayed to viewers that connect after the last publish
    latest: RwLock<Option<Sequenced>>,
    published: AtomicU64,
}

/// Whether a late viewer should start from the channel's last message.
///
/// Control deltas are relative, so replaying one would rotate the new
/// viewer's camera by a stale amount.
fn replays_latest(kind: ChannelKind) -> bool {
    !matches!(kind, ChannelKind::Control)
}

impl ChannelHub {
    pub fn new(kind: ChannelKind, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            kind,
            sender,
            latest: RwLock::new(None),
            published: AtomicU64::new(0),
        }
    }

    /// Publish to every connected viewer, returning how many received it
    pub async fn publish(&self, message: ChannelMessage) -> usize {
        // Sequence, store and send under one lock so `connect` sees a
        // consistent cut of the history
        let mut latest = self.latest.write().await;
        let seq = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let sequenced = Sequenced { seq, message };
        if replays_latest(self.kind) {
            *latest = Some(sequenced.clone());
        }
        match self.sender.send(sequenced) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(channel = %self.kind, "Published with no viewers connected");
                0
            }
        }
    }

    /// Attach a viewer: the message to replay first, if any, plus the live
    /// stream of everything published after it
    pub async fn connect(&self) -> (Option<ChannelMessage>, ChannelSubscription) {
        let receiver = self.sender.subscribe();
        let latest = self.latest.read().await.clone();
        let replayed = latest.as_ref().map_or(0, |l| l.seq);
        (
            latest.map(|l| l.message),
            ChannelSubscription { receiver, replayed },
        )
    }

    pub async fn latest(&self) -> Option<ChannelMessage> {
        self.latest.read().await.as_ref().map(|l| l.message.clone())
    }

    pub async fn stats(&self) -> ChannelStats {
        ChannelStats {
            channel: self.kind,
            endpoint: self.kind.endpoint().to_string(),
            subscribers: self.sender.receiver_count(),
            published: self.published.load(Ordering::Relaxed),
            has_latest: self.latest.read().await.is_some(),
        }
    }
}

/// Live stream for one viewer, skipping anything already replayed to it
pub struct ChannelSubscription {
    receiver: broadcast::Receiver<Sequenced>,
    replayed: u64,
}

impl ChannelSubscription {
    pub async fn recv(&mut self) -> Result<ChannelMessage, RecvError> {
        loop {
            let next = self.receiver.recv().await?;
            if next.seq > self.replayed {
                return Ok(next.message);
            }
        }
    }
}

/// Outbound traffic on the projector socket
#[derive(Debug, Clone)]
pub enum ProjectorOut {
    Draw(Vec<DrawObject>),
    Command(ProjectorCommand),
}

#[derive(Error, Debug, PartialEq)]
pub enum ProjectorError {
    #[error("No projector connected")]
    NoProjector,
    #[error("Projector did not report its size within {0:?}")]
    Timeout(Duration),
}

/// Pending draw batch plus the command/reply plumbing of `/DrawWs`
pub struct Projector {
    batch: Mutex<DrawBatch>,
    outbound: broadcast::Sender<ProjectorOut>,
    size_tx: mpsc::Sender<(f64, f64)>,
    /// Held for the whole request so concurrent size queries do not steal replies
    size_rx: Mutex<mpsc::Receiver<(f64, f64)>>,
    timeout: Duration,
}

impl Projector {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let (outbound, _) = broadcast::channel(capacity);
        let (size_tx, size_rx) = mpsc::channel(capacity);
        Self {
            batch: Mutex::new(DrawBatch::default()),
            outbound,
            size_tx,
            size_rx: Mutex::new(size_rx),
            timeout,
        }
    }

    /// Queue primitives for the next flush
    pub async fn queue(&self, objects: Vec<DrawObject>) -> usize {
        let mut batch = self.batch.lock().await;
        batch.extend(objects);
        batch.len()
    }

    pub async fn pending(&self) -> usize {
        self.batch.lock().await.len()
    }

    /// Send the pending batch to every projector and clear it.
    ///
    /// With no projector connected the batch is kept for the next attempt.
    pub async fn flush(&self) -> Result<usize, ProjectorError> {
        let mut batch = self.batch.lock().await;
        if self.outbound.receiver_count() == 0 {
            return Err(ProjectorError::NoProjector);
        }
        let objects = batch.flush();
        let count = objects.len();
        let projectors = self
            .outbound
            .send(ProjectorOut::Draw(objects))
            .map_err(|_| ProjectorError::NoProjector)?;
        info!(primitives = count, projectors, "Flushed draw batch");
        Ok(count)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectorOut> {
        self.outbound.subscribe()
    }

    /// Sender the socket handler uses to hand back size replies
    pub fn size_replies(&self) -> mpsc::Sender<(f64, f64)> {
        self.size_tx.clone()
    }

    /// Ask the projectors for their drawable size and wait for the first reply
    pub async fn request_drawable_size(&self) -> Result<(f64, f64), ProjectorError> {
        let mut replies = self.size_rx.lock().await;
        // Replies to earlier timed out requests are stale
        while replies.try_recv().is_ok() {}

        if self
            .outbound
            .send(ProjectorOut::Command(ProjectorCommand::GetDrawableSize))
            .is_err()
        {
            return Err(ProjectorError::NoProjector);
        }

        match tokio::time::timeout(self.timeout, replies.recv()).await {
            Ok(Some(size)) => Ok(size),
            Ok(None) | Err(_) => Err(ProjectorError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyedesk_core::{ControlDelta, JointFrame, ObjectRecord};

    #[tokio::test]
    async fn test_hub_replays_latest() {
        let state = AppState::new(Config::default());
        assert!(state.kinematic.latest().await.is_none());

        let frame = ChannelMessage::Kinematic(JointFrame::new(vec![0.0; 7]));
        assert_eq!(state.publish(frame.clone()).await, 0);
        assert_eq!(state.kinematic.latest().await, Some(frame));
        assert!(state.objects.latest().await.is_none());

        let stats = state.channel_stats().await;
        assert_eq!(stats[0].published, 1);
        assert!(stats[0].has_latest);
        assert_eq!(stats[1].published, 0);
    }

    #[tokio::test]
    async fn test_hub_fans_out() {
        let hub = ChannelHub::new(ChannelKind::Control, 10);
        let (_, mut a) = hub.connect().await;
        let (_, mut b) = hub.connect().await;
        let delta = ChannelMessage::Control(ControlDelta { rotate_left: 10.0, rotate_up: 0.0 });
        assert_eq!(hub.publish(delta.clone()).await, 2);
        assert_eq!(a.recv().await.unwrap(), delta);
        assert_eq!(b.recv().await.unwrap(), delta);
        assert_eq!(hub.stats().await.subscribers, 2);
    }

    #[tokio::test]
    async fn test_control_deltas_not_replayed() {
        let hub = ChannelHub::new(ChannelKind::Control, 10);
        let delta = ChannelMessage::Control(ControlDelta { rotate_left: 100.0, rotate_up: 0.0 });
        hub.publish(delta).await;

        let (replay, _) = hub.connect().await;
        assert!(replay.is_none());
        assert!(hub.latest().await.is_none());
        let stats = hub.stats().await;
        assert_eq!(stats.published, 1);
        assert!(!stats.has_latest);
    }

    fn snapshot(id: i64) -> ChannelMessage {
        ChannelMessage::Object(vec![ObjectRecord { id, x: 0.0, y: 0.0, z: 0.0, rot: 0.0 }])
    }

    #[tokio::test]
    async fn test_replayed_message_not_delivered_twice() {
        let hub = ChannelHub::new(ChannelKind::Object, 10);
        hub.publish(snapshot(1)).await;

        // Subscribed, then a publish lands before the replay is read
        let receiver = hub.sender.subscribe();
        hub.publish(snapshot(2)).await;
        let latest = hub.latest.read().await.clone().unwrap();
        assert_eq!(latest.message, snapshot(2));
        let mut subscription = ChannelSubscription {
            receiver,
            replayed: latest.seq,
        };

        hub.publish(snapshot(3)).await;
        assert_eq!(subscription.recv().await.unwrap(), snapshot(3));

        let (replay, mut late) = hub.connect().await;
        assert_eq!(replay, Some(snapshot(3)));
        hub.publish(snapshot(4)).await;
        assert_eq!(late.recv().await.unwrap(), snapshot(4));
    }

    #[tokio::test]
    async fn test_flush_sends_and_clears() {
        let projector = Projector::new(10, Duration::from_millis(50));
        let mut rx = projector.subscribe();
        projector
            .queue(vec![DrawObject::Aruco { x: 100.0, y: 100.0, size: 200.0 }])
            .await;
        assert_eq!(projector.pending().await, 1);

        assert_eq!(projector.flush().await, Ok(1));
        assert_eq!(projector.pending().await, 0);
        match rx.recv().await.unwrap() {
            ProjectorOut::Draw(objects) => assert_eq!(objects.len(), 1),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_flush_without_projector_keeps_batch() {
        let projector = Projector::new(10, Duration::from_millis(50));
        projector
            .queue(vec![DrawObject::Circle { x: 0.0, y: 0.0, radius: 5.0, fill: true }])
            .await;
        assert_eq!(projector.flush().await, Err(ProjectorError::NoProjector));
        assert_eq!(projector.pending().await, 1);
    }

    #[tokio::test]
    async fn test_drawable_size_round_trip() {
        let projector = Arc::new(Projector::new(10, Duration::from_secs(2)));
        let mut rx = projector.subscribe();
        let replies = projector.size_replies();
        tokio::spawn(async move {
            if let Ok(ProjectorOut::Command(ProjectorCommand::GetDrawableSize)) = rx.recv().await {
                let _ = replies.send((1920.0, 1080.0)).await;
            }
        });
        assert_eq!(projector.request_drawable_size().await, Ok((1920.0, 1080.0)));
    }

    #[tokio::test]
    async fn test_drawable_size_without_projector() {
        let projector = Projector::new(10, Duration::from_millis(20));
        assert_eq!(
            projector.request_drawable_size().await,
            Err(ProjectorError::NoProjector)
        );

        let _silent = projector.subscribe();
        assert_eq!(
            projector.request_drawable_size().await,
            Err(ProjectorError::Timeout(Duration::from_millis(20)))
        );
    }
}
