//! The session actor and its broadcast fan-out.
//!
//! One blocking task owns the [`Session`]. Connections talk to it through a
//! bounded command queue, so requests apply one at a time in arrival order.
//! Every outbound event is serialized once and shared with all viewers
//! through a `broadcast` channel.

use rot_core::catalog::Catalog;
use rot_core::model::SceneSnapshot;
use rot_core::store::MapStore;
use rot_sync::protocol::{Outbound, Ping, Request};
use rot_sync::{SceneSink, Session};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// A serialized outbound event, shared between viewers.
pub type Frame = Arc<str>;

/// Pending commands before senders wait.
const COMMAND_CAPACITY: usize = 256;

/// Frames a viewer may fall behind before it starts skipping.
pub const FRAME_CAPACITY: usize = 64;

enum Command {
    Request(Request),
    Join(oneshot::Sender<Frame>),
    Catalog(Catalog),
}

fn encode(frame: &Outbound<'_>) -> Option<Frame> {
    match frame.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            log::error!("failed to encode outbound frame: {e}");
            None
        }
    }
}

fn scene_frame(snapshot: &SceneSnapshot<'_>) -> Option<Frame> {
    encode(&Outbound::CurrentMapData(SceneSnapshot {
        map: snapshot.map,
        catalog: snapshot.catalog,
    }))
}

/// [`SceneSink`] over the broadcast channel.
pub struct ChannelSink {
    frames: broadcast::Sender<Frame>,
}

impl ChannelSink {
    fn send(&self, frame: Option<Frame>) {
        let Some(frame) = frame else { return };
        // Fails only while nobody is connected.
        if self.frames.send(frame).is_err() {
            log::trace!("no viewers connected");
        }
    }
}

impl SceneSink for ChannelSink {
    fn publish_scene(&mut self, snapshot: &SceneSnapshot<'_>) {
        self.send(scene_frame(snapshot));
    }

    fn publish_ping(&mut self, ping: Ping) {
        self.send(encode(&Outbound::PingAt(ping)));
    }
}

/// Cheap, cloneable access to the running hub.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    frames: broadcast::Sender<Frame>,
}

impl HubHandle {
    /// Queue a request. Returns false once the hub has stopped.
    pub async fn submit(&self, request: Request) -> bool {
        self.commands.send(Command::Request(request)).await.is_ok()
    }

    /// Subscribe to outbound frames and fetch the current snapshot.
    ///
    /// The subscription is taken first, so no later update can be missed;
    /// at worst the first broadcast repeats the initial snapshot.
    pub async fn join(&self) -> Option<(Frame, broadcast::Receiver<Frame>)> {
        let frames = self.frames.subscribe();
        let (reply, initial) = oneshot::channel();
        self.commands.send(Command::Join(reply)).await.ok()?;
        let initial = initial.await.ok()?;
        Some((initial, frames))
    }

    /// Hand a fresh asset scan to the session. Viewers get a snapshot only
    /// if something changed.
    pub async fn set_catalog(&self, catalog: Catalog) -> bool {
        self.commands.send(Command::Catalog(catalog)).await.is_ok()
    }
}

/// Open `selected` from `store` and start the session actor.
///
/// The actor stops once every [`HubHandle`] is dropped.
pub fn spawn<S>(store: S, selected: &str) -> (HubHandle, JoinHandle<()>)
where
    S: MapStore + Send + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (frames_tx, _) = broadcast::channel(FRAME_CAPACITY);
    let sink = ChannelSink {
        frames: frames_tx.clone(),
    };
    let selected = selected.to_string();

    let task = tokio::task::spawn_blocking(move || {
        let session = Session::open(store, sink, &selected);
        log::info!(
            "serving map {:?} ({} tokens, {} drawings)",
            session.selected(),
            session.map().tokens.len(),
            session.map().drawings.len()
        );
        run(session, commands_rx);
    });

    let handle = HubHandle {
        commands: commands_tx,
        frames: frames_tx,
    };
    (handle, task)
}

fn run<S: MapStore>(mut session: Session<S, ChannelSink>, mut commands: mpsc::Receiver<Command>) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Request(request) => {
                // Rejections are logged by the session.
                let _ = session.handle(request);
            }
            Command::Join(reply) => {
                if let Some(frame) = scene_frame(&session.snapshot()) {
                    let _ = reply.send(frame);
                }
            }
            Command::Catalog(catalog) => {
                if session.set_catalog(catalog) {
                    log::debug!("asset catalog changed");
                    session.broadcast();
                }
            }
        }
    }
    log::info!("session hub stopped");
}
