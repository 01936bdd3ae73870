// conductor/src/channel.rs

//! The control channel browsers log in through.
//!
//! The orchestrator needs three things from it: a start that eventually emits
//! [`ChannelEvent::Ready`], a stop, and a broadcast of
//! [`ChannelEvent::ClientConnected`] logins. [`LoopbackChannel`] is an in-process
//! implementation; a network server plugs in behind the same trait.

use crate::reporter::TestResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tracing::{event, Level};

const EVENT_BUS_CAPACITY: usize = 64;

/// Messages a connected client sends about its test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
  Result(TestResult),
  /// All results have been sent.
  Done,
}

/// Receiving half of a client connection. Cloneable so the same login can be
/// offered to several runners; only the one that attaches reads from it.
#[derive(Clone)]
pub struct ClientTransport {
  inbox: Arc<AsyncMutex<mpsc::UnboundedReceiver<ClientMessage>>>,
}

impl ClientTransport {
  /// A connected sender/transport pair.
  pub fn pair() -> (mpsc::UnboundedSender<ClientMessage>, ClientTransport) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
      tx,
      ClientTransport {
        inbox: Arc::new(AsyncMutex::new(rx)),
      },
    )
  }

  /// Next message, or `None` once the client has gone away.
  pub async fn recv(&self) -> Option<ClientMessage> {
    self.inbox.lock().await.recv().await
  }
}

impl fmt::Debug for ClientTransport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClientTransport").finish_non_exhaustive()
  }
}

/// A client that just logged in.
#[derive(Debug, Clone)]
pub struct ClientLogin {
  /// What the client says it is, e.g. the browser name.
  pub identity: String,
  /// The launcher id the client was started with.
  pub connection_id: String,
  pub transport: ClientTransport,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
  Ready,
  ClientConnected(ClientLogin),
}

#[async_trait]
pub trait ControlChannel: Send + Sync {
  /// Begins accepting connections. Readiness is announced with `ChannelEvent::Ready`.
  async fn start(&self) -> anyhow::Result<()>;

  /// Stops accepting connections and releases the channel's resources.
  async fn stop(&self);

  /// A new receiver on the event bus. Only events sent after the call are seen.
  fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}

/// In-process control channel: clients are connected by calling [`LoopbackChannel::connect`].
pub struct LoopbackChannel {
  events: broadcast::Sender<ChannelEvent>,
  started: AtomicBool,
  stopped: AtomicBool,
}

impl LoopbackChannel {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
    Self {
      events,
      started: AtomicBool::new(false),
      stopped: AtomicBool::new(false),
    }
  }

  /// Logs a client in and returns the sender it reports through.
  pub fn connect(
    &self,
    identity: impl Into<String>,
    connection_id: impl Into<String>,
  ) -> mpsc::UnboundedSender<ClientMessage> {
    let (tx, transport) = ClientTransport::pair();
    let login = ClientLogin {
      identity: identity.into(),
      connection_id: connection_id.into(),
      transport,
    };
    event!(Level::DEBUG, identity = %login.identity, connection_id = %login.connection_id, "Client connected.");
    // No subscriber yet simply means nobody is interested in this login.
    let _ = self.events.send(ChannelEvent::ClientConnected(login));
    tx
  }

  /// Receivers currently subscribed to the event bus.
  pub fn subscriber_count(&self) -> usize {
    self.events.receiver_count()
  }

  pub fn is_started(&self) -> bool {
    self.started.load(Ordering::SeqCst)
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::SeqCst)
  }
}

impl Default for LoopbackChannel {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ControlChannel for LoopbackChannel {
  async fn start(&self) -> anyhow::Result<()> {
    if self.started.swap(true, Ordering::SeqCst) {
      anyhow::bail!("loopback channel already started");
    }
    event!(Level::INFO, "Loopback channel started.");
    let _ = self.events.send(ChannelEvent::Ready);
    Ok(())
  }

  async fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
    event!(Level::INFO, "Loopback channel stopped.");
  }

  fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
    self.events.subscribe()
  }
}
