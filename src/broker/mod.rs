//! STOMP broker core
//!
//! The [`Broker`] owns the shared state (session table, subscription
//! registry, middleware pipeline, event channel) and offers both faces of
//! the system: the WebSocket accept loop for network peers, and the host
//! embedding surface (`subscribe` / `unsubscribe` / `publish`) backed by the
//! in-process pseudo-session.

mod connection;
mod router;

pub use connection::Connection;
pub use router::MessageRouter;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use crate::destination::{Subscription, SubscriptionStore};
use crate::middleware::{Flow, Pipeline};
use crate::protocol::{headers, Body, Command, Frame, Headers};
use crate::session::{Session, SessionStore};
use crate::transport::{self, Transport, WsConn};

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// TCP bind address for the WebSocket listener
    pub bind_addr: SocketAddr,
    /// WebSocket upgrade path (default: "/stomp")
    pub path: String,
    /// Value of the CONNECTED `server` header
    pub server_name: String,
    /// Heartbeat pair `[sx, sy]` in milliseconds: how often the broker can
    /// send beacons, and how often it wants to hear from the client
    pub heartbeat: [u64; 2],
    /// Slack added to the receive interval before declaring a timeout
    pub heartbeat_error_margin_ms: u64,
    /// Maximum frame size in bytes
    pub max_frame_size: usize,
    /// Maximum concurrent network sessions
    pub max_connections: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:15674".parse().unwrap(),
            path: "/stomp".to_string(),
            server_name: format!("stompmq/{}", env!("CARGO_PKG_VERSION")),
            heartbeat: [10_000, 10_000],
            heartbeat_error_margin_ms: 1_000,
            max_frame_size: 1024 * 1024, // 1 MiB
            max_connections: 100_000,
        }
    }
}

/// Handler invoked for messages delivered to a host subscription
pub type DeliveryHandler = Arc<dyn Fn(Body, Headers) + Send + Sync>;

/// Broker events observable by the embedding host
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A transport attached; CONNECT not yet seen
    Connecting { session_id: Arc<str> },
    /// CONNECT accepted; headers are those of the CONNECTED reply
    Connected {
        session_id: Arc<str>,
        headers: Headers,
    },
    /// Session torn down
    Disconnected { session_id: Arc<str> },
    /// Subscription added
    Subscribed(Subscription),
    /// Subscription removed
    Unsubscribed(Subscription),
    /// A SEND passed the pipeline and was fanned out
    Send { destination: Arc<str>, frame: Frame },
    /// Delivery to a host subscription registered without a callback
    Message {
        subscription: Arc<str>,
        headers: Headers,
        body: Body,
    },
    /// A transport or delivery failure
    Error {
        session_id: Option<Arc<str>>,
        message: String,
    },
}

/// The STOMP broker
#[derive(Clone)]
pub struct Broker {
    config: Arc<BrokerConfig>,
    sessions: Arc<SessionStore>,
    subscriptions: Arc<SubscriptionStore>,
    pipeline: Arc<Pipeline>,
    router: Arc<MessageRouter>,
    events: broadcast::Sender<BrokerEvent>,
    shutdown: broadcast::Sender<()>,
    /// The in-process pseudo-session for host publish/subscribe
    local: Arc<Session>,
    local_handlers: Arc<DashMap<Arc<str>, DeliveryHandler>>,
    session_counter: Arc<AtomicU64>,
    sub_counter: Arc<AtomicU64>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let (events, _) = broadcast::channel(1024);
        let (shutdown, _) = broadcast::channel(1);

        let sessions = Arc::new(SessionStore::new());
        let subscriptions = Arc::new(SubscriptionStore::new());
        let local_handlers: Arc<DashMap<Arc<str>, DeliveryHandler>> = Arc::new(DashMap::new());

        let local = Session::pseudo(format!("self_{:x}", connection::rand_id()));
        sessions.insert(local.clone());

        let router = Arc::new(MessageRouter::new(
            sessions.clone(),
            subscriptions.clone(),
            local_handlers.clone(),
            events.clone(),
        ));

        Self {
            config: Arc::new(config),
            sessions,
            subscriptions,
            pipeline: Arc::new(Pipeline::new()),
            router,
            events,
            shutdown,
            local,
            local_handlers,
            session_counter: Arc::new(AtomicU64::new(0)),
            sub_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Subscribe to broker events.
    pub fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    /// Middleware registration handle.
    pub fn middleware(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Id of the in-process pseudo-session.
    pub fn local_session_id(&self) -> &Arc<str> {
        self.local.id()
    }

    /// Number of live sessions, the pseudo-session included.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Attach a transport as a new session: the `on-connection` entry point.
    ///
    /// The returned [`Connection`] is the session's inbound surface: call
    /// [`Connection::feed`] for each transport payload and
    /// [`Connection::closed`] when the transport goes away.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> Connection {
        self.attach_with_peer(transport, None)
    }

    fn attach_with_peer(
        &self,
        transport: Arc<dyn Transport>,
        peer: Option<SocketAddr>,
    ) -> Connection {
        let id = format!(
            "sess-{}",
            self.session_counter.fetch_add(1, Ordering::SeqCst) + 1
        );
        let session = Session::network(id, transport, peer);
        self.sessions.insert(session.clone());
        let _ = self.events.send(BrokerEvent::Connecting {
            session_id: session.id().clone(),
        });
        debug!(session = %session.id(), "session attached");

        Connection::new(
            session,
            self.sessions.clone(),
            self.subscriptions.clone(),
            self.pipeline.clone(),
            self.router.clone(),
            self.events.clone(),
            self.config.clone(),
        )
    }

    /// Register a host subscription delivered through broker events
    /// ([`BrokerEvent::Message`] keyed by the returned id).
    pub fn subscribe(&self, destination: &str, headers: Option<Headers>) -> Arc<str> {
        self.add_local_subscription(destination, headers, None)
    }

    /// Register a host subscription with a delivery callback.
    pub fn subscribe_with<F>(
        &self,
        destination: &str,
        callback: F,
        headers: Option<Headers>,
    ) -> Arc<str>
    where
        F: Fn(Body, Headers) + Send + Sync + 'static,
    {
        self.add_local_subscription(destination, headers, Some(Arc::new(callback)))
    }

    fn add_local_subscription(
        &self,
        destination: &str,
        headers: Option<Headers>,
        handler: Option<DeliveryHandler>,
    ) -> Arc<str> {
        let id: Arc<str> = match headers.as_ref().and_then(|h| h.get(headers::ID)) {
            Some(id) => Arc::from(id),
            None => Arc::from(format!(
                "sub-{}",
                self.sub_counter.fetch_add(1, Ordering::SeqCst) + 1
            )),
        };

        // Re-subscribing with the same id replaces the previous registration
        if self
            .subscriptions
            .take(self.local.id(), &id)
            .is_some()
        {
            self.local_handlers.remove(&id);
        }

        let subscription = Subscription::new(id.clone(), self.local.id().clone(), destination);
        self.subscriptions.add(subscription.clone());
        if let Some(handler) = handler {
            self.local_handlers.insert(id.clone(), handler);
        }
        let _ = self.events.send(BrokerEvent::Subscribed(subscription));
        id
    }

    /// Remove a host subscription. Returns whether one was removed.
    pub fn unsubscribe(&self, sub_id: &str) -> bool {
        self.local_handlers.remove(sub_id);
        match self.subscriptions.take(self.local.id(), sub_id) {
            Some(subscription) => {
                let _ = self.events.send(BrokerEvent::Unsubscribed(subscription));
                true
            }
            None => false,
        }
    }

    /// Publish from the embedding host through the `send` pipeline as the
    /// pseudo-session. Like any publisher, the host never receives its own
    /// message. Returns the number of subscriptions delivered to.
    pub async fn publish(
        &self,
        destination: &str,
        headers: Headers,
        body: impl Into<Body>,
    ) -> usize {
        let mut frame = Frame {
            command: "SEND".to_string(),
            headers,
            body: body.into(),
        };
        frame.headers.set(headers::DESTINATION, destination);

        if let Err(e) = connection::decode_json_body(&mut frame) {
            let _ = self.events.send(BrokerEvent::Error {
                session_id: Some(self.local.id().clone()),
                message: e.to_string(),
            });
            return 0;
        }
        if self
            .pipeline
            .dispatch(Command::Send, &self.local, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(destination, "host publish dropped by middleware");
            return 0;
        }
        self.router.route(self.local.id(), frame).await
    }

    /// Run the WebSocket listener until shutdown.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            "STOMP/WebSocket listening on {} (path: {})",
            self.config.bind_addr, self.config.path
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.recv() => {
                    match result {
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        _ => {
                            info!("broker shutting down");
                            break;
                        }
                    }
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            // session_count includes the pseudo-session
                            if self.session_count() > self.config.max_connections {
                                warn!("connection limit reached, refusing {}", addr);
                                continue;
                            }
                            debug!("new TCP connection from {}", addr);
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let broker = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            match transport::accept(stream, &broker.config.path).await {
                Ok(ws) => {
                    debug!("WebSocket handshake complete for {}", addr);
                    let serve = broker.serve(ws, addr);
                    tokio::pin!(serve);

                    loop {
                        tokio::select! {
                            biased;

                            _ = &mut serve => break,
                            result = shutdown_rx.recv() => {
                                match result {
                                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                    _ => break,
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("WebSocket handshake failed for {}: {}", addr, e);
                }
            }
        });
    }

    /// Pump one WebSocket connection into its session until it ends.
    async fn serve(&self, ws: WsConn, addr: SocketAddr) {
        use futures_util::StreamExt;

        let conn = self.attach_with_peer(ws.transport.clone(), Some(addr));
        let mut incoming = ws.incoming;

        while let Some(msg) = incoming.next().await {
            match msg {
                Ok(Message::Binary(data)) => conn.feed(&data).await,
                Ok(Message::Text(text)) => conn.feed(text.as_bytes()).await,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => conn.session().touch(),
                Ok(Message::Close(_)) => break,
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    conn.failed(&e).await;
                    return;
                }
            }
            if conn.is_closed() {
                break;
            }
        }
        conn.closed().await;
    }

    /// Signal the accept loop and all connection tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
