//! WebSocket transport
//!
//! Runs STOMP 1.2 over a `tokio-tungstenite` client connection.
//! Responsibilities:
//! - Rewrite `http(s)` endpoints to `ws(s)` and open the socket
//! - Perform the CONNECT/CONNECTED handshake within the connect timeout and
//!   negotiate heartbeats
//! - Turn subscribe/unsubscribe/send calls into frames
//! - Report every inbound MESSAGE, ERROR and failure through the `EventSink`
//!
//! Each session owns a spawned I/O task. The session handle only queues
//! commands for it, so none of its methods block.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::transport::frame::{self, Frame};
use crate::transport::{Connector, EventSink, Heartbeat, SubscriptionHandle, TransportSession};
use crate::utils::error::{ProtocolError, TransportError};

// longest timer we arm; later deadlines would overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settings for the STOMP connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StompConfig {
    pub heartbeat: Heartbeat,
    /// Limit for opening the socket and receiving CONNECTED. Zero waits
    /// forever.
    pub connect_timeout: Duration,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            heartbeat: Heartbeat::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Opens STOMP-over-WebSocket sessions.
#[derive(Debug, Clone, Default)]
pub struct StompConnector {
    config: StompConfig,
}

impl StompConnector {
    pub fn new(config: StompConfig) -> Self {
        Self { config }
    }
}

impl Connector for StompConnector {
    type Session = StompSession;

    fn open(&mut self, url: &str, sink: EventSink) -> Result<StompSession, TransportError> {
        let endpoint = websocket_url(url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(session = %session_id, endpoint = %endpoint, "opening STOMP session");
        let task = tokio::spawn(run_session(
            session_id.clone(),
            endpoint,
            self.config,
            rx,
            sink,
        ));
        Ok(StompSession {
            id: session_id,
            commands: tx,
            next_subscription: 0,
            task,
        })
    }
}

#[derive(Debug)]
enum Command {
    Subscribe { id: String, destination: String },
    Unsubscribe { id: String },
    Send { destination: String, body: String },
    Disconnect,
}

/// Handle to one STOMP session's I/O task.
///
/// Dropping the handle closes the command channel, which the task treats as
/// a disconnect request.
#[derive(Debug)]
pub struct StompSession {
    id: String,
    commands: UnboundedSender<Command>,
    next_subscription: u64,
    task: JoinHandle<()>,
}

impl StompSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the I/O task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn queue(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::closed("session task has exited"))
    }
}

impl TransportSession for StompSession {
    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionHandle, TransportError> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        self.queue(Command::Subscribe {
            id: id.clone(),
            destination: destination.to_string(),
        })?;
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        self.queue(Command::Unsubscribe {
            id: handle.as_str().to_string(),
        })
    }

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        self.queue(Command::Send {
            destination: destination.to_string(),
            body: body.to_string(),
        })
    }

    fn close(&mut self) {
        // the task may already be gone; nothing left to close then
        let _ = self.commands.send(Command::Disconnect);
    }
}

/// Maps an endpoint url onto the WebSocket scheme the socket needs.
pub fn websocket_url(raw: &str) -> Result<Url, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("scheme must be http, https, ws or wss")),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot rewrite scheme"))?;
    Ok(url)
}

/// Heartbeat timings agreed with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// How often we must send something. `None` disables.
    pub send_every: Option<Duration>,
    /// How long we tolerate silence from the server. `None` disables.
    pub silence_limit: Option<Duration>,
}

/// Parses a `heart-beat: x,y` header value into millisecond pairs.
pub fn parse_heartbeat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Combines our requested heartbeat with the server's `heart-beat` header.
pub fn negotiate_heartbeat(ours: Heartbeat, server: Option<&str>) -> Negotiated {
    let (server_out, server_in) = server.and_then(parse_heartbeat).unwrap_or((0, 0));
    let client_out = millis(ours.outgoing);
    let client_in = millis(ours.incoming);

    let send_every = (client_out > 0 && server_in > 0)
        .then(|| Duration::from_millis(client_out.max(server_in)))
        .map(|d| d.min(FAR_FUTURE));
    // allow one missed beat before declaring the server dead
    let silence_limit = (client_in > 0 && server_out > 0)
        .then(|| Duration::from_millis(client_in.max(server_out).saturating_mul(2)))
        .map(|d| d.min(FAR_FUTURE));

    Negotiated {
        send_every,
        silence_limit,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn run_session(
    session_id: String,
    endpoint: Url,
    config: StompConfig,
    mut commands: UnboundedReceiver<Command>,
    sink: EventSink,
) {
    match drive(&endpoint, config, &mut commands, &sink).await {
        Ok(()) => debug!(session = %session_id, "STOMP session closed by client"),
        Err(e) => {
            warn!(session = %session_id, "STOMP session ended: {}", e);
            sink.failed(e);
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the socket and runs CONNECT until the server answers CONNECTED.
async fn handshake(
    endpoint: &Url,
    heartbeat: Heartbeat,
    sink: &EventSink,
) -> Result<(WsStream, Frame), TransportError> {
    let (mut ws_stream, _response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| TransportError::Unreachable(e.to_string()))?;

    let connect = Frame::new(frame::CONNECT)
        .header("accept-version", "1.2")
        .header("host", endpoint.host_str().unwrap_or("localhost"))
        .header(
            "heart-beat",
            format!("{},{}", millis(heartbeat.outgoing), millis(heartbeat.incoming)),
        );
    ws_stream.send(WsMessage::text(connect.encode())).await?;

    loop {
        let Some(msg) = ws_stream.next().await else {
            return Err(TransportError::closed("closed during handshake"));
        };
        let Some(text) = frame_text(msg?, sink)? else {
            continue;
        };
        if frame::is_heartbeat(&text) {
            continue;
        }
        let reply = match Frame::parse(&text) {
            Ok(reply) => reply,
            Err(e) => {
                sink.protocol_error(e);
                continue;
            }
        };
        match reply.command.as_str() {
            frame::CONNECTED => return Ok((ws_stream, reply)),
            frame::ERROR => {
                sink.protocol_error(server_error(&reply));
                return Err(TransportError::closed("server rejected CONNECT"));
            }
            other => {
                sink.protocol_error(ProtocolError::UnexpectedFrame {
                    command: other.to_string(),
                });
            }
        }
    }
}

async fn drive(
    endpoint: &Url,
    config: StompConfig,
    commands: &mut UnboundedReceiver<Command>,
    sink: &EventSink,
) -> Result<(), TransportError> {
    let heartbeat = config.heartbeat;
    let (ws_stream, connected) = if config.connect_timeout.is_zero() {
        handshake(endpoint, heartbeat, sink).await?
    } else {
        tokio::time::timeout(config.connect_timeout, handshake(endpoint, heartbeat, sink))
            .await
            .map_err(|_| TransportError::HandshakeTimeout(millis(config.connect_timeout)))??
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let timing = negotiate_heartbeat(heartbeat, connected.get("heart-beat"));
    info!(
        endpoint = %endpoint,
        version = connected.get("version").unwrap_or("1.2"),
        "STOMP connected"
    );
    sink.connected();

    let mut beat = tokio::time::interval(timing.send_every.unwrap_or(FAR_FUTURE));
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    beat.reset();
    let silence_limit = timing.silence_limit.unwrap_or(FAR_FUTURE);
    let mut deadline = Instant::now() + silence_limit;

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let out = match cmd {
                    Some(Command::Subscribe { id, destination }) => Frame::new(frame::SUBSCRIBE)
                        .header("id", id)
                        .header("destination", destination)
                        .header("ack", "auto"),
                    Some(Command::Unsubscribe { id }) => Frame::new(frame::UNSUBSCRIBE).header("id", id),
                    Some(Command::Send { destination, body }) => Frame::new(frame::SEND)
                        .header("destination", destination)
                        .header("content-type", "application/json")
                        .with_body(body),
                    Some(Command::Disconnect) | None => {
                        let _ = ws_sender
                            .send(WsMessage::text(Frame::new(frame::DISCONNECT).encode()))
                            .await;
                        let _ = ws_sender.close().await;
                        return Ok(());
                    }
                };
                ws_sender.send(WsMessage::text(out.encode())).await?;
                beat.reset();
            }

            msg = ws_receiver.next() => {
                deadline = Instant::now() + silence_limit;
                let msg = match msg {
                    Some(msg) => msg?,
                    None => return Err(TransportError::closed("server closed the socket")),
                };
                if let WsMessage::Close(close) = &msg {
                    let reason = close
                        .as_ref()
                        .map(|c| c.reason.as_str().to_string())
                        .unwrap_or_else(|| "close frame".to_string());
                    return Err(TransportError::Closed(reason));
                }
                let Some(text) = frame_text(msg, sink)? else {
                    continue;
                };
                if frame::is_heartbeat(&text) {
                    continue;
                }
                match Frame::parse(&text) {
                    Ok(inbound) => route_inbound(inbound, sink),
                    Err(e) => sink.protocol_error(e),
                }
            }

            _ = beat.tick(), if timing.send_every.is_some() => {
                ws_sender.send(WsMessage::text(frame::HEARTBEAT)).await?;
            }

            _ = tokio::time::sleep_until(deadline), if timing.silence_limit.is_some() => {
                return Err(TransportError::HeartbeatTimeout(millis(silence_limit)));
            }
        }
    }
}

fn route_inbound(inbound: Frame, sink: &EventSink) {
    match inbound.command.as_str() {
        frame::MESSAGE => match inbound.get("subscription") {
            Some(id) => {
                let handle = SubscriptionHandle::new(id);
                sink.message(handle, inbound.body);
            }
            None => sink.protocol_error(ProtocolError::MalformedFrame(
                "MESSAGE without subscription header".into(),
            )),
        },
        frame::ERROR => sink.protocol_error(server_error(&inbound)),
        frame::RECEIPT => {}
        other => sink.protocol_error(ProtocolError::UnexpectedFrame {
            command: other.to_string(),
        }),
    }
}

fn server_error(frame: &Frame) -> ProtocolError {
    ProtocolError::ServerError {
        message: frame.get("message").unwrap_or("unknown error").to_string(),
        details: (!frame.body.is_empty()).then(|| frame.body.clone()),
    }
}

/// Extracts frame text from a socket message. Control messages and
/// undecodable binary payloads yield `None`; the latter are reported.
fn frame_text(msg: WsMessage, sink: &EventSink) -> Result<Option<String>, TransportError> {
    match msg {
        WsMessage::Text(text) => Ok(Some(text.as_str().to_string())),
        WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Ok(Some(text)),
            Err(_) => {
                sink.protocol_error(ProtocolError::MalformedFrame(
                    "binary frame is not UTF-8".into(),
                ));
                Ok(None)
            }
        },
        WsMessage::Close(_) => Err(TransportError::closed("close frame")),
        _ => Ok(None),
    }
}
