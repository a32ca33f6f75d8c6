//! One Socket.IO session over a WebSocket.
//!
//! [`Session::connect`] performs the Engine.IO and namespace handshakes on the
//! caller's task, fires the `connect` handler, and then hands the socket to a
//! driver task. The driver owns both halves of the WebSocket and the handler
//! map: it answers heartbeats, dispatches inbound events, and writes the
//! frames queued by [`Session::emit`] in the order they were queued.

use std::{future::Future, time::Duration};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    net::TcpStream,
    select,
    sync::mpsc,
    task::{JoinError, JoinHandle},
    time::{Instant, sleep, timeout},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message, error::ProtocolError},
};
use tracing::{debug, info, warn};

use crate::{
    endpoint,
    error::SessionError,
    handler::{CONNECT, CONNECT_ERROR, DISCONNECT, Handlers},
    packet::{self, DEFAULT_NAMESPACE, EnginePacket, Handshake, SocketPacket},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Sent as the body of the namespace connect packet, e.g. `{"token": "..."}`.
    pub auth: Option<Value>,
    /// Upper bound on reaching a connected namespace, WebSocket dial included.
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auth: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
enum Command {
    Emit(String),
    Disconnect,
}

#[derive(Debug)]
pub struct Session {
    handshake: Handshake,
    commands: mpsc::Sender<Command>,
    driver: JoinHandle<Result<(), SessionError>>,
}

impl Session {
    /// Connects to `endpoint` and returns once the default namespace is
    /// joined. The `connect` handler has already run when this returns.
    pub async fn connect(
        endpoint: &str,
        handlers: Handlers,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let url = endpoint::resolve(endpoint)?;
        info!(%url, "connecting");

        let SessionOptions {
            auth,
            connect_timeout,
        } = options;

        // Elapsing maps to `Timeout`, whichever handshake step was pending.
        let (ws, handshake, ack) = timeout(
            connect_timeout,
            establish(endpoint, url.as_str(), &handlers, auth),
        )
        .await
        .map_err(|_| SessionError::Timeout(connect_timeout))??;

        info!(sid = %handshake.sid, "connected");
        handlers.dispatch(CONNECT, ack);

        let heartbeat = Duration::from_millis(
            handshake.ping_interval.saturating_add(handshake.ping_timeout),
        );
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let driver = tokio::spawn(drive(ws, handlers, inbox, heartbeat));

        Ok(Self {
            handshake,
            commands,
            driver,
        })
    }

    pub fn sid(&self) -> &str {
        &self.handshake.sid
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed() || self.driver.is_finished()
    }

    /// Queues `event` with `payload` for the driver. No acknowledgement is
    /// requested from the server.
    pub async fn emit<T>(&self, event: &str, payload: &T) -> Result<(), SessionError>
    where
        T: Serialize + ?Sized,
    {
        let frame = packet::encode_event(event, payload)?;
        debug!(event, "emitting");
        self.commands
            .send(Command::Emit(frame))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Leaves the namespace and closes the socket. [`Session::wait`] returns
    /// `Ok` afterwards.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Disconnect)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Services inbound events until the session ends.
    pub async fn wait(self) -> Result<(), SessionError> {
        self.wait_until(std::future::pending()).await
    }

    /// Like [`Session::wait`], but disconnects once `shutdown` resolves.
    pub async fn wait_until<F>(self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let Session {
            commands,
            mut driver,
            ..
        } = self;
        tokio::pin!(shutdown);

        select! {
            joined = &mut driver => return join_result(joined),
            () = &mut shutdown => info!("shutting down session"),
        }

        // The driver may have finished on its own meanwhile; its result wins.
        let _ = commands.send(Command::Disconnect).await;
        join_result(driver.await)
    }
}

fn join_result(joined: Result<Result<(), SessionError>, JoinError>) -> Result<(), SessionError> {
    match joined {
        Ok(result) => result,
        Err(error) => {
            warn!(%error, "session driver stopped unexpectedly");
            Err(SessionError::Closed)
        }
    }
}

async fn establish(
    endpoint: &str,
    url: &str,
    handlers: &Handlers,
    auth: Option<Value>,
) -> Result<(WsStream, Handshake, Value), SessionError> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|source| SessionError::Connect {
            url: endpoint.to_string(),
            source,
        })?;

    let handshake = match read_packet(&mut ws).await? {
        Some(EnginePacket::Open(handshake)) => handshake,
        Some(other) => {
            return Err(SessionError::Handshake(format!(
                "expected open packet, got {other:?}"
            )));
        }
        None => {
            return Err(SessionError::Handshake(
                "connection closed before open packet".to_string(),
            ));
        }
    };
    debug!(
        sid = %handshake.sid,
        ping_interval = handshake.ping_interval,
        ping_timeout = handshake.ping_timeout,
        "engine.io open"
    );

    let connect = SocketPacket::Connect {
        namespace: DEFAULT_NAMESPACE.to_string(),
        data: auth,
    };
    send_packet(&mut ws, connect.into_engine()).await?;

    let ack = await_connect_ack(&mut ws, handlers).await?;
    Ok((ws, handshake, ack))
}

async fn await_connect_ack(ws: &mut WsStream, handlers: &Handlers) -> Result<Value, SessionError> {
    loop {
        let body = match read_packet(ws).await? {
            Some(EnginePacket::Message(body)) => body,
            Some(EnginePacket::Ping) => {
                send_packet(ws, EnginePacket::Pong).await?;
                continue;
            }
            Some(EnginePacket::Close) | None => {
                return Err(SessionError::Handshake(
                    "connection closed before connect acknowledgement".to_string(),
                ));
            }
            Some(other) => {
                debug!(packet = ?other, "ignoring packet before connect acknowledgement");
                continue;
            }
        };

        match SocketPacket::decode(&body) {
            Ok(SocketPacket::Connect { namespace, data }) if namespace == DEFAULT_NAMESPACE => {
                return Ok(data.unwrap_or(Value::Null));
            }
            Ok(SocketPacket::ConnectError { namespace, data }) if namespace == DEFAULT_NAMESPACE => {
                warn!(%data, "connection rejected");
                handlers.dispatch(CONNECT_ERROR, data.clone());
                return Err(SessionError::Rejected(data));
            }
            Ok(packet) => debug!(?packet, "ignoring packet before connect acknowledgement"),
            Err(error) => warn!(%error, "skipping malformed packet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(&'static str),
}

async fn drive(
    ws: WsStream,
    handlers: Handlers,
    mut inbox: mpsc::Receiver<Command>,
    heartbeat: Duration,
) -> Result<(), SessionError> {
    let (mut sink, mut stream) = ws.split();
    let deadline = sleep(heartbeat);
    tokio::pin!(deadline);

    let outcome = loop {
        select! {
            command = inbox.recv() => match command {
                Some(Command::Emit(frame)) => {
                    if let Err(err) = send_text(&mut sink, frame).await {
                        break Err(err);
                    }
                }
                Some(Command::Disconnect) | None => {
                    let farewell = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    if let Err(error) = send_packet(&mut sink, farewell.into_engine()).await {
                        debug!(%error, "failed to send disconnect packet");
                    }
                    break Ok("io client disconnect");
                }
            },
            packet = read_packet(&mut stream) => match packet {
                Ok(Some(packet)) => {
                    // Out-of-range deadlines keep the far-future one `sleep` picked.
                    if let Some(next) = Instant::now().checked_add(heartbeat) {
                        deadline.as_mut().reset(next);
                    }
                    match handle_packet(packet, &mut sink, &handlers).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop(reason)) => break Ok(reason),
                        Err(err) => break Err(err),
                    }
                }
                Ok(None) => break Ok("transport close"),
                Err(err) => break Err(err),
            },
            () = &mut deadline => break Ok("ping timeout"),
        }
    };

    if let Err(error) = sink.close().await {
        debug!(%error, "websocket already closed");
    }

    let reason = match &outcome {
        Ok(reason) => *reason,
        Err(_) => "transport error",
    };
    info!(reason, "disconnected");
    handlers.dispatch(DISCONNECT, Value::String(reason.to_string()));

    outcome.map(|_| ())
}

async fn handle_packet<S>(
    packet: EnginePacket,
    sink: &mut S,
    handlers: &Handlers,
) -> Result<Flow, SessionError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match packet {
        EnginePacket::Ping => {
            send_packet(sink, EnginePacket::Pong).await?;
            Ok(Flow::Continue)
        }
        EnginePacket::Close => Ok(Flow::Stop("transport close")),
        EnginePacket::Message(body) => Ok(handle_message(&body, handlers)),
        other => {
            debug!(packet = ?other, "ignoring engine.io packet");
            Ok(Flow::Continue)
        }
    }
}

fn handle_message(body: &str, handlers: &Handlers) -> Flow {
    let packet = match SocketPacket::decode(body) {
        Ok(packet) => packet,
        Err(error) => {
            warn!(%error, "skipping malformed packet");
            return Flow::Continue;
        }
    };

    if packet.namespace() != DEFAULT_NAMESPACE {
        debug!(namespace = packet.namespace(), "ignoring packet for another namespace");
        return Flow::Continue;
    }

    match packet {
        SocketPacket::Event { id, name, args, .. } => {
            if matches!(name.as_str(), CONNECT | DISCONNECT | CONNECT_ERROR) {
                warn!(event = %name, "ignoring reserved event name sent by server");
                return Flow::Continue;
            }
            if let Some(id) = id {
                debug!(id, event = %name, "server asked for an ack; none is sent");
            }
            let payload = args.into_iter().next().unwrap_or(Value::Null);
            debug!(event = %name, "dispatching");
            handlers.dispatch(&name, payload);
            Flow::Continue
        }
        SocketPacket::Disconnect { .. } => Flow::Stop("io server disconnect"),
        SocketPacket::ConnectError { data, .. } => {
            warn!(%data, "server reported a connection error");
            handlers.dispatch(CONNECT_ERROR, data);
            Flow::Continue
        }
        other => {
            debug!(packet = ?other, "ignoring packet");
            Flow::Continue
        }
    }
}

async fn read_packet<S>(stream: &mut S) -> Result<Option<EnginePacket>, SessionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) if is_closed(&err) => return Ok(None),
            Err(err) => return Err(SessionError::Transport(err)),
        };

        match frame {
            Message::Text(text) => match EnginePacket::decode(text.as_str()) {
                Ok(packet) => return Ok(Some(packet)),
                Err(error) => warn!(%error, "skipping malformed frame"),
            },
            Message::Close(frame) => {
                debug!(?frame, "websocket closed by peer");
                return Ok(None);
            }
            Message::Binary(bytes) => debug!(len = bytes.len(), "ignoring binary frame"),
            _ => {}
        }
    }
    Ok(None)
}

fn is_closed(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

async fn send_packet<S>(sink: &mut S, packet: EnginePacket) -> Result<(), SessionError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    send_text(sink, packet.encode()).await
}

async fn send_text<S>(sink: &mut S, text: String) -> Result<(), SessionError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(text.into()))
        .await
        .map_err(SessionError::Transport)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn recording(events: &[&'static str]) -> (Handlers, Arc<Mutex<Vec<(String, Value)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = Handlers::new();
        for &event in events {
            let sink = Arc::clone(&seen);
            handlers = handlers.on(event, move |payload| {
                sink.lock().unwrap().push((event.to_string(), payload));
            });
        }
        (handlers, seen)
    }

    #[test]
    fn events_reach_their_handlers() {
        let (handlers, seen) = recording(&["receive_message"]);

        let flow = handle_message(
            r#"2["receive_message",{"senderId":"7","message":"hi"}]"#,
            &handlers,
        );

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(
                "receive_message".to_string(),
                json!({"senderId": "7", "message": "hi"})
            )]
        );
    }

    #[test]
    fn server_disconnect_stops_the_driver() {
        let (handlers, _) = recording(&[]);
        assert_eq!(
            handle_message("1", &handlers),
            Flow::Stop("io server disconnect")
        );
    }

    #[test]
    fn reserved_names_and_foreign_namespaces_are_ignored() {
        let (handlers, seen) = recording(&["connect", "receive_message"]);

        handle_message(r#"2["connect",{}]"#, &handlers);
        handle_message(r#"2/admin,["receive_message",{}]"#, &handlers);
        handle_message("2{not json", &handlers);

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn late_connect_error_is_reported() {
        let (handlers, seen) = recording(&["connect_error"]);

        let flow = handle_message(r#"4{"message":"Authentication error: Invalid token"}"#, &handlers);

        assert_eq!(flow, Flow::Continue);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_event_argument_becomes_null() {
        let (handlers, seen) = recording(&["ping_me"]);
        handle_message(r#"2["ping_me"]"#, &handlers);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("ping_me".to_string(), Value::Null)]
        );
    }
}
