//! In-process Socket.IO server stub for driving the client in tests.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use socket_chat_client::packet::{EnginePacket, Handshake, SocketPacket};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct StubOptions {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// When set, the namespace connect is refused with this payload.
    pub reject_with: Option<Value>,
    /// When set, the open packet goes out but the namespace connect is
    /// never acknowledged.
    pub withhold_ack: bool,
}

impl Default for StubOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            reject_with: None,
            withhold_ack: false,
        }
    }
}

/// What the stub observed from the client.
#[derive(Debug, Clone)]
pub enum Inbound {
    Event {
        at: Instant,
        name: String,
        payload: Value,
    },
    Pong,
    Disconnect,
}

enum Outbound {
    Text(String),
    Close,
}

pub struct StubServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<StubConnection>,
}

pub struct StubConnection {
    pub uri: String,
    pub auth: Option<Value>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl StubServer {
    pub async fn start(options: StubOptions) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let options = options.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, options, tx).await;
                });
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            connections,
        })
    }

    pub async fn accept(&mut self) -> Result<StubConnection> {
        timeout(RECV_TIMEOUT, self.connections.recv())
            .await
            .context("timed out waiting for a client")?
            .ok_or_else(|| anyhow!("stub server stopped"))
    }
}

impl StubConnection {
    pub fn emit(&self, name: &str, payload: Value) {
        let frame = SocketPacket::event(name, payload).into_engine().encode();
        self.send_raw(frame);
    }

    pub fn send_raw(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Text(frame.into()));
    }

    /// Leaves the namespace the way a server-side `socket.disconnect()` does.
    pub fn disconnect(&self) {
        self.send_raw("41");
        let _ = self.outbound.send(Outbound::Close);
    }

    pub async fn next(&mut self) -> Result<Inbound> {
        timeout(RECV_TIMEOUT, self.inbound.recv())
            .await
            .context("timed out waiting for client traffic")?
            .ok_or_else(|| anyhow!("client connection closed"))
    }

    pub async fn next_event(&mut self) -> Result<(Instant, String, Value)> {
        loop {
            match self.next().await? {
                Inbound::Event { at, name, payload } => return Ok((at, name, payload)),
                other => eprintln!("skipping {other:?} while waiting for an event"),
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    options: StubOptions,
    connections: mpsc::UnboundedSender<StubConnection>,
) -> Result<()> {
    let mut uri = String::new();
    let mut ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        uri = request.uri().to_string();
        Ok::<Response, ErrorResponse>(response)
    })
    .await?;

    let open = EnginePacket::Open(Handshake {
        sid: "stub-sid".to_string(),
        upgrades: Vec::new(),
        ping_interval: options.ping_interval_ms,
        ping_timeout: options.ping_timeout_ms,
        max_payload: 1_000_000,
    });
    ws.send(Message::Text(open.encode().into())).await?;

    let auth = loop {
        let Some(frame) = ws.next().await else {
            return Ok(());
        };
        let Message::Text(text) = frame? else {
            continue;
        };
        if let Ok(EnginePacket::Message(body)) = EnginePacket::decode(text.as_str()) {
            if let Ok(SocketPacket::Connect { data, .. }) = SocketPacket::decode(&body) {
                break data;
            }
        }
    };

    if options.withhold_ack {
        while let Some(Ok(_)) = ws.next().await {}
        return Ok(());
    }

    if let Some(reason) = options.reject_with {
        let refusal = SocketPacket::ConnectError {
            namespace: "/".to_string(),
            data: reason,
        };
        ws.send(Message::Text(refusal.into_engine().encode().into()))
            .await?;
        let _ = ws.close(None).await;
        return Ok(());
    }

    let ack = SocketPacket::Connect {
        namespace: "/".to_string(),
        data: Some(json!({ "sid": "stub-socket" })),
    };
    ws.send(Message::Text(ack.into_engine().encode().into()))
        .await?;

    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    let _ = connections.send(StubConnection {
        uri,
        auth,
        inbound,
        outbound,
    });

    let (mut sink, mut stream) = ws.split();
    loop {
        select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                let Message::Text(text) = frame else { continue };
                match EnginePacket::decode(text.as_str()) {
                    Ok(EnginePacket::Pong) => {
                        let _ = inbound_tx.send(Inbound::Pong);
                    }
                    Ok(EnginePacket::Message(body)) => match SocketPacket::decode(&body) {
                        Ok(SocketPacket::Event { name, args, .. }) => {
                            let payload = args.into_iter().next().unwrap_or(Value::Null);
                            let _ = inbound_tx.send(Inbound::Event {
                                at: Instant::now(),
                                name,
                                payload,
                            });
                        }
                        Ok(SocketPacket::Disconnect { .. }) => {
                            let _ = inbound_tx.send(Inbound::Disconnect);
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
            command = outbound_rx.recv() => match command {
                Some(Outbound::Text(text)) => sink.send(Message::Text(text.into())).await?,
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    }

    Ok(())
}
