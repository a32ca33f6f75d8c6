//! The scripted client run: authenticate, pause, send one chat message, then
//! keep servicing inbound events until the session ends.

use std::{future::Future, time::Duration};

use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    error::SessionError,
    handler::{CONNECT, CONNECT_ERROR, DISCONNECT, Handlers},
    message::{AUTHENTICATE, AuthRequest, ChatMessage, IncomingMessage, RECEIVE_MESSAGE, SEND_MESSAGE},
    session::{Session, SessionOptions},
};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5090";
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    pub endpoint: String,
    pub auth: AuthRequest,
    pub message: ChatMessage,
    /// Unconditional pause between `authenticate` and `send_message`.
    pub delay: Duration,
    pub token: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth: AuthRequest {
                user_id: "3".to_string(),
            },
            message: ChatMessage {
                sender_id: "3".to_string(),
                receiver_id: "4".to_string(),
                message: "Hello from user 3!".to_string(),
            },
            delay: DEFAULT_DELAY,
            token: None,
            connect_timeout: SessionOptions::default().connect_timeout,
        }
    }
}

impl ScriptConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auth: self.token.as_ref().map(|token| json!({ "token": token })),
            connect_timeout: self.connect_timeout,
        }
    }
}

pub fn describe_incoming(message: &IncomingMessage) -> String {
    format!("New message from {}: {}", message.sender_id, message.message)
}

pub fn describe_authenticated(auth: &AuthRequest) -> String {
    format!("User {} authenticated", auth.user_id)
}

pub fn describe_disconnect(reason: &Value) -> String {
    match reason.as_str() {
        Some(reason) => format!("Disconnected from the server ({reason})"),
        None => "Disconnected from the server".to_string(),
    }
}

/// Handlers that log every event the chat server sends.
pub fn default_handlers() -> Handlers {
    Handlers::new()
        .on(CONNECT, |_| info!("Successfully connected to server!"))
        .on_payload(RECEIVE_MESSAGE, |message: IncomingMessage| {
            info!("{}", describe_incoming(&message));
        })
        .on_payload(AUTHENTICATE, |auth: AuthRequest| {
            info!("{}", describe_authenticated(&auth));
        })
        .on(DISCONNECT, |reason| info!("{}", describe_disconnect(&reason)))
        .on(CONNECT_ERROR, |data| error!("Connection failed: {data}"))
}

/// Runs the full script and returns once the session ends or `shutdown`
/// resolves.
pub async fn run_until<F>(
    config: &ScriptConfig,
    handlers: Handlers,
    shutdown: F,
) -> Result<(), SessionError>
where
    F: Future<Output = ()>,
{
    let session = Session::connect(&config.endpoint, handlers, config.session_options()).await?;
    send_scripted(&session, config).await?;
    session.wait_until(shutdown).await
}

pub async fn run(config: &ScriptConfig, handlers: Handlers) -> Result<(), SessionError> {
    run_until(config, handlers, std::future::pending()).await
}

/// The two scripted emissions with the fixed pause between them.
pub async fn send_scripted(session: &Session, config: &ScriptConfig) -> Result<(), SessionError> {
    session.emit(AUTHENTICATE, &config.auth).await?;
    info!(sid = session.sid(), user_id = %config.auth.user_id, "authentication sent");

    tokio::time::sleep(config.delay).await;

    session.emit(SEND_MESSAGE, &config.message).await?;
    info!(
        sender_id = %config.message.sender_id,
        receiver_id = %config.message.receiver_id,
        "message sent"
    );
    Ok(())
}
