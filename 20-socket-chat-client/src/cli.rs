use std::time::Duration;

use clap::Parser;

use crate::{
    message::{AuthRequest, ChatMessage},
    script::{DEFAULT_ENDPOINT, ScriptConfig},
};

/// Connects to a chat server, authenticates, and sends one message.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket.IO server to connect to.
    #[arg(long, env = "CHAT_URL", default_value = DEFAULT_ENDPOINT)]
    pub url: String,

    /// User id sent in `authenticate` and used as the message sender.
    #[arg(long, default_value = "3")]
    pub sender_id: String,

    /// User id the chat message is addressed to.
    #[arg(long, default_value = "4")]
    pub receiver_id: String,

    /// Text of the chat message.
    #[arg(long, default_value = "Hello from user 3!")]
    pub message: String,

    /// Pause between authenticating and sending the message, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub delay_ms: u64,

    /// Token sent as `auth.token` when joining the namespace.
    #[arg(long, env = "CHAT_TOKEN")]
    pub token: Option<String>,

    /// How long to wait for the server to accept the connection, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,
}

impl From<Cli> for ScriptConfig {
    fn from(cli: Cli) -> Self {
        ScriptConfig {
            endpoint: cli.url,
            auth: AuthRequest {
                user_id: cli.sender_id.clone(),
            },
            message: ChatMessage {
                sender_id: cli.sender_id,
                receiver_id: cli.receiver_id,
                message: cli.message,
            },
            delay: Duration::from_millis(cli.delay_ms),
            token: cli.token,
            connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        }
    }
}
