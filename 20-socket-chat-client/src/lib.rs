//! Scripted Socket.IO chat client.
//!
//! Connects to a chat server speaking Socket.IO v4, authenticates a user,
//! sends one chat message after a fixed pause, and then logs whatever the
//! server pushes until the connection ends.
//!
//! - [`cli`] parses flags into a [`script::ScriptConfig`].
//! - [`script`] holds the fixed run and the logging handlers.
//! - [`session`] owns the WebSocket: handshakes, heartbeats, event dispatch.
//! - [`handler`] maps event names to callbacks.
//! - [`packet`] encodes and decodes Engine.IO and Socket.IO text packets.
//! - [`endpoint`] turns a server URL into the transport URL.
//! - [`message`] defines the chat payloads.
//!
//! Integration tests drive the session against an in-process stub server.

pub mod cli;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod message;
pub mod packet;
pub mod script;
pub mod session;

pub use error::{PacketError, SessionError};
pub use handler::Handlers;
pub use session::{Session, SessionOptions};
