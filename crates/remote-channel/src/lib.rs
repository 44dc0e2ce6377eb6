#![doc = include_str!("../README.md")]
//!
//! # Modules
//!
//! - [`client`]: receive loop, session state, [`Emitter`]
//! - [`dispatch`]: bounded per-listener event queues
//! - [`message`]: wire messages
//! - [`transport`]: HTTP seam and the reqwest implementation
//! - [`error`]: [`RemoteError`]

pub mod client;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod transport;

pub use client::{
    CONNECT_EVENT, ChannelSettings, ChannelState, DISCONNECT_EVENT, Emitter, RemoteChannel,
    retry_delay,
};
pub use dispatch::Dispatcher;
pub use error::RemoteError;
pub use message::{Action, Message, Outgoing, decode_payload};
pub use transport::{HttpResponse, HttpTransport, Transport, endpoint_url};
