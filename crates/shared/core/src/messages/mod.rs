//! Wire envelopes exchanged with the backend

mod client;
mod server;

pub use client::ClientMessage;
pub use server::ServerMessage;
