mod client;
mod config;
mod conn;
mod delivery;
mod dispatcher;
mod handshake;
mod outbound;
pub mod packet;
pub mod segment;
mod server;

pub use client::*;
pub use config::*;
pub use server::*;
