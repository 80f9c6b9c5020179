//! block-exchange: an HTTP/1.x server that hands out synthetic content blocks
//!
//! Clients send a batch of 128-byte tokens and get back, for each valid
//! token, a block that stays stable for the life of the process.
//!
//! Layers:
//! - `runtime`: sessions, deadlines and the dispatcher contract
//! - `protocols`: HTTP/1.x framing and the block exchange handler
//! - `directory`: token to block mapping
//! - `server`: listener and composition root
//! - `client`: one-shot outbound session

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod protocols;
pub mod runtime;
pub mod server;

pub use config::Config;
pub use directory::Directory;
pub use protocols::exchange::BlockExchange;
pub use server::{Listener, Server};
