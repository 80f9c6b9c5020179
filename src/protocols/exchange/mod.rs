//! Content-addressed block exchange.
//!
//! A client submits a batch of 128-byte tokens and receives, for each token
//! of the right length, the block the directory associates with it:
//!
//! ```text
//! Request:  GET / with body = ClientToServer { hashes }
//! Response: 200 OK with body = ServerToClient { hash_and_block }
//!           400 Bad Request "Parse error" when the body does not decode
//!           405 Method Not Allowed "Invalid method" for anything but GET/HEAD
//! ```
//!
//! Tokens of any other length are skipped without touching the directory.

pub mod codec;
pub mod handler;

pub use handler::BlockExchange;
