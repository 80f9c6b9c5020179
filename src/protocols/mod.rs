//! Protocol implementations.
//!
//! - `http`: HTTP/1.x request/response framing used by every session
//! - `exchange`: the token-batch codec and the block exchange dispatcher

pub mod exchange;
pub mod http;
