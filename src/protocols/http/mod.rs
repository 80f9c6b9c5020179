//! HTTP/1.x framing for the block exchange.
//!
//! Requests and responses are framed by `Content-Length`; persistence follows
//! the HTTP/1.0 and HTTP/1.1 defaults plus the `Connection` header.
//!
//! ## Wire Format
//!
//! ```text
//! Request:  GET / HTTP/1.1\r\nContent-Type: text/html\r\nContent-Length: <n>\r\n\r\n<batch>
//! Response: HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: <n>\r\n\r\n<batch>
//! ```

pub mod message;
pub mod parser;

pub use message::{is_keep_alive, Headers, Method, Request, Response, Status, Version};
pub use parser::{parse_request, parse_response, ParseError, ParseResult, ResponseMessage};
