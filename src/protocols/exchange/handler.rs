//! Block exchange request handler.

use super::codec::{self, HashAndBlock};
use crate::directory::Directory;
use crate::error::ExchangeError;
use crate::protocols::http::{Method, Request, Response, Status};
use crate::runtime::dispatch::{Dispatcher, Responder};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain";

/// Resolves every well-formed token in a request batch against the directory.
#[derive(Clone)]
pub struct BlockExchange {
    directory: Arc<Directory>,
}

impl BlockExchange {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Build the response for one request. Never fails: errors become 4xx.
    pub fn respond(&self, request: &Request) -> Response {
        let (status, body, content_type) = match self.exchange(request) {
            Ok(body) => (Status::Ok, body, OCTET_STREAM),
            Err(e) => {
                debug!(error = %e, "Rejected request");
                (e.status(), diagnostic(&e), TEXT_PLAIN)
            }
        };

        Response::new(status, request.version, body)
            .content_type(content_type)
            .keep_alive(request.keep_alive())
            .head_only(request.method == Method::Head)
    }

    fn exchange(&self, request: &Request) -> Result<Bytes, ExchangeError> {
        if !matches!(request.method, Method::Get | Method::Head) {
            return Err(ExchangeError::UnsupportedMethod(request.method.clone()));
        }

        let hashes = codec::decode_request(&request.body)?;
        trace!(hashes = hashes.len(), "Decoded batch");

        let batch: Vec<HashAndBlock> = hashes
            .into_iter()
            .filter_map(|hash| {
                let resolved = self.directory.resolve(&hash)?;
                Some(HashAndBlock {
                    hash,
                    block: resolved.block,
                })
            })
            .collect();

        debug!(blocks = batch.len(), "Resolved batch");
        Ok(codec::encode_response(&batch))
    }
}

fn diagnostic(err: &ExchangeError) -> Bytes {
    match err {
        ExchangeError::Decode(_) => Bytes::from_static(b"Parse error"),
        ExchangeError::UnsupportedMethod(_) => Bytes::from_static(b"Invalid method"),
    }
}

impl Dispatcher for BlockExchange {
    fn handle(&self, request: Request, responder: Responder) {
        responder.send(self.respond(&request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MAX_BLOCK_SIZE, MAX_HASH_SIZE};
    use crate::protocols::http::Version;

    fn exchange() -> BlockExchange {
        BlockExchange::new(Directory::new(MAX_BLOCK_SIZE))
    }

    fn token(i: u8) -> Bytes {
        Bytes::from(vec![b'a' + i; MAX_HASH_SIZE])
    }

    fn get(hashes: &[Bytes]) -> Request {
        Request::new(Method::Get, "/", Version::Http11)
            .header("Content-Type", "text/html")
            .with_body(codec::encode_request(hashes))
    }

    #[test]
    fn test_resolves_batch() {
        let exchange = exchange();
        let hashes: Vec<Bytes> = (0..10).map(token).collect();

        let response = exchange.respond(&get(&hashes));
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.headers().get("content-type"), Some(OCTET_STREAM));

        let batch = codec::decode_response(response.body()).unwrap();
        assert_eq!(batch.len(), 10);
        for (pair, hash) in batch.iter().zip(&hashes) {
            assert_eq!(&pair.hash, hash);
            let id = exchange.directory().resolve_block_id(hash).unwrap();
            assert_eq!(exchange.directory().materialize_block(id), Some(pair.block.clone()));
        }
    }

    #[test]
    fn test_repeated_batch_is_identical() {
        let exchange = exchange();
        let hashes: Vec<Bytes> = (0..10).map(token).collect();

        let first = exchange.respond(&get(&hashes));
        let second = exchange.respond(&get(&hashes));
        assert_eq!(first.body(), second.body());
    }

    #[test]
    fn test_wrong_length_tokens_skipped() {
        let exchange = exchange();
        let hashes = vec![
            Bytes::from_static(b"too short"),
            token(1),
            Bytes::from(vec![b'x'; MAX_HASH_SIZE + 1]),
        ];

        let response = exchange.respond(&get(&hashes));
        assert_eq!(response.status(), Status::Ok);

        let batch = codec::decode_response(response.body()).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].hash, token(1));
        assert_eq!(exchange.directory().stats().tokens, 1);
    }

    #[test]
    fn test_empty_batch() {
        let response = exchange().respond(&get(&[]));
        assert_eq!(response.status(), Status::Ok);
        assert!(codec::decode_response(response.body()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body() {
        let exchange = exchange();
        let request = Request::new(Method::Get, "/", Version::Http11)
            .with_body(Bytes::from_static(b"\x0a\x05ab"));

        let response = exchange.respond(&request);
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(response.body(), b"Parse error");
        assert!(!response.need_eof());
        assert_eq!(exchange.directory().stats().tokens, 0);
    }

    #[test]
    fn test_other_methods_rejected() {
        let exchange = exchange();

        for method in [Method::Post, Method::Put, Method::Delete, Method::Other("X".into())] {
            let mut request = get(&[token(0)]);
            request.method = method;

            let response = exchange.respond(&request);
            assert_eq!(response.status(), Status::MethodNotAllowed);
            assert_eq!(response.body(), b"Invalid method");
        }

        // Rejected before the directory is consulted
        assert_eq!(exchange.directory().stats().tokens, 0);
    }

    #[test]
    fn test_head_omits_body() {
        let mut request = get(&[token(2)]);
        request.method = Method::Head;

        let response = exchange().respond(&request);
        assert_eq!(response.status(), Status::Ok);
        assert!(!response.body().is_empty());
        assert!(response.payload().is_empty());
    }

    #[test]
    fn test_version_and_persistence_follow_request() {
        let request = Request::new(Method::Get, "/", Version::Http10);
        let response = exchange().respond(&request);
        assert_eq!(response.version(), Version::Http10);
        assert!(response.need_eof());

        let request = Request::new(Method::Get, "/", Version::Http10).header("Connection", "keep-alive");
        assert!(!exchange().respond(&request).need_eof());
    }

    #[tokio::test]
    async fn test_dispatcher_emits_once() {
        let exchange = exchange();
        let (responder, pending) = Responder::channel();

        exchange.handle(get(&[token(3)]), responder);

        let response = pending.await.unwrap();
        assert!(!response.payload().is_empty());
    }
}
