//! In-memory content directory.
//!
//! Maps client tokens to pseudo-randomly assigned block ids and block ids to
//! lazily generated block bytes:
//! - token -> block id (invented on first sight, never changed)
//! - block id -> token
//! - token -> block size (invented on first sight, in `1..=max_block_size`)
//! - block id -> block bytes (generated on first read, then cached)
//!
//! All four tables live behind one mutex. Every operation runs its
//! check-and-insert under that lock, so concurrent first lookups of a token
//! agree on a single block id and a single block.

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, trace};

/// Exact length of a valid token.
pub const MAX_HASH_SIZE: usize = 128;

/// Default upper bound for an invented block size.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Directory-assigned block identifier.
pub type BlockId = u32;

/// A token paired with its materialized block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub id: BlockId,
    pub block: Bytes,
}

struct Tables {
    token_to_block: HashMap<Bytes, BlockId>,
    block_to_token: HashMap<BlockId, Bytes>,
    token_to_size: HashMap<Bytes, usize>,
    blocks: HashMap<BlockId, Bytes>,
    /// Tokens in order of first sight.
    tokens: Vec<Bytes>,
    rng: StdRng,
}

impl Tables {
    fn block_id(&mut self, token: &Bytes) -> BlockId {
        if let Some(&id) = self.token_to_block.get(token) {
            return id;
        }

        // Redraw on collision so the token <-> id mapping stays a bijection.
        let id = loop {
            let candidate: BlockId = self.rng.gen();
            if !self.block_to_token.contains_key(&candidate) {
                break candidate;
            }
            trace!(block_id = candidate, "Block id collision, redrawing");
        };

        self.tokens.push(token.clone());
        self.token_to_block.insert(token.clone(), id);
        self.block_to_token.insert(id, token.clone());
        trace!(block_id = id, "Assigned block id");
        id
    }

    fn block_size(&mut self, token: &Bytes, max_block_size: usize) -> usize {
        if let Some(&size) = self.token_to_size.get(token) {
            return size;
        }
        let size = self.rng.gen_range(1..=max_block_size);
        self.token_to_size.insert(token.clone(), size);
        size
    }

    fn block(&mut self, id: BlockId, max_block_size: usize) -> Option<Bytes> {
        if let Some(block) = self.blocks.get(&id) {
            return Some(block.clone());
        }

        let token = self.block_to_token.get(&id)?.clone();
        let size = self.block_size(&token, max_block_size);
        let block: Bytes = (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(size)
            .collect::<Vec<u8>>()
            .into();

        self.blocks.insert(id, block.clone());
        trace!(block_id = id, size, "Materialized block");
        Some(block)
    }
}

/// Process-wide memoizing token directory.
pub struct Directory {
    tables: Mutex<Tables>,
    max_block_size: usize,
}

impl Directory {
    /// Create a directory seeded from system entropy.
    pub fn new(max_block_size: usize) -> Arc<Self> {
        info!(max_block_size, "Initializing content directory");
        Arc::new(Self::with_rng(max_block_size, StdRng::from_entropy()))
    }

    /// Create a directory with reproducible ids, sizes and blocks.
    pub fn with_seed(max_block_size: usize, seed: u64) -> Arc<Self> {
        Arc::new(Self::with_rng(max_block_size, StdRng::seed_from_u64(seed)))
    }

    fn with_rng(max_block_size: usize, rng: StdRng) -> Self {
        Self {
            tables: Mutex::new(Tables {
                token_to_block: HashMap::new(),
                block_to_token: HashMap::new(),
                token_to_size: HashMap::new(),
                blocks: HashMap::new(),
                tokens: Vec::new(),
                rng,
            }),
            max_block_size: max_block_size.max(1),
        }
    }

    /// The tables stay consistent even if a holder panicked, so a
    /// poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_valid_token(token: &[u8]) -> bool {
        token.len() == MAX_HASH_SIZE
    }

    /// Block id of `token`, invented on first sight.
    ///
    /// Returns `None` for tokens that are not exactly `MAX_HASH_SIZE` bytes.
    pub fn resolve_block_id(&self, token: &Bytes) -> Option<BlockId> {
        if !Self::is_valid_token(token) {
            return None;
        }
        Some(self.lock().block_id(token))
    }

    /// Block size of `token`, invented on first sight.
    pub fn resolve_block_size(&self, token: &Bytes) -> Option<usize> {
        if !Self::is_valid_token(token) {
            return None;
        }
        Some(self.lock().block_size(token, self.max_block_size))
    }

    /// Bytes of block `id`, generated on first read.
    ///
    /// Returns `None` when no token has been assigned `id`.
    pub fn materialize_block(&self, id: BlockId) -> Option<Bytes> {
        self.lock().block(id, self.max_block_size)
    }

    /// Id and block of `token` under a single lock acquisition.
    pub fn resolve(&self, token: &Bytes) -> Option<ResolvedBlock> {
        if !Self::is_valid_token(token) {
            return None;
        }
        let mut tables = self.lock();
        let id = tables.block_id(token);
        let block = tables.block(id, self.max_block_size)?;
        Some(ResolvedBlock { id, block })
    }

    /// Token assigned block `id`, if any.
    pub fn token_of(&self, id: BlockId) -> Option<Bytes> {
        self.lock().block_to_token.get(&id).cloned()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn stats(&self) -> DirectoryStats {
        let tables = self.lock();
        DirectoryStats {
            tokens: tables.tokens.len(),
            blocks: tables.blocks.len(),
            block_bytes: tables.blocks.values().map(Bytes::len).sum(),
        }
    }
}

/// Directory statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Distinct valid tokens seen.
    pub tokens: usize,
    /// Blocks materialized so far.
    pub blocks: usize,
    pub block_bytes: usize,
}
