//! Streaming SHA-1 content hashing
//!
//! Wraps the SHA-1 block compression function with the buffering and
//! padding needed to digest a byte stream of any length.

use serde::{Deserialize, Serialize};
use sha1::compress;
use sha1::digest::generic_array::GenericArray;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use thiserror::Error;

const BLOCK_LEN: usize = 64;
const LENGTH_OFFSET: usize = BLOCK_LEN - 8;
const READ_BUFFER_SIZE: usize = 1024 * 1024; // 1MB

const INITIAL_STATE: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

/// A 160-bit content digest
///
/// Rendered as 40 lowercase hex characters (five big-endian 32-bit words).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    /// Length of the hex rendering
    pub const HEX_LEN: usize = 40;

    pub fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_words(words: [u32; 5]) -> Self {
        let mut bytes = [0u8; 20];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Self(bytes)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid content hash {0:?}: expected 40 lowercase hex characters")]
pub struct ParseHashError(pub String);

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // hex::decode accepts uppercase; manifests only ever carry lowercase
        let well_formed = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ParseHashError(s.to_string()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseHashError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ParseHashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Incremental SHA-1 computation
///
/// An engine only exists once started, and `finish` consumes it, so a digest
/// can never be taken from an engine that was not reset first.
#[derive(Clone)]
pub struct Sha1Stream {
    state: [u32; 5],
    block: [u8; BLOCK_LEN],
    /// Number of valid bytes in `block`, always < 64
    index: usize,
    /// Bytes passed to `process` since `start`
    total: u64,
}

impl Sha1Stream {
    /// Start a fresh computation
    pub fn start() -> Self {
        Self {
            state: INITIAL_STATE,
            block: [0; BLOCK_LEN],
            index: 0,
            total: 0,
        }
    }

    /// Feed more input
    pub fn process(&mut self, mut data: &[u8]) {
        self.total = self.total.wrapping_add(data.len() as u64);

        if self.index > 0 {
            let take = (BLOCK_LEN - self.index).min(data.len());
            self.block[self.index..self.index + take].copy_from_slice(&data[..take]);
            self.index += take;
            data = &data[take..];

            if self.index < BLOCK_LEN {
                return;
            }
            compress_block(&mut self.state, &self.block);
            self.index = 0;
        }

        // Whole blocks go straight from the input to the compressor
        let mut chunks = data.chunks_exact(BLOCK_LEN);
        for chunk in chunks.by_ref() {
            compress_block(&mut self.state, chunk);
        }

        let rest = chunks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.index = rest.len();
    }

    /// Pad, compress the final block(s) and return the digest
    pub fn finish(mut self) -> ContentHash {
        let bit_len = self.total.wrapping_mul(8);

        self.block[self.index] = 0x80;
        self.index += 1;

        if self.index > LENGTH_OFFSET {
            self.block[self.index..].fill(0);
            compress_block(&mut self.state, &self.block);
            self.block = [0; BLOCK_LEN];
        } else {
            self.block[self.index..LENGTH_OFFSET].fill(0);
        }

        self.block[LENGTH_OFFSET..].copy_from_slice(&bit_len.to_be_bytes());
        compress_block(&mut self.state, &self.block);

        ContentHash::from_words(self.state)
    }
}

/// Run the compression function over one 64-byte block
fn compress_block(state: &mut [u32; 5], block: &[u8]) {
    compress(state, std::slice::from_ref(GenericArray::from_slice(block)));
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let mut engine = Sha1Stream::start();
    engine.process(data);
    engine.finish()
}

/// Hash everything a reader yields until EOF
pub fn hash_reader<R: Read>(reader: R) -> io::Result<ContentHash> {
    hash_reader_with(reader, &mut Vec::new())
}

/// Like [`hash_reader`], reading through a caller-owned buffer
///
/// An empty buffer is grown to 1 MiB on first use and can then be reused
/// for any number of files.
pub fn hash_reader_with<R: Read>(mut reader: R, buffer: &mut Vec<u8>) -> io::Result<ContentHash> {
    if buffer.is_empty() {
        buffer.resize(READ_BUFFER_SIZE, 0);
    }
    let mut engine = Sha1Stream::start();

    loop {
        let bytes_read = match reader.read(buffer.as_mut_slice()) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        engine.process(&buffer[..bytes_read]);
    }

    Ok(engine.finish())
}
