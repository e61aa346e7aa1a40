//! Payload codecs used by the pack provider.
//!
//! Compression is per archive (every payload uses the same [`Compression`]),
//! but a payload that does not shrink is stored raw, so readers tell the two
//! apart by comparing stored and decoded sizes. Encryption is AES-256-CBC
//! with PKCS#7 padding; each encrypted blob carries its own random IV as a
//! 16-byte prefix.

use std::io::{Read, Write};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::error::{VfsError, VfsResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

/// Deflate cannot expand input by more than this factor.
const MAX_DEFLATE_RATIO: usize = 1032;
/// Nor can an LZ4 block.
const MAX_LZ4_RATIO: usize = 255;

/// Salt length for password-derived keys.
pub const SALT_LEN: usize = 16;

/// Payload compression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Stored raw.
    #[default]
    None,
    /// zlib deflate stream (`flate2`).
    Deflate,
    /// LZ4 block (`lz4_flex`).
    Lz4,
}

impl Compression {
    /// On-disk tag byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Deflate => 1,
            Compression::Lz4 => 2,
        }
    }

    /// Parse an on-disk tag byte.
    pub fn from_byte(value: u8) -> VfsResult<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Deflate),
            2 => Ok(Compression::Lz4),
            other => Err(VfsError::corrupt(format!("unknown compression type {other}"))),
        }
    }

    /// Compress `data`. `level` only matters for deflate (0-9).
    pub fn compress(self, data: &[u8], level: u32) -> VfsResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Compression::Lz4 => Ok(lz4_flex::block::compress(data)),
        }
    }

    /// Decompress `data` whose decoded length is `size`.
    ///
    /// `size` comes from an index and is not trusted: it never drives an
    /// allocation larger than `data` could legally expand to.
    pub fn decompress(self, data: &[u8], size: usize) -> VfsResult<Vec<u8>> {
        let out = match self {
            Compression::None => data.to_vec(),
            Compression::Deflate => {
                let hint = size.min(data.len().saturating_mul(MAX_DEFLATE_RATIO));
                let mut out = Vec::with_capacity(hint);
                DeflateDecoder::new(data)
                    .take((size as u64).saturating_add(1))
                    .read_to_end(&mut out)?;
                out
            }
            Compression::Lz4 => {
                if size > data.len().saturating_mul(MAX_LZ4_RATIO) {
                    return Err(VfsError::codec(format!(
                        "lz4: {} bytes cannot expand to {size}",
                        data.len()
                    )));
                }
                lz4_flex::block::decompress(data, size)
                    .map_err(|e| VfsError::codec(format!("lz4: {e}")))?
            }
        };
        if out.len() != size {
            return Err(VfsError::codec(format!(
                "decoded {} bytes, expected {size}",
                out.len()
            )));
        }
        Ok(out)
    }
}

/// AES-256-CBC cipher keyed from a password.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("key", &"<redacted>").finish()
    }
}

impl Cipher {
    /// Derive the key as SHA-256(salt || password).
    pub fn from_password(password: &str, salt: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// A fresh random salt.
    pub fn random_salt() -> [u8; SALT_LEN] {
        rand::random()
    }

    /// Encrypt to `iv || ciphertext`.
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain);
        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypt an `iv || ciphertext` blob.
    pub fn decrypt(&self, blob: &[u8]) -> VfsResult<Vec<u8>> {
        if blob.len() < IV_LEN * 2 {
            return Err(VfsError::codec("encrypted blob too short"));
        }
        let (iv, ciphertext) = blob.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| VfsError::codec("bad IV length"))?;
        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| VfsError::codec("decryption failed"))
    }
}
