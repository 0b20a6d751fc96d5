//! Per-part encryption
//!
//! Every part is encrypted on its own under the session key with a fresh
//! random IV, so parts can be decrypted independently:
//!
//! - `cbc`: `IV(16) || AES-256-CBC(PKCS#7(chunk))`. Each part is padded, so a
//!   16-byte aligned chunk still grows by one block.
//! - `gcm`: `nonce(12) || AES-256-GCM(chunk) || tag(16)`, with the part
//!   number as associated data. No padding, and swapped or altered parts
//!   fail to decrypt.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize, Serializer};

use super::types::UploadError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const BLOCK_LEN: usize = 16;
pub const CBC_IV_LEN: usize = 16;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

// ============================================================================
// Session Key
// ============================================================================

/// 256-bit key generated once per upload and shared by all of its parts
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Fresh key from the OS random source
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::KeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// ============================================================================
// Cipher Mode
// ============================================================================

/// Part encryption scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    #[default]
    Cbc,
    Gcm,
}

impl CipherMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cbc => "cbc",
            Self::Gcm => "gcm",
        }
    }

    /// Size of the uploaded part for a chunk of `plaintext_len` bytes
    pub fn part_len(self, plaintext_len: usize) -> usize {
        match self {
            Self::Cbc => CBC_IV_LEN + (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN,
            Self::Gcm => GCM_NONCE_LEN + plaintext_len + GCM_TAG_LEN,
        }
    }
}

impl FromStr for CipherMode {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbc" | "aes-256-cbc" => Ok(Self::Cbc),
            "gcm" | "aes-256-gcm" => Ok(Self::Gcm),
            other => Err(CipherError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Session key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("Unknown cipher mode: {0}")]
    UnknownMode(String),

    #[error("Part {part} is too short to decrypt ({len} bytes)")]
    Truncated { part: usize, len: usize },

    #[error("Part {0} has invalid padding")]
    Padding(usize),

    #[error("Part {0} failed authentication")]
    Authentication(usize),

    #[error("Failed to encrypt part {0}")]
    Encrypt(usize),
}

impl From<CipherError> for UploadError {
    fn from(err: CipherError) -> Self {
        UploadError::Cipher(err.to_string())
    }
}

// ============================================================================
// Part Cipher
// ============================================================================

/// Encrypts and decrypts the parts of one upload session
#[derive(Clone)]
pub struct PartCipher {
    key: SessionKey,
    mode: CipherMode,
}

impl PartCipher {
    pub fn new(key: SessionKey, mode: CipherMode) -> Self {
        Self { key, mode }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Encrypt one chunk into the payload uploaded as part `part_number`
    pub fn encrypt_part(&self, part_number: usize, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = *self.key.as_bytes();

        match self.mode {
            CipherMode::Cbc => {
                let mut iv = [0u8; CBC_IV_LEN];
                OsRng.fill_bytes(&mut iv);

                let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

                let mut part = Vec::with_capacity(CBC_IV_LEN + ciphertext.len());
                part.extend_from_slice(&iv);
                part.extend_from_slice(&ciphertext);
                Ok(part)
            }
            CipherMode::Gcm => {
                let mut nonce = [0u8; GCM_NONCE_LEN];
                OsRng.fill_bytes(&mut nonce);
                let aad = part_aad(part_number);

                let ciphertext = Aes256Gcm::new(&key.into())
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: plaintext,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| CipherError::Encrypt(part_number))?;

                let mut part = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
                part.extend_from_slice(&nonce);
                part.extend_from_slice(&ciphertext);
                Ok(part)
            }
        }
    }

    /// Recover the chunk stored as part `part_number`
    pub fn decrypt_part(&self, part_number: usize, payload: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = *self.key.as_bytes();
        let truncated = || CipherError::Truncated {
            part: part_number,
            len: payload.len(),
        };

        match self.mode {
            CipherMode::Cbc => {
                if payload.len() < CBC_IV_LEN + BLOCK_LEN
                    || (payload.len() - CBC_IV_LEN) % BLOCK_LEN != 0
                {
                    return Err(truncated());
                }
                let (iv, body) = payload.split_at(CBC_IV_LEN);
                let iv: [u8; CBC_IV_LEN] = iv.try_into().map_err(|_| truncated())?;

                Aes256CbcDec::new(&key.into(), &iv.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(body)
                    .map_err(|_| CipherError::Padding(part_number))
            }
            CipherMode::Gcm => {
                if payload.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
                    return Err(truncated());
                }
                let (nonce, body) = payload.split_at(GCM_NONCE_LEN);
                let aad = part_aad(part_number);

                Aes256Gcm::new(&key.into())
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: body,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| CipherError::Authentication(part_number))
            }
        }
    }

    /// Decrypt parts given in ascending part order and join the plaintext
    pub fn decrypt_parts<P: AsRef<[u8]>>(&self, parts: &[P]) -> Result<Vec<u8>, CipherError> {
        let mut plaintext = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            plaintext.extend(self.decrypt_part(index + 1, part.as_ref())?);
        }
        Ok(plaintext)
    }
}

fn part_aad(part_number: usize) -> [u8; 8] {
    (part_number as u64).to_be_bytes()
}
