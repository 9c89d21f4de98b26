//! Symmetric encryption for values embedded in links (password reset email).
//!
//! Output layout is `base64url(IV || AES-CFB(plaintext))` with a fresh random
//! IV per call. CFB carries no integrity tag: a ciphertext decrypted with the
//! wrong key, or altered in transit, yields garbage rather than an error. The
//! surrounding signed link is what detects tampering.

use aes::{Aes128, Aes192, Aes256};
use base64ct::{Base64Url, Encoding};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// AES block size; also the IV length.
pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("invalid AES key length {0}; expected 16, 24 or 32 bytes")]
    CipherInit(usize),
    #[error("input data is too small")]
    InputTooShort,
    #[error("malformed ciphertext: {0}")]
    Decode(String),
    #[error("failed to generate IV")]
    Entropy(#[source] rand::Error),
}

/// AES-CFB encryptor keyed with the server secret.
#[derive(Clone)]
pub struct Encryptor {
    key: Vec<u8>,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Returns true when `len` selects one of AES-128/192/256.
#[must_use]
pub const fn is_valid_key_length(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

impl Encryptor {
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Encrypt `plaintext` and return the URL-safe base64 text.
    ///
    /// # Errors
    /// `CipherInit` for a key of the wrong length, `Entropy` if the OS RNG fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        if !is_valid_key_length(self.key.len()) {
            return Err(EncryptionError::CipherInit(self.key.len()));
        }

        let mut buf = vec![0u8; BLOCK_SIZE + plaintext.len()];
        let (iv, body) = buf.split_at_mut(BLOCK_SIZE);
        OsRng.try_fill_bytes(iv).map_err(EncryptionError::Entropy)?;
        body.copy_from_slice(plaintext.as_bytes());

        apply_cfb(&self.key, iv, body, Direction::Encrypt)?;

        Ok(Base64Url::encode_string(&buf))
    }

    /// Decrypt text produced by [`Encryptor::encrypt`].
    ///
    /// # Errors
    /// `Decode` for invalid base64, `CipherInit` for a bad key and
    /// `InputTooShort` when the payload is not longer than one block.
    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptionError> {
        let mut data = Base64Url::decode_vec(encoded)
            .map_err(|err| EncryptionError::Decode(err.to_string()))?;

        if !is_valid_key_length(self.key.len()) {
            return Err(EncryptionError::CipherInit(self.key.len()));
        }

        if data.len() <= BLOCK_SIZE {
            return Err(EncryptionError::InputTooShort);
        }

        let (iv, body) = data.split_at_mut(BLOCK_SIZE);
        apply_cfb(&self.key, iv, body, Direction::Decrypt)?;

        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

macro_rules! cfb {
    ($cipher:ty, $key:expr, $iv:expr, $buf:expr, $direction:expr) => {
        match $direction {
            Direction::Encrypt => cfb_mode::Encryptor::<$cipher>::new_from_slices($key, $iv)
                .map_err(|_| EncryptionError::CipherInit($key.len()))?
                .encrypt($buf),
            Direction::Decrypt => cfb_mode::Decryptor::<$cipher>::new_from_slices($key, $iv)
                .map_err(|_| EncryptionError::CipherInit($key.len()))?
                .decrypt($buf),
        }
    };
}

fn apply_cfb(
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
    direction: Direction,
) -> Result<(), EncryptionError> {
    match key.len() {
        16 => cfb!(Aes128, key, iv, buf, direction),
        24 => cfb!(Aes192, key, iv, buf, direction),
        32 => cfb!(Aes256, key, iv, buf, direction),
        len => return Err(EncryptionError::CipherInit(len)),
    }
    Ok(())
}
