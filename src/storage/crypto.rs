//! Segmented AES-256-GCM with HKDF-SHA256 per-file keys.
//!
//! Layout: `header || segment_0 || segment_1 || ...` where the header is
//! `[header_len: u8][salt: 32][nonce_prefix: 7]` and every ciphertext segment
//! is 4096 bytes (the first one shortened by the header) except the last.
//! Segment nonces are `nonce_prefix || index (u32 BE) || last_flag`, so
//! truncating, reordering or splicing segments fails authentication.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::common::{AttendanceError, Result};

pub const KEY_LEN: usize = 32;
pub const SEGMENT_SIZE: usize = 4096;

const SALT_LEN: usize = 32;
const NONCE_PREFIX_LEN: usize = 7;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_PREFIX_LEN;

const SEGMENT_PLAINTEXT: usize = SEGMENT_SIZE - TAG_LEN;
const FIRST_SEGMENT_PLAINTEXT: usize = SEGMENT_PLAINTEXT - HEADER_LEN;
const FIRST_SEGMENT_CIPHERTEXT: usize = SEGMENT_SIZE - HEADER_LEN;

/// Master key handed out by a key store.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

fn derive_file_cipher(master: &MasterKey, salt: &[u8], associated_data: &[u8]) -> Result<Aes256Gcm> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master.expose());
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(associated_data, &mut okm[..])
        .map_err(|e| AttendanceError::Crypto(format!("Key derivation failed: {}", e)))?;

    Aes256Gcm::new_from_slice(&okm[..])
        .map_err(|e| AttendanceError::Crypto(e.to_string()))
}

fn segment_nonce(prefix: &[u8], index: usize, last: bool) -> Result<[u8; NONCE_LEN]> {
    let index = u32::try_from(index)
        .map_err(|_| AttendanceError::Crypto("Too many segments".into()))?;

    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_LEN - 1].copy_from_slice(&index.to_be_bytes());
    nonce[NONCE_LEN - 1] = u8::from(last);
    Ok(nonce)
}

fn split_segments(data: &[u8], first: usize, rest: usize) -> Vec<&[u8]> {
    let (head, mut tail) = data.split_at(data.len().min(first));
    let mut segments = vec![head];
    while !tail.is_empty() {
        let (segment, remaining) = tail.split_at(tail.len().min(rest));
        segments.push(segment);
        tail = remaining;
    }
    segments
}

/// Encrypts `plaintext`; `associated_data` is bound into the file key and
/// must be presented again to decrypt.
pub fn encrypt(master: &MasterKey, associated_data: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut prefix = [0u8; NONCE_PREFIX_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut prefix);

    let cipher = derive_file_cipher(master, &salt, associated_data)?;
    let segments = split_segments(plaintext, FIRST_SEGMENT_PLAINTEXT, SEGMENT_PLAINTEXT);

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + segments.len() * TAG_LEN);
    out.push(HEADER_LEN as u8);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&prefix);

    let last_index = segments.len() - 1;
    for (index, segment) in segments.into_iter().enumerate() {
        let nonce = segment_nonce(&prefix, index, index == last_index)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), segment)
            .map_err(|e| AttendanceError::Crypto(format!("Encryption failed: {}", e)))?;
        out.extend_from_slice(&ciphertext);
    }

    Ok(out)
}

pub fn decrypt(master: &MasterKey, associated_data: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < HEADER_LEN + TAG_LEN {
        return Err(AttendanceError::Crypto("Ciphertext too short".into()));
    }
    if data[0] as usize != HEADER_LEN {
        return Err(AttendanceError::Crypto(format!(
            "Unsupported header length {}", data[0]
        )));
    }

    let salt = &data[1..1 + SALT_LEN];
    let prefix = &data[1 + SALT_LEN..HEADER_LEN];
    let body = &data[HEADER_LEN..];

    let cipher = derive_file_cipher(master, salt, associated_data)?;
    let segments = split_segments(body, FIRST_SEGMENT_CIPHERTEXT, SEGMENT_SIZE);

    let mut plaintext = Zeroizing::new(Vec::with_capacity(body.len()));
    let last_index = segments.len() - 1;
    for (index, segment) in segments.into_iter().enumerate() {
        if segment.len() < TAG_LEN {
            return Err(AttendanceError::Crypto("Truncated segment".into()));
        }
        let nonce = segment_nonce(prefix, index, index == last_index)?;
        let mut decrypted = cipher
            .decrypt(Nonce::from_slice(&nonce), segment)
            .map_err(|_| AttendanceError::Crypto("Authentication failed".into()))?;
        plaintext.extend_from_slice(&decrypted);
        decrypted.zeroize();
    }

    Ok(plaintext)
}
