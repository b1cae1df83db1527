//! Ticket code and gate secret issuance.
//!
//! A ticket carries two credentials:
//! - a short public `code`, printed on the ticket and unique across the store;
//! - a random gate secret handed to the holder once. Only its SHA-256 hash is
//!   kept on the ticket, and the hash is never serialized outward.
//!
//! Code uniqueness is enforced by the store's atomic claim; a collision makes
//! the issuer draw a new code instead of failing, up to a bounded number of
//! attempts.

use super::error::InventoryError;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Alphabet for public codes: upper-case letters and digits without the
/// easily confused `0`, `O`, `1` and `I`.
pub const CODE_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Source of candidate public codes.
pub trait CodeGenerator: Send + Sync {
    /// Produce the next candidate code. Candidates may collide.
    fn next_code(&self) -> String;
}

/// Random `PREFIX-XXXXXXXXXX` codes drawn from [`CODE_ALPHABET`].
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    prefix: String,
    length: usize,
}

impl RandomCodeGenerator {
    /// Generator producing `length` random symbols after `prefix-`.
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length: length.max(4),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new("TKT", 10)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> String {
        let mut code = String::with_capacity(self.prefix.len() + 1 + self.length);
        if !self.prefix.is_empty() {
            code.push_str(&self.prefix);
            code.push('-');
        }
        let mut remaining = self.length;
        while remaining > 0 {
            let random = Uuid::new_v4();
            for byte in random.as_bytes().iter().take(remaining) {
                code.push(CODE_ALPHABET[(*byte & 0x1f) as usize] as char);
            }
            remaining = remaining.saturating_sub(16);
        }
        code
    }
}

/// Credentials minted for one ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedCredentials {
    /// Public code, already claimed in the store
    pub code: String,
    /// Gate secret in clear, handed to the holder once
    pub secret: String,
    /// SHA-256 hex of the secret, stored on the ticket
    pub secret_hash: String,
}

/// Issues public codes, gate secrets and transfer tokens.
#[derive(Clone)]
pub struct TicketCodeIssuer {
    generator: Arc<dyn CodeGenerator>,
    max_attempts: u32,
}

impl std::fmt::Debug for TicketCodeIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketCodeIssuer")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl TicketCodeIssuer {
    /// Issuer drawing codes from `generator`, retrying collisions up to `max_attempts` times.
    pub fn new(generator: Arc<dyn CodeGenerator>, max_attempts: u32) -> Self {
        Self {
            generator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Mint a unique code plus a fresh secret.
    ///
    /// `claim` must atomically reserve the code and return `false` if it is
    /// already taken.
    ///
    /// # Errors
    /// [`InventoryError::CodeSpaceExhausted`] when every candidate collided.
    pub fn mint<F>(&self, mut claim: F) -> Result<MintedCredentials, InventoryError>
    where
        F: FnMut(&str) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.generator.next_code();
            if claim(&code) {
                let (secret, secret_hash) = Self::mint_secret();
                return Ok(MintedCredentials {
                    code,
                    secret,
                    secret_hash,
                });
            }
            debug!("Ticket code collision on attempt {}: {}", attempt, code);
        }
        Err(InventoryError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    /// A fresh gate secret and its hash.
    #[must_use]
    pub fn mint_secret() -> (String, String) {
        let secret = random_hex(2);
        let hash = hash_secret(&secret);
        (secret, hash)
    }

    /// A fresh opaque transfer token.
    #[must_use]
    pub fn mint_transfer_token() -> String {
        random_hex(1)
    }
}

impl Default for TicketCodeIssuer {
    fn default() -> Self {
        Self::new(Arc::new(RandomCodeGenerator::default()), 16)
    }
}

/// SHA-256 of a gate secret, lower-case hex.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    to_hex(hasher.finalize().iter())
}

/// Compare a presented secret with a stored hash without short-circuiting.
#[must_use]
pub fn secret_matches(stored_hash: &str, presented_secret: &str) -> bool {
    let presented = hash_secret(presented_secret);
    if presented.len() != stored_hash.len() {
        return false;
    }
    presented
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn random_hex(uuids: usize) -> String {
    let bytes: Vec<u8> = (0..uuids)
        .flat_map(|_| *Uuid::new_v4().as_bytes())
        .collect();
    to_hex(bytes.iter())
}

fn to_hex<'a>(bytes: impl Iterator<Item = &'a u8>) -> String {
    let mut out = String::with_capacity(64);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
