//! Code Generator: short, globally unique registration codes.
//!
//! Codes are drawn from an alphabet without look-alike characters
//! (`0/O`, `1/I`) so they survive being read aloud or typed from a badge.
//! Each draw is checked against the store. Collisions are retried; every
//! few collisions the code grows by one character, and generation gives up
//! with [`CheckInError::CodeSpaceExhausted`] after a bounded number of
//! attempts instead of looping forever.

use rand::Rng;
use std::future::Future;

use crate::error::{CheckInError, Result};
use crate::types::RegistrationCode;

/// Characters used in generated codes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Anything that can answer "is this code taken, in any workshop?".
///
/// Implemented by every unit of work so the check happens inside the same
/// transaction as the insert that follows it.
pub trait CodeRegistry: Send {
    /// Whether any registration already holds `code`.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn code_exists(
        &mut self,
        code: &RegistrationCode,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Code generator configuration.
///
/// # Default Values
///
/// - `length`: 8
/// - `max_attempts`: 32
/// - `widen_every`: 4 (one extra character after every 4 collisions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeGenerator {
    /// Initial code length
    pub length: usize,
    /// Maximum number of draws before giving up
    pub max_attempts: u32,
    /// Collisions tolerated before the length grows by one
    pub widen_every: u32,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            length: 8,
            max_attempts: 32,
            widen_every: 4,
        }
    }
}

impl CodeGenerator {
    /// Create a generator with the given initial length and attempt budget.
    #[must_use]
    pub const fn new(length: usize, max_attempts: u32) -> Self {
        Self {
            length,
            max_attempts,
            widen_every: 4,
        }
    }

    /// Length used for the given zero-based attempt.
    #[must_use]
    pub const fn length_for_attempt(&self, attempt: u32) -> usize {
        let widen_every = if self.widen_every == 0 { 1 } else { self.widen_every };
        self.length + (attempt / widen_every) as usize
    }

    /// Draw one random candidate of the given length.
    #[must_use]
    pub fn draw(length: usize) -> RegistrationCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        RegistrationCode::new(&code)
    }

    /// Generate a code that `registry` reports as unused.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::CodeSpaceExhausted`] after `max_attempts` collisions
    /// - Any error reported by the registry
    pub async fn generate_unique<R: CodeRegistry>(&self, registry: &mut R) -> Result<RegistrationCode> {
        for attempt in 0..self.max_attempts {
            let candidate = Self::draw(self.length_for_attempt(attempt));
            if !registry.code_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(CheckInError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}
