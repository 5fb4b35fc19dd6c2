//! ShareCode: the 8-digit decimal identifier handed out for every artifact.
//!
//! Codes live in `[10000000, 99999999]`, so they are always exactly eight
//! ASCII digits and never start with `0`. That leaves 90 million values,
//! enough that a random pick rarely lands on a code already in use; the
//! store still checks, see [`crate::store::FileStore`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest code value (inclusive).
pub const MIN_CODE: u32 = 10_000_000;

/// Largest code value (inclusive).
pub const MAX_CODE: u32 = 99_999_999;

/// Number of digits in every code.
pub const CODE_LEN: usize = 8;

/// A share code - 8 ASCII digits, first digit non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareCode(String);

/// Errors that can occur when parsing a share code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("invalid code length: expected 8 digits, got {0}")]
    InvalidLength(usize),

    #[error("invalid character in code, only ASCII digits are allowed")]
    InvalidDigit,

    #[error("code must not start with 0")]
    LeadingZero,
}

impl ShareCode {
    /// Build a code from its numeric value.
    ///
    /// Returns `None` when the value is outside `[MIN_CODE, MAX_CODE]`.
    pub fn from_value(value: u32) -> Option<Self> {
        (MIN_CODE..=MAX_CODE)
            .contains(&value)
            .then(|| Self(value.to_string()))
    }

    /// Parse and validate a code string.
    pub fn from_str_checked(s: &str) -> Result<Self, CodeError> {
        if s.len() != CODE_LEN {
            return Err(CodeError::InvalidLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeError::InvalidDigit);
        }
        if s.starts_with('0') {
            return Err(CodeError::LeadingZero);
        }
        Ok(Self(s.to_string()))
    }

    /// Numeric value of the code.
    pub fn value(&self) -> u32 {
        // Validated on construction, eight digits always fit.
        self.0.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShareCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl TryFrom<String> for ShareCode {
    type Error = CodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str_checked(&s)
    }
}

impl From<ShareCode> for String {
    fn from(code: ShareCode) -> Self {
        code.0
    }
}

impl AsRef<str> for ShareCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh share codes.
///
/// Implementations only need to produce well-formed codes; uniqueness is the
/// store's job. `Send + Sync` so one generator can serve every request.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> ShareCode;
}

/// Uniform random codes from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ShareCode {
        let value = rand::thread_rng().gen_range(MIN_CODE..=MAX_CODE);
        ShareCode(value.to_string())
    }
}
