//! Opaque revision tokens.
//!
//! # Invariants
//! - Token format is `<generation>-<32 lowercase hex>`.
//! - `generation` starts at 1 for a fresh lineage and grows by one per write.
//! - The random suffix keeps tokens distinct across lineages of the same id.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

const SUFFIX_LEN: usize = 32;

/// Version token for one stored state of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    generation: u64,
    suffix: String,
}

impl Revision {
    /// Mints the first revision of a new lineage.
    pub fn initial() -> Self {
        Self::with_generation(1)
    }

    /// Mints the revision that follows `self`.
    pub fn next(&self) -> Self {
        Self::with_generation(self.generation.saturating_add(1))
    }

    /// Write counter within the current lineage.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            suffix: Uuid::new_v4().simple().to_string(),
        }
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.generation, self.suffix)
    }
}

/// Error returned when a revision token cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionParseError(pub String);

impl Display for RevisionParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed revision token `{}`", self.0)
    }
}

impl Error for RevisionParseError {}

impl FromStr for Revision {
    type Err = RevisionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || RevisionParseError(value.to_string());
        let (generation, suffix) = value.split_once('-').ok_or_else(invalid)?;
        let generation: u64 = generation.parse().map_err(|_| invalid())?;
        if generation == 0 {
            return Err(invalid());
        }
        let suffix_ok = suffix.len() == SUFFIX_LEN
            && suffix
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if !suffix_ok {
            return Err(invalid());
        }

        Ok(Self {
            generation,
            suffix: suffix.to_string(),
        })
    }
}

impl TryFrom<String> for Revision {
    type Error = RevisionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::Revision;

    #[test]
    fn next_advances_generation_and_changes_token() {
        let first = Revision::initial();
        let second = first.next();

        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn fresh_lineages_never_share_tokens() {
        assert_ne!(Revision::initial(), Revision::initial());
    }

    #[test]
    fn display_output_parses_back() {
        let rev = Revision::initial().next().next();
        let parsed: Revision = rev.to_string().parse().expect("token should parse");
        assert_eq!(parsed, rev);
        assert_eq!(parsed.generation(), 3);
    }

    #[test]
    fn parse_rejects_malformed_tokens() {
        for bad in [
            "",
            "1",
            "0-0123456789abcdef0123456789abcdef",
            "x-0123456789abcdef0123456789abcdef",
            "1-short",
            "1-0123456789ABCDEF0123456789ABCDEF",
        ] {
            assert!(bad.parse::<Revision>().is_err(), "`{bad}` should be rejected");
        }
    }
}
