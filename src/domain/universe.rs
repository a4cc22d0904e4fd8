//! Universe of securities for bulk reads.
//!
//! Parses comma-separated security id lists into an ordered, duplicate-free
//! [`Universe`].

use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    pub security_ids: Vec<i64>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.security_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.security_ids.is_empty()
    }
}

impl FromStr for Universe {
    type Err = UniverseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Universe {
            security_ids: parse_security_ids(s)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in security list")]
    EmptyToken,

    #[error("invalid security id: {0}")]
    InvalidId(String),

    #[error("duplicate security id: {0}")]
    DuplicateId(i64),
}

pub fn parse_security_ids(input: &str) -> Result<Vec<i64>, UniverseError> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let id: i64 = trimmed
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| UniverseError::InvalidId(trimmed.to_string()))?;
        if !seen.insert(id) {
            return Err(UniverseError::DuplicateId(id));
        }
        ids.push(id);
    }

    Ok(ids)
}
