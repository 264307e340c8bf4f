//! GUID to native SID conversion.
//!
//! External principals are identified by a directory GUID. The engine
//! stores them as a 16-byte SID whose first three groups are
//! little-endian, which is exactly the Windows `GUID` memory layout.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Binary security identifier for an externally authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid([u8; 16]);

impl Sid {
    /// Encode a GUID (with or without hyphens) as a SID.
    pub fn from_guid(guid: &str) -> Result<Self> {
        let compact: String = guid.chars().filter(|c| *c != '-').collect();
        if compact.len() != 32 {
            return Err(Error::InvalidIdentifierFormat {
                value: guid.to_string(),
                reason: format!("expected 32 hex digits, got {}", compact.len()),
            });
        }

        let uuid = Uuid::try_parse(&compact).map_err(|e| Error::InvalidIdentifierFormat {
            value: guid.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(uuid.to_bytes_le()))
    }

    /// Raw SID bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_guid(s)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
