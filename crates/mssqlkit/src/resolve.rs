//! Identity resolution across drop-and-recreate.
//!
//! The engine reassigns internal ids whenever an object is dropped and
//! recreated under the same name, and hands freed ids to unrelated objects.
//! Lookups therefore try the last-known id first, accept it only when the
//! row still carries the tracked name, and otherwise fall back to the name,
//! reporting the new id so callers can overwrite their stored reference.

use crate::catalog::{Lookup, Named};
use crate::error::Result;

/// Outcome of resolving a tracked entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Found under the id we already knew (or by name when no id was known)
    Current(T),
    /// Found by name only; the stored id is stale
    Healed { entity: T, stale_id: i32 },
    /// Neither id nor name matched anything
    Missing,
}

impl<T> Resolution<T> {
    /// The entity, whether current or healed.
    pub fn into_entity(self) -> Option<T> {
        match self {
            Self::Current(entity) | Self::Healed { entity, .. } => Some(entity),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Resolve an entity by last-known id, then by name.
///
/// `lookup` is the catalog read for the entity kind. Read-only. The name is
/// the durable key: an id now held by a differently named object is stale.
pub fn resolve<T: Named>(
    last_known_id: Option<i32>,
    name: &str,
    lookup: impl Fn(Lookup<'_>) -> Result<Option<T>>,
) -> Result<Resolution<T>> {
    if let Some(id) = last_known_id
        && let Some(entity) = lookup(Lookup::Id(id))?
    {
        if entity.name().eq_ignore_ascii_case(name) {
            return Ok(Resolution::Current(entity));
        }
        log::debug!("{name}: id {id} now belongs to '{}'", entity.name());
    }

    match lookup(Lookup::Name(name))? {
        Some(entity) => match last_known_id {
            Some(stale_id) => {
                log::info!("{name}: id {stale_id} is stale, re-resolved by name");
                Ok(Resolution::Healed { entity, stale_id })
            }
            None => Ok(Resolution::Current(entity)),
        },
        None => {
            log::debug!("{name}: not found by id or name");
            Ok(Resolution::Missing)
        }
    }
}
