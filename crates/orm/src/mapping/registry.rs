//! Process-wide mapping cache
//!
//! Extraction is pure given the type's descriptor, so concurrent first
//! access from multiple threads may race; whichever insert lands first
//! wins and later callers observe that one. A mapping is fully built
//! before it is inserted, so a half-built mapping is never visible.

use std::any::TypeId;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::entity::Entity;
use crate::error::OrmResult;
use crate::mapping::EntityMapping;

static MAPPINGS: Lazy<DashMap<TypeId, &'static EntityMapping>> = Lazy::new(DashMap::new);

/// Extract-or-recall the mapping for a mapped type.
///
/// The first successful call per type validates the descriptor and
/// caches the result for the process lifetime; there is no
/// invalidation. Extraction failures are not cached, so a broken
/// descriptor fails on every access.
pub fn mapping_of<T: Entity>() -> OrmResult<&'static EntityMapping> {
    let key = TypeId::of::<T>();
    if let Some(existing) = MAPPINGS.get(&key) {
        return Ok(*existing);
    }

    let extracted = T::descriptor().extract()?;
    tracing::debug!(
        collection = %extracted.collection,
        columns = extracted.columns.len(),
        relations = extracted.relations.len(),
        "extracted entity mapping"
    );
    let leaked: &'static EntityMapping = Box::leak(Box::new(extracted));
    let entry = *MAPPINGS.entry(key).or_insert(leaked);
    Ok(entry)
}
