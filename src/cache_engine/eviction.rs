//! Eviction step of the CacheEngine tick (§4.3, §4.3.1).

use crate::catalog::Catalog;

const EVICTION_BATCH: usize = 10;

/// Evicts oldest-viewed-first cache payloads until `cache_bytes_total() <= max_cache_bytes`,
/// or until there is nothing left to evict. Returns the number of photos evicted.
pub fn evict_over_budget(catalog: &Catalog, max_cache_bytes: u64) -> anyhow::Result<usize> {
    let mut evicted = 0;
    loop {
        if catalog.cache_bytes_total()? <= max_cache_bytes {
            break;
        }
        let batch = catalog.list_eviction_candidates(EVICTION_BATCH)?;
        if batch.is_empty() {
            break;
        }
        for photo in &batch {
            if catalog.cache_bytes_total()? <= max_cache_bytes {
                return Ok(evicted);
            }
            catalog.clear_cache(&photo.id)?;
            evicted += 1;
        }
    }
    Ok(evicted)
}
