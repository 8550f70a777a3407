//! # Warden Cache - Access Decision Cache
//!
//! Process-wide cache of ALLOWED/DENIED decisions. Invalidation is
//! coarse: any permission mutation or node move clears everything.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use warden_const::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECONDS};
use warden_types::{AccessStatus, AclId, Authorities, NodeRef, PermissionReference, QName};

/// Which evaluation produced a cached decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
    /// Full façade decision
    HasPermission,
    /// Single-permission test at one node, walking ancestors
    SinglePermission,
    /// Single-permission test satisfied by a global entry
    SinglePermissionGlobal,
}

/// What a decision was made about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTarget {
    Node(NodeRef),
    /// A list checked in a context; the type and aspects decide which
    /// permissions apply and what they require
    Acl {
        acl: AclId,
        store_acl: Option<AclId>,
        type_qname: QName,
        aspects: BTreeSet<QName>,
    },
}

/// Cache key for access decisions
///
/// Authorities are held in an ordered set so that two keys built from the
/// same authorities in a different order are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessCacheKey {
    pub authorities: Authorities,
    pub target: CacheTarget,
    pub permission: PermissionReference,
    pub kind: CacheKind,
}

impl AccessCacheKey {
    pub fn new(
        authorities: Authorities,
        target: CacheTarget,
        permission: PermissionReference,
        kind: CacheKind,
    ) -> Self {
        Self {
            authorities,
            target,
            permission,
            kind,
        }
    }

    pub fn for_node(
        authorities: &Authorities,
        node: &NodeRef,
        permission: &PermissionReference,
        kind: CacheKind,
    ) -> Self {
        Self::new(
            authorities.clone(),
            CacheTarget::Node(node.clone()),
            permission.clone(),
            kind,
        )
    }
}

/// Thread-safe decision cache with hit/miss accounting
pub struct AccessCache {
    decisions: Cache<AccessCacheKey, AccessStatus>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl AccessCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let decisions = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            decisions,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Get a cached decision
    pub fn get(&self, key: &AccessCacheKey) -> Option<AccessStatus> {
        let result = self.decisions.get(key);
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Cache a decision. Concurrent writers of one key store the same value.
    pub fn put(&self, key: AccessCacheKey, status: AccessStatus) {
        self.decisions.insert(key, status);
    }

    /// Drop every cached decision
    pub fn invalidate_all(&self) {
        self.decisions.invalidate_all();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            (hits as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entry_count: self.decisions.entry_count(),
            hits,
            misses,
            hit_rate,
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl Default for AccessCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_CACHE_CAPACITY,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Approximate; moka applies pending maintenance lazily
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub invalidations: u64,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use warden_types::{PermissionKey, QName, StoreRef};

    use super::*;

    fn node() -> NodeRef {
        NodeRef::new(StoreRef::new("workspace", "SpacesStore"), "readme")
    }

    fn read() -> PermissionReference {
        PermissionReference::from_key(PermissionKey {
            qname: QName::new("sys", "base"),
            name: "Read".to_string(),
        })
    }

    fn auths(names: &[&str]) -> Authorities {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn key(names: &[&str]) -> AccessCacheKey {
        AccessCacheKey::for_node(&auths(names), &node(), &read(), CacheKind::HasPermission)
    }

    #[test]
    fn test_cache_operations() {
        let cache = AccessCache::default();
        let key = key(&["alice", "GROUP_EVERYONE"]);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), AccessStatus::Allowed);
        assert_eq!(cache.get(&key), Some(AccessStatus::Allowed));
    }

    #[test]
    fn test_cache_hit_miss_tracking() {
        let cache = AccessCache::new(100, Duration::from_secs(60));
        let key1 = key(&["alice"]);
        let key2 = key(&["bob"]);

        // First access - miss
        assert!(cache.get(&key1).is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.0);

        cache.put(key1.clone(), AccessStatus::Denied);

        // Second access - hit
        assert_eq!(cache.get(&key1), Some(AccessStatus::Denied));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.hit_rate, 50.0);

        // Different key - miss
        assert!(cache.get(&key2).is_none());
        assert_eq!(cache.stats().misses, 2);

        cache.reset_stats();
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_kind_separates_entries() {
        let cache = AccessCache::default();
        let single = AccessCacheKey::for_node(
            &auths(&["alice"]),
            &node(),
            &read(),
            CacheKind::SinglePermission,
        );
        cache.put(single, AccessStatus::Allowed);
        assert!(cache.get(&key(&["alice"])).is_none());
    }

    fn acl_key(store_acl: Option<AclId>, aspects: &[&str]) -> AccessCacheKey {
        AccessCacheKey::new(
            auths(&["alice"]),
            CacheTarget::Acl {
                acl: AclId(1),
                store_acl,
                type_qname: QName::new("sys", "base"),
                aspects: aspects.iter().map(|a| QName::new("cm", *a)).collect(),
            },
            read(),
            CacheKind::HasPermission,
        )
    }

    #[test]
    fn test_acl_targets_distinguish_store_acl() {
        let cache = AccessCache::default();
        cache.put(acl_key(None, &[]), AccessStatus::Allowed);
        assert!(cache.get(&acl_key(Some(AclId(2)), &[])).is_none());
    }

    #[test]
    fn test_acl_targets_distinguish_context() {
        let cache = AccessCache::default();
        cache.put(acl_key(None, &[]), AccessStatus::Allowed);
        assert!(cache.get(&acl_key(None, &["titled"])).is_none());
        assert_eq!(cache.get(&acl_key(None, &[])), Some(AccessStatus::Allowed));
    }

    #[test]
    fn test_cache_invalidate_all() {
        let cache = AccessCache::new(100, Duration::from_secs(60));
        let key1 = key(&["alice"]);
        let key2 = key(&["bob"]);

        cache.put(key1.clone(), AccessStatus::Allowed);
        cache.put(key2.clone(), AccessStatus::Denied);

        cache.invalidate_all();

        assert!(cache.get(&key1).is_none());
        assert!(cache.get(&key2).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_cache_ttl_expiration() {
        let cache = AccessCache::new(100, Duration::from_millis(50));
        let key = key(&["alice"]);
        cache.put(key.clone(), AccessStatus::Allowed);
        assert!(cache.get(&key).is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get(&key).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_key_ignores_authority_order(
            names in prop::collection::vec("[a-zA-Z_]{1,12}", 1..8),
        ) {
            let forward: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let cache = AccessCache::default();
            cache.put(key(&forward), AccessStatus::Allowed);
            prop_assert_eq!(key(&forward), key(&reversed));
            prop_assert_eq!(cache.get(&key(&reversed)), Some(AccessStatus::Allowed));
        }
    }
}
