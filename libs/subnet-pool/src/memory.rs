use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{PoolError, SubnetAllocator, block_count, is_block_of};

/// In-memory pool. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    pool: IpNet,
    block_prefix: u8,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    /// allocated block -> owner
    allocated: BTreeMap<IpNet, String>,
    /// last block handed to each owner, kept after reclaim
    last_assigned: HashMap<String, IpNet>,
    /// reverse of `last_assigned`, at most one entry per block
    last_owner: HashMap<IpNet, String>,
}

impl Inner {
    fn assign(&mut self, block: IpNet, owner: &str) {
        self.allocated.insert(block, owner.to_owned());
        if let Some(prev) = self.last_owner.insert(block, owner.to_owned())
            && prev != owner
            && self.last_assigned.get(&prev) == Some(&block)
        {
            // block moved on, nothing to hand back to `prev` anymore
            self.last_assigned.remove(&prev);
        }
        if let Some(old) = self.last_assigned.insert(owner.to_owned(), block)
            && old != block
            && self.last_owner.get(&old).is_some_and(|o| o == owner)
        {
            self.last_owner.remove(&old);
        }
    }
}

impl MemoryPool {
    /// carve `pool` into `/block_prefix` blocks
    pub fn new(pool: IpNet, block_prefix: u8) -> Result<Self, PoolError> {
        if block_prefix < pool.prefix_len() || block_prefix > pool.max_prefix_len() {
            return Err(PoolError::InvalidPrefix {
                pool,
                prefix: block_prefix,
            });
        }
        Ok(Self {
            // normalize host bits away so containment checks are exact
            pool: pool.trunc(),
            block_prefix,
            inner: Arc::new(Mutex::new(Inner::default())),
        })
    }

    pub fn pool(&self) -> IpNet {
        self.pool
    }

    pub fn block_prefix(&self) -> u8 {
        self.block_prefix
    }

    /// total number of blocks, saturating
    pub fn total(&self) -> u128 {
        block_count(&self.pool, self.block_prefix)
    }

    pub fn free_count(&self) -> u128 {
        self.total() - self.inner.lock().allocated.len() as u128
    }

    /// currently allocated blocks, in address order
    pub fn allocated(&self) -> Vec<IpNet> {
        self.inner.lock().allocated.keys().copied().collect()
    }

    pub fn owner(&self, subnet: &IpNet) -> Option<String> {
        self.inner.lock().allocated.get(subnet).cloned()
    }

    fn blocks(&self) -> Result<ipnet::IpSubnets, PoolError> {
        self.pool
            .subnets(self.block_prefix)
            .map_err(|_| PoolError::InvalidPrefix {
                pool: self.pool,
                prefix: self.block_prefix,
            })
    }
}

#[async_trait]
impl SubnetAllocator for MemoryPool {
    type Error = PoolError;

    fn contains(&self, subnet: &IpNet) -> bool {
        is_block_of(&self.pool, self.block_prefix, subnet)
    }

    async fn free_block(&self, hint: &str) -> Result<Option<IpNet>, Self::Error> {
        let mut guard = self.inner.lock();

        if let Some(prev) = guard.last_assigned.get(hint).copied()
            && !guard.allocated.contains_key(&prev)
        {
            debug!(%prev, ?hint, "handing back previously assigned block");
            guard.assign(prev, hint);
            return Ok(Some(prev));
        }

        // lowest free block. allocated is ordered the same way as blocks(),
        // so this stops within allocated.len() + 1 steps
        let found = self
            .blocks()?
            .find(|block| !guard.allocated.contains_key(block));
        if let Some(block) = found {
            trace!(%block, ?hint, "allocated lowest free block");
            guard.assign(block, hint);
        }
        Ok(found)
    }

    async fn reclaim(&self, subnet: &IpNet) -> Result<bool, Self::Error> {
        let freed = self.inner.lock().allocated.remove(subnet).is_some();
        if !freed {
            debug!(%subnet, "reclaim of unallocated block ignored");
        }
        Ok(freed)
    }

    async fn record(&self, subnet: &IpNet, owner: &str) -> Result<(), Self::Error> {
        if !self.contains(subnet) {
            return Err(PoolError::OutOfPool(*subnet));
        }
        let mut guard = self.inner.lock();
        match guard.allocated.get(subnet) {
            Some(held) if held != owner => Err(PoolError::Conflict {
                subnet: *subnet,
                owner: held.clone(),
            }),
            _ => {
                guard.assign(*subnet, owner);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ipnet::IpNet;
    use tracing_test::traced_test;

    use super::MemoryPool;
    use crate::{PoolError, SubnetAllocator};

    fn pool() -> MemoryPool {
        MemoryPool::new("10.0.0.0/16".parse().unwrap(), 24).unwrap()
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn new_rejects_bad_prefix() {
        assert!(matches!(
            MemoryPool::new(net("10.0.0.0/16"), 8),
            Err(PoolError::InvalidPrefix { prefix: 8, .. })
        ));
        assert!(MemoryPool::new(net("10.0.0.0/16"), 33).is_err());
        assert!(MemoryPool::new(net("10.0.0.0/16"), 16).is_ok());
    }

    #[tokio::test]
    async fn free_block_allocates_sequential_blocks() {
        let pool = pool();
        let first = pool.free_block("n1").await.unwrap().expect("first block");
        let second = pool.free_block("n2").await.unwrap().expect("second block");

        assert_eq!(first, net("10.0.0.0/24"));
        assert_eq!(second, net("10.0.1.0/24"));
        assert!(pool.contains(&first));
        assert_eq!(pool.free_count(), 254);
        assert_eq!(pool.owner(&first).as_deref(), Some("n1"));
    }

    #[tokio::test]
    async fn free_block_exhausts() {
        let pool = MemoryPool::new(net("10.0.0.0/23"), 24).unwrap();
        assert!(pool.free_block("a").await.unwrap().is_some());
        assert!(pool.free_block("b").await.unwrap().is_some());
        assert_eq!(pool.free_block("c").await.unwrap(), None);
        assert_eq!(pool.free_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn reclaimed_block_goes_back_to_same_hint() {
        let pool = pool();
        let a = pool.free_block("a").await.unwrap().unwrap();
        let b = pool.free_block("b").await.unwrap().unwrap();
        pool.reclaim(&a).await.unwrap();
        pool.reclaim(&b).await.unwrap();

        // lowest free is a's old block, but "b" gets its own back
        let again = pool.free_block("b").await.unwrap().unwrap();
        assert_eq!(again, b);
        assert!(logs_contain("handing back previously assigned block"));
    }

    #[tokio::test]
    async fn reclaimed_block_reused_by_others_when_lowest() {
        let pool = pool();
        let a = pool.free_block("a").await.unwrap().unwrap();
        pool.reclaim(&a).await.unwrap();

        let c = pool.free_block("c").await.unwrap().unwrap();
        assert_eq!(c, a);
        // "a" can't have it back, it gets the next free one instead
        let a2 = pool.free_block("a").await.unwrap().unwrap();
        assert_ne!(a2, a);
    }

    #[tokio::test]
    #[traced_test]
    async fn reclaim_is_idempotent() {
        let pool = pool();
        let a = pool.free_block("a").await.unwrap().unwrap();
        assert!(pool.reclaim(&a).await.unwrap());
        assert!(!pool.reclaim(&a).await.unwrap());
        // never allocated, outside the pool
        assert!(!pool.reclaim(&net("192.168.0.0/24")).await.unwrap());
        assert_eq!(pool.free_count(), 256);
        assert!(logs_contain("reclaim of unallocated block ignored"));
    }

    #[tokio::test]
    async fn handback_memory_bounded_by_blocks() {
        let pool = MemoryPool::new(net("10.0.0.0/23"), 24).unwrap();
        // many short-lived owners cycling through two blocks
        for i in 0..100 {
            let block = pool.free_block(&format!("n{i}")).await.unwrap().unwrap();
            pool.reclaim(&block).await.unwrap();
        }
        {
            let inner = pool.inner.lock();
            assert!(inner.last_assigned.len() <= 2);
            assert!(inner.last_owner.len() <= 2);
            assert!(!inner.last_assigned.contains_key("n0"));
            assert_eq!(inner.last_assigned.get("n99"), Some(&net("10.0.0.0/24")));
        }

        // an owner that moved to another block doesn't keep the old one
        let a = pool.free_block("a").await.unwrap().unwrap();
        pool.record(&net("10.0.1.0/24"), "a").await.unwrap();
        pool.reclaim(&a).await.unwrap();
        let inner = pool.inner.lock();
        assert_eq!(inner.last_assigned.get("a"), Some(&net("10.0.1.0/24")));
        assert!(!inner.last_owner.contains_key(&a));
    }

    #[tokio::test]
    async fn record_moves_block_from_previous_owner() {
        let pool = pool();
        let a = pool.free_block("a").await.unwrap().unwrap();
        pool.reclaim(&a).await.unwrap();
        // restored for someone else, "a" has nothing to get back anymore
        pool.record(&a, "b").await.unwrap();
        {
            let inner = pool.inner.lock();
            assert!(!inner.last_assigned.contains_key("a"));
            assert_eq!(inner.last_owner.get(&a).map(String::as_str), Some("b"));
        }
        pool.reclaim(&a).await.unwrap();
        let b = pool.free_block("b").await.unwrap().unwrap();
        assert_eq!(b, a);
    }

    #[tokio::test]
    async fn record_marks_block_allocated() {
        let pool = pool();
        pool.record(&net("10.0.0.0/24"), "n1").await.unwrap();
        // same owner again is fine
        pool.record(&net("10.0.0.0/24"), "n1").await.unwrap();
        assert_eq!(pool.free_count(), 255);

        assert_eq!(
            pool.record(&net("10.0.0.0/24"), "n2").await,
            Err(PoolError::Conflict {
                subnet: net("10.0.0.0/24"),
                owner: "n1".into()
            })
        );
        assert_eq!(
            pool.record(&net("10.1.0.0/24"), "n2").await,
            Err(PoolError::OutOfPool(net("10.1.0.0/24")))
        );

        // recorded blocks are skipped by free_block
        let next = pool.free_block("n3").await.unwrap().unwrap();
        assert_eq!(next, net("10.0.1.0/24"));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let pool = pool();
        let other = pool.clone();
        let a = pool.free_block("a").await.unwrap().unwrap();
        assert_eq!(other.allocated(), vec![a]);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let pool = pool();
        let mut handles = Vec::new();
        for i in 0..64 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.free_block(&format!("node-{i}")).await.unwrap().unwrap()
            }));
        }
        let mut blocks = Vec::new();
        for handle in handles {
            blocks.push(handle.await.unwrap());
        }
        blocks.sort();
        blocks.dedup();
        assert_eq!(blocks.len(), 64);
        assert_eq!(pool.free_count(), 256 - 64);
    }
}
