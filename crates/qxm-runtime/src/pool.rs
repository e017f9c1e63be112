//! Qudit identity pool.
//!
//! Ids are handed out from a FIFO free-list of returned ids first, then by
//! extending a high-water mark. The order is fully deterministic for a given
//! allocate/free sequence.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::error::{ManagerError, ManagerResult};

/// Allocates and recycles qudit identifiers.
#[derive(Debug, Default)]
pub struct QuditIdPool {
    /// Returned ids, oldest first.
    free: VecDeque<usize>,
    /// Next never-used id.
    next: usize,
    /// Currently allocated ids.
    live: FxHashSet<usize>,
}

impl QuditIdPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an id that is not currently live.
    pub fn allocate(&mut self) -> usize {
        let id = self.free.pop_front().unwrap_or_else(|| {
            let id = self.next;
            self.next += 1;
            id
        });
        self.live.insert(id);
        id
    }

    /// Return an id to the pool.
    pub fn free(&mut self, id: usize) -> ManagerResult<()> {
        if !self.live.remove(&id) {
            let reason = if id < self.next {
                "was already returned"
            } else {
                "was never allocated"
            };
            return Err(ManagerError::protocol(format!(
                "qudit id {id} {reason}"
            )));
        }
        self.free.push_back(id);
        Ok(())
    }

    /// True if `id` is currently allocated.
    pub fn is_live(&self, id: usize) -> bool {
        self.live.contains(&id)
    }

    /// True iff every id ever allocated has been returned.
    pub fn all_deallocated(&self) -> bool {
        self.live.is_empty()
    }

    /// Currently allocated ids, ascending.
    pub fn live_ids(&self) -> Vec<usize> {
        let mut ids: Vec<_> = self.live.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of currently allocated ids.
    pub fn num_live(&self) -> usize {
        self.live.len()
    }

    /// Number of distinct ids ever handed out.
    pub fn high_water_mark(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fresh_ids_are_sequential() {
        let mut pool = QuditIdPool::new();
        assert_eq!(pool.allocate(), 0);
        assert_eq!(pool.allocate(), 1);
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.high_water_mark(), 3);
    }

    #[test]
    fn test_fifo_reuse() {
        let mut pool = QuditIdPool::new();
        let ids: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
        pool.free(ids[2]).unwrap();
        pool.free(ids[0]).unwrap();
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.allocate(), 0);
        assert_eq!(pool.allocate(), 4);
    }

    #[test]
    fn test_double_free_is_protocol_violation() {
        let mut pool = QuditIdPool::new();
        let id = pool.allocate();
        pool.free(id).unwrap();
        let err = pool.free(id).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("already returned"));
    }

    #[test]
    fn test_free_unallocated_is_protocol_violation() {
        let mut pool = QuditIdPool::new();
        let err = pool.free(7).unwrap_err();
        assert!(err.to_string().contains("never allocated"));
    }

    #[test]
    fn test_leak_detection() {
        let mut pool = QuditIdPool::new();
        let ids: Vec<_> = (0..5).map(|_| pool.allocate()).collect();
        for id in &ids[..4] {
            pool.free(*id).unwrap();
        }
        assert!(!pool.all_deallocated());
        assert_eq!(pool.live_ids(), vec![4]);

        pool.free(ids[4]).unwrap();
        assert!(pool.all_deallocated());
    }

    #[derive(Debug, Clone)]
    enum PoolOp {
        Allocate,
        Free(usize),
    }

    fn arb_ops() -> impl Strategy<Value = Vec<PoolOp>> {
        prop::collection::vec(
            prop_oneof![Just(PoolOp::Allocate), (0usize..16).prop_map(PoolOp::Free)],
            0..64,
        )
    }

    proptest! {
        #[test]
        fn prop_live_ids_are_unique(ops in arb_ops()) {
            let mut pool = QuditIdPool::new();
            let mut live: Vec<usize> = Vec::new();

            for op in ops {
                match op {
                    PoolOp::Allocate => {
                        let id = pool.allocate();
                        prop_assert!(!live.contains(&id));
                        live.push(id);
                    }
                    PoolOp::Free(slot) => {
                        if live.is_empty() {
                            continue;
                        }
                        let id = live.remove(slot % live.len());
                        prop_assert!(pool.free(id).is_ok());
                        prop_assert!(pool.free(id).is_err());
                    }
                }
                prop_assert_eq!(pool.num_live(), live.len());
                prop_assert_eq!(pool.all_deallocated(), live.is_empty());
            }
        }
    }
}
