// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint instance-ID lease pool.
//!
//! Each endpoint owns 32 instance IDs (the 5-bit header field). The
//! requester is the only caller and pairs every allocate with exactly one
//! free. IDs are handed out round-robin from a rotating hint so a stale
//! response cannot collide with a freshly leased ID right away.

use std::fmt;

use dashmap::DashMap;

use crate::protocol::INSTANCE_ID_MAX;
use crate::transport::Eid;

/// Number of leasable IDs per endpoint.
pub const POOL_SIZE: u8 = INSTANCE_ID_MAX + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceIdError {
    /// Every ID of the endpoint is currently leased. Retryable.
    Exhausted,
    /// Freed an ID that was not leased. Double free or foreign ID.
    NotAllocated,
    /// Pool bookkeeping no longer matches the lease bitmap. Fatal.
    Inconsistent,
}

impl fmt::Display for InstanceIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceIdError::Exhausted => write!(f, "no free instance id for endpoint"),
            InstanceIdError::NotAllocated => write!(f, "instance id is not leased"),
            InstanceIdError::Inconsistent => write!(f, "instance id pool state is inconsistent"),
        }
    }
}

impl std::error::Error for InstanceIdError {}

/// Lease state for one endpoint. Bit n of `leased` set means ID n is out.
#[derive(Debug, Default)]
struct Pool {
    leased: u32,
    outstanding: u8,
    hint: u8,
}

impl Pool {
    fn allocate(&mut self) -> Result<u8, InstanceIdError> {
        if self.outstanding as u32 != self.leased.count_ones() {
            return Err(InstanceIdError::Inconsistent);
        }
        if self.leased == u32::MAX {
            return Err(InstanceIdError::Exhausted);
        }
        // Scan from the hint so IDs rotate instead of reusing the lowest
        // free slot immediately after each free.
        for step in 0..POOL_SIZE {
            let id = (self.hint.wrapping_add(step)) & INSTANCE_ID_MAX;
            if self.leased & (1 << id) == 0 {
                self.leased |= 1 << id;
                self.outstanding += 1;
                self.hint = (id + 1) & INSTANCE_ID_MAX;
                return Ok(id);
            }
        }
        Err(InstanceIdError::Inconsistent)
    }

    fn free(&mut self, id: u8) -> Result<(), InstanceIdError> {
        if id > INSTANCE_ID_MAX {
            return Err(InstanceIdError::NotAllocated);
        }
        if self.leased & (1 << id) == 0 {
            return Err(InstanceIdError::NotAllocated);
        }
        if self.outstanding == 0 {
            return Err(InstanceIdError::Inconsistent);
        }
        self.leased &= !(1 << id);
        self.outstanding -= 1;
        Ok(())
    }
}

/// Lease pools for all endpoints. Pools are created lazily on the first
/// allocate for an endpoint and live until shutdown.
#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    pools: DashMap<Eid, Pool>,
}

impl InstanceIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, eid: Eid) -> Result<u8, InstanceIdError> {
        self.pools.entry(eid).or_default().allocate()
    }

    pub fn free(&self, eid: Eid, id: u8) -> Result<(), InstanceIdError> {
        match self.pools.get_mut(&eid) {
            Some(mut pool) => pool.free(id),
            None => Err(InstanceIdError::NotAllocated),
        }
    }

    /// Leased count for one endpoint. Diagnostic only.
    pub fn outstanding(&self, eid: Eid) -> u8 {
        self.pools.get(&eid).map(|p| p.outstanding).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_are_distinct_until_freed() {
        let alloc = InstanceIdAllocator::new();
        let mut held = Vec::new();
        for _ in 0..POOL_SIZE {
            let id = alloc.allocate(9).unwrap();
            assert!(!held.contains(&id));
            held.push(id);
        }
        assert_eq!(alloc.allocate(9), Err(InstanceIdError::Exhausted));

        // Freeing a single lease makes the pool allocatable again, and
        // the only free id is the one just returned.
        let released = held.swap_remove(fastrand::usize(..held.len()));
        alloc.free(9, released).unwrap();
        let reissued = alloc.allocate(9).unwrap();
        assert_eq!(reissued, released);
        held.push(reissued);

        for id in held {
            alloc.free(9, id).unwrap();
        }
        assert_eq!(alloc.outstanding(9), 0);
    }

    #[test]
    fn double_free_is_reported() {
        let alloc = InstanceIdAllocator::new();
        let id = alloc.allocate(3).unwrap();
        alloc.free(3, id).unwrap();
        assert_eq!(alloc.free(3, id), Err(InstanceIdError::NotAllocated));
    }

    #[test]
    fn free_on_unknown_endpoint_is_reported() {
        let alloc = InstanceIdAllocator::new();
        assert_eq!(alloc.free(42, 0), Err(InstanceIdError::NotAllocated));
        assert_eq!(alloc.free(42, 77), Err(InstanceIdError::NotAllocated));
    }

    #[test]
    fn endpoints_do_not_share_pools() {
        let alloc = InstanceIdAllocator::new();
        for _ in 0..POOL_SIZE {
            alloc.allocate(1).unwrap();
        }
        assert_eq!(alloc.allocate(1), Err(InstanceIdError::Exhausted));
        assert!(alloc.allocate(2).is_ok());
    }

    #[test]
    fn ids_rotate_instead_of_reusing_immediately() {
        let alloc = InstanceIdAllocator::new();
        let a = alloc.allocate(5).unwrap();
        alloc.free(5, a).unwrap();
        let b = alloc.allocate(5).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn interleaved_allocate_free_never_duplicates() {
        let alloc = InstanceIdAllocator::new();
        let mut held: Vec<u8> = Vec::new();
        for round in 0..200u32 {
            if !held.is_empty() && (round % 3 == 0 || held.len() as u8 == POOL_SIZE) {
                let idx = fastrand::usize(..held.len());
                let id = held.swap_remove(idx);
                alloc.free(7, id).unwrap();
            } else {
                let id = alloc.allocate(7).unwrap();
                assert!(!held.contains(&id));
                held.push(id);
            }
            assert_eq!(alloc.outstanding(7) as usize, held.len());
        }
    }
}
