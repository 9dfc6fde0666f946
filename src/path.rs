use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::types::Vec3;

/// Points per sealed block.
const BLOCK_LEN: usize = 64;

/// Bounded FIFO history of world-frame positions.
///
/// Points live in fixed-size blocks. Full blocks are sealed into `Arc<[Vec3]>`
/// and never written again, so a snapshot shares them outright; only the
/// open tail block (under `BLOCK_LEN` points) is copied when a push follows
/// a snapshot. Eviction advances `head_skip` into the oldest sealed block and
/// drops the block once it is used up.
#[derive(Clone, Debug)]
pub struct PathBuffer {
    sealed: VecDeque<Arc<[Vec3]>>,
    tail: Arc<Vec<Vec3>>,
    head_skip: usize,
    len: usize,
    capacity: usize,
    block_len: usize,
}

impl PathBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        // block_len <= capacity keeps every eviction inside a sealed block
        let block_len = BLOCK_LEN.min(capacity);
        Self {
            sealed: VecDeque::new(),
            tail: Arc::new(Vec::with_capacity(block_len)),
            head_skip: 0,
            len: 0,
            capacity,
            block_len,
        }
    }

    /// Append a point, evicting the oldest once over capacity.
    pub fn push(&mut self, position: Vec3) {
        Arc::make_mut(&mut self.tail).push(position);
        self.len += 1;

        if self.tail.len() == self.block_len {
            let full = std::mem::replace(&mut self.tail, Arc::new(Vec::with_capacity(self.block_len)));
            self.sealed.push_back(Arc::from(full.as_slice()));
        }

        while self.len > self.capacity {
            self.len -= 1;
            self.head_skip += 1;
            if self.sealed.front().map_or(false, |block| self.head_skip == block.len()) {
                self.sealed.pop_front();
                self.head_skip = 0;
            }
        }
    }

    pub fn snapshot(&self) -> PathSnapshot {
        PathSnapshot {
            sealed: self.sealed.iter().cloned().collect(),
            tail: Arc::clone(&self.tail),
            head_skip: self.head_skip,
            len: self.len,
        }
    }

    pub fn clear(&mut self) {
        // never clear in place under a reader
        self.sealed = VecDeque::new();
        self.tail = Arc::new(Vec::with_capacity(self.block_len));
        self.head_skip = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Immutable view of the path at the moment it was taken.
#[derive(Clone, Debug, Default)]
pub struct PathSnapshot {
    sealed: Vec<Arc<[Vec3]>>,
    tail: Arc<Vec<Vec3>>,
    head_skip: usize,
    len: usize,
}

impl PathSnapshot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<&Vec3> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<&Vec3> {
        if self.len == 0 {
            return None;
        }
        self.tail.last().or_else(|| self.sealed.last().and_then(|block| block.last()))
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Vec3> {
        self.sealed
            .iter()
            .flat_map(|block| block.iter())
            .chain(self.tail.iter())
            .skip(self.head_skip)
    }

    pub fn to_vec(&self) -> Vec<Vec3> {
        self.iter().copied().collect()
    }
}

impl PartialEq for PathSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Serialize for PathSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|p| [p.x, p.y, p.z]))
    }
}
