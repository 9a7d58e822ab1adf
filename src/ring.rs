//! Per-frame allocation of timestamp query ids.
//!
//! The query pool is split into two banks of `capacity` ids. Frame N
//! allocates from bank `N % 2`, so the previous frame's ids stay untouched
//! while its results are in flight. Results of frame N must be collected
//! before frame N + 2 resets the same bank; that ordering is up to the caller.

use std::ops::Range;

use crate::{config::MAX_QUERY_COUNT, error::ProfilerError, zone::ZoneId};

pub const BANK_COUNT: u32 = 2;

pub struct TimestampRing {
    capacity: u32,
    bank: u32,
    head: u32,
    zone_for_query: Vec<Option<ZoneId>>,
    measures: Vec<u64>,
}

impl TimestampRing {
    /// `capacity` is the number of ids per frame. It is rounded down to an
    /// even count and clamped to [`MAX_QUERY_COUNT`].
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.min(MAX_QUERY_COUNT) & !1;
        let pool = (capacity * BANK_COUNT) as usize;
        Self {
            capacity,
            bank: 0,
            head: 0,
            zone_for_query: vec![None; pool],
            measures: vec![0; pool],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn pool_size(&self) -> u32 {
        self.capacity * BANK_COUNT
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn bank(&self) -> u32 {
        self.bank
    }

    /// Ids of the bank currently being allocated from.
    pub fn bank_range(&self) -> Range<u32> {
        let base = self.bank * self.capacity;
        base..base + self.capacity
    }

    /// Reserves a (start, end) pair. Start ids are always even.
    pub fn allocate(&mut self) -> Result<(u32, u32), ProfilerError> {
        if self.head + 2 > self.capacity {
            return Err(ProfilerError::QueryCapacityExceeded {
                capacity: self.capacity,
            });
        }
        let start = self.bank * self.capacity + self.head;
        self.head += 2;
        Ok((start, start + 1))
    }

    /// Switches to the bank owned by `frame_id` and forgets whatever that
    /// bank still referenced from two frames ago.
    pub fn reset_frame(&mut self, frame_id: u64) {
        self.bank = (frame_id % BANK_COUNT as u64) as u32;
        self.head = 0;
        let range = self.bank_range();
        for id in range {
            self.zone_for_query[id as usize] = None;
        }
    }

    pub fn bind(&mut self, query_id: u32, zone: ZoneId) {
        if let Some(slot) = self.zone_for_query.get_mut(query_id as usize) {
            *slot = Some(zone);
        }
    }

    pub fn unbind(&mut self, query_id: u32) {
        self.take(query_id);
    }

    pub fn zone_for(&self, query_id: u32) -> Option<ZoneId> {
        self.zone_for_query.get(query_id as usize).copied().flatten()
    }

    /// Removes and returns the zone waiting on `query_id`.
    pub fn take(&mut self, query_id: u32) -> Option<ZoneId> {
        self.zone_for_query
            .get_mut(query_id as usize)
            .and_then(Option::take)
    }

    pub fn store(&mut self, query_id: u32, value: u64) {
        if let Some(slot) = self.measures.get_mut(query_id as usize) {
            *slot = value;
        }
    }

    /// Last raw value read back for `query_id`.
    pub fn measure(&self, query_id: u32) -> u64 {
        self.measures.get(query_id as usize).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.bank = 0;
        self.zone_for_query.iter_mut().for_each(|z| *z = None);
        self.measures.iter_mut().for_each(|m| *m = 0);
    }
}
