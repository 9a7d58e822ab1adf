use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    panic::Location,
};

use hashbrown::HashMap;

use crate::average::AverageValue;

/// Index of a zone inside the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub(crate) u32);

impl ZoneId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of the code location that opened a zone.
///
/// Two zones with the same name but different call sites are different
/// nodes in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite(u64);

impl CallSite {
    pub const fn from_raw(key: u64) -> Self {
        CallSite(key)
    }

    pub fn new(file: &str, line: u32, column: u32) -> Self {
        let mut h = DefaultHasher::new();
        file.hash(&mut h);
        line.hash(&mut h);
        column.hash(&mut h);
        CallSite(h.finish())
    }

    /// Call site of whoever called the function this is invoked from.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(loc: &Location<'_>) -> Self {
        Self::new(loc.file(), loc.line(), loc.column())
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Lookup key for a zone among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    pub call_site: CallSite,
    pub name: String,
    pub is_root: bool,
}

/// Borrowed form of [`ZoneKey`]; hashes identically so lookups don't allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ZoneKeyRef<'a> {
    pub call_site: CallSite,
    pub name: &'a str,
    pub is_root: bool,
}

impl hashbrown::Equivalent<ZoneKey> for ZoneKeyRef<'_> {
    fn equivalent(&self, key: &ZoneKey) -> bool {
        self.call_site == key.call_site && self.is_root == key.is_root && self.name == key.name
    }
}

impl ZoneKeyRef<'_> {
    pub fn into_key(self) -> ZoneKey {
        ZoneKey {
            call_site: self.call_site,
            name: self.name.to_string(),
            is_root: self.is_root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneNode {
    pub(crate) key: ZoneKey,
    pub(crate) depth: u32,
    pub(crate) parent: Option<ZoneId>,
    pub(crate) root: ZoneId,
    pub(crate) children: Vec<ZoneId>,
    pub(crate) children_by_key: HashMap<ZoneKey, ZoneId>,

    pub(crate) called_count: u32,
    pub(crate) last_touched_frame: Option<u64>,
    /// (start, end) query ids reserved by the latest entry, until collected.
    pub(crate) pending_queries: Option<[u32; 2]>,

    pub(crate) average_start: AverageValue<u64>,
    pub(crate) average_end: AverageValue<u64>,
    pub(crate) start_timestamp: u64,
    pub(crate) end_timestamp: u64,
    pub(crate) last_elapsed_ns: f64,
    pub(crate) resolved_count: u64,
}

impl ZoneNode {
    pub(crate) fn new(
        key: ZoneKey,
        depth: u32,
        parent: Option<ZoneId>,
        root: ZoneId,
        averaging_window: usize,
    ) -> Self {
        Self {
            key,
            depth,
            parent,
            root,
            children: Vec::new(),
            children_by_key: HashMap::new(),
            called_count: 0,
            last_touched_frame: None,
            pending_queries: None,
            average_start: AverageValue::new(averaging_window),
            average_end: AverageValue::new(averaging_window),
            start_timestamp: 0,
            end_timestamp: 0,
            last_elapsed_ns: 0.0,
            resolved_count: 0,
        }
    }

    /// Marks the zone as entered in `frame_id`; the per-frame count restarts
    /// lazily the first time a new frame touches the node.
    pub(crate) fn touch(&mut self, frame_id: u64) -> u32 {
        if self.last_touched_frame != Some(frame_id) {
            self.last_touched_frame = Some(frame_id);
            self.called_count = 0;
        }
        self.called_count += 1;
        self.called_count
    }

    pub(crate) fn record_resolution(&mut self, start: u64, end: u64, period_ns: f32) {
        self.start_timestamp = start;
        self.end_timestamp = end;
        self.last_elapsed_ns = end.saturating_sub(start) as f64 * period_ns as f64;
        self.resolved_count += 1;
        self.average_start.add_value(start);
        self.average_end.add_value(end);
    }

    pub fn key(&self) -> &ZoneKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn call_site(&self) -> CallSite {
        self.key.call_site
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<ZoneId> {
        self.parent
    }

    pub fn root(&self) -> ZoneId {
        self.root
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children(&self) -> &[ZoneId] {
        &self.children
    }

    pub fn child(&self, call_site: CallSite, name: &str) -> Option<ZoneId> {
        let key = ZoneKeyRef {
            call_site,
            name,
            is_root: false,
        };
        self.children_by_key.get(&key).copied()
    }

    /// Entry count within `frame_id`; 0 when the zone was not entered in that frame.
    pub fn called_count_in(&self, frame_id: u64) -> u32 {
        if self.last_touched_frame == Some(frame_id) {
            self.called_count
        } else {
            0
        }
    }

    pub fn was_seen(&self, frame_id: u64) -> bool {
        self.last_touched_frame == Some(frame_id)
    }

    pub fn pending_queries(&self) -> Option<[u32; 2]> {
        self.pending_queries
    }

    pub fn average_start(&self) -> u64 {
        self.average_start.current_average()
    }

    pub fn average_end(&self) -> u64 {
        self.average_end.current_average()
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn end_timestamp(&self) -> u64 {
        self.end_timestamp
    }

    pub fn last_elapsed_ns(&self) -> f64 {
        self.last_elapsed_ns
    }

    pub fn last_elapsed_ms(&self) -> f64 {
        self.last_elapsed_ns / 1.0e6
    }

    /// Smoothed duration from the two averaged timestamps.
    pub fn average_elapsed_ms(&self, period_ns: f32) -> f64 {
        let ticks = self.average_end().saturating_sub(self.average_start());
        ticks as f64 * period_ns as f64 / 1.0e6
    }

    /// Number of times a start/end pair was resolved for this zone.
    pub fn resolved_count(&self) -> u64 {
        self.resolved_count
    }
}
