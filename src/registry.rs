//! Zone tree storage: an arena of nodes addressed by [`ZoneId`].

use hashbrown::HashMap;

use crate::{
    error::ProfilerError,
    zone::{CallSite, ZoneId, ZoneKey, ZoneKeyRef, ZoneNode},
};

/// Result of [`ZoneRegistry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub zone: ZoneId,
    /// True when the node did not exist before this call.
    pub created: bool,
    /// Entry count of the node within the frame, including this one.
    pub called_count: u32,
}

pub struct ZoneRegistry {
    nodes: Vec<ZoneNode>,
    roots: Vec<ZoneId>,
    roots_by_key: HashMap<ZoneKey, ZoneId>,
    /// Last zone entered at each depth; bounded by `max_depth`.
    depth_to_last: Vec<Option<ZoneId>>,
    averaging_window: usize,
    breadcrumb_levels: usize,
    max_zones: u32,
}

impl ZoneRegistry {
    pub fn new(
        max_depth: u32,
        averaging_window: usize,
        breadcrumb_levels: usize,
        max_zones: u32,
    ) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            roots_by_key: HashMap::new(),
            depth_to_last: vec![None; max_depth as usize],
            averaging_window,
            breadcrumb_levels,
            max_zones,
        }
    }

    /// Finds the child of `parent` (or the root when `parent` is `None`) with
    /// this identity, creating it on first sight, and counts the entry
    /// against `frame_id`.
    ///
    /// Fails without touching the tree when a new node would exceed the zone
    /// capacity; existing nodes always resolve.
    pub fn resolve(
        &mut self,
        call_site: CallSite,
        name: &str,
        parent: Option<ZoneId>,
        frame_id: u64,
    ) -> Result<Resolved, ProfilerError> {
        let lookup = ZoneKeyRef {
            call_site,
            name,
            is_root: parent.is_none(),
        };

        let existing = match parent {
            Some(p) => self.nodes[p.index()].children_by_key.get(&lookup).copied(),
            None => self.roots_by_key.get(&lookup).copied(),
        };

        let (zone, created) = match existing {
            Some(zone) => {
                debug_assert_eq!(
                    self.nodes[zone.index()].depth,
                    parent.map_or(0, |p| self.nodes[p.index()].depth + 1),
                    "zone `{name}` re-entered at a different depth"
                );
                (zone, false)
            }
            None => {
                if self.nodes.len() >= self.max_zones as usize {
                    return Err(ProfilerError::ZoneCapacityExceeded {
                        capacity: self.max_zones,
                    });
                }
                (self.insert(lookup.into_key(), parent), true)
            }
        };

        let node = &mut self.nodes[zone.index()];
        let called_count = node.touch(frame_id);
        let depth = node.depth as usize;
        if let Some(slot) = self.depth_to_last.get_mut(depth) {
            *slot = Some(zone);
        }

        Ok(Resolved {
            zone,
            created,
            called_count,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.max_zones
    }

    fn insert(&mut self, key: ZoneKey, parent: Option<ZoneId>) -> ZoneId {
        let id = ZoneId(self.nodes.len() as u32);
        let (depth, root) = match parent {
            Some(p) => {
                let pn = &self.nodes[p.index()];
                (pn.depth + 1, pn.root)
            }
            None => (0, id),
        };

        log::debug!(
            "new zone `{}` at depth {depth} (parent {:?})",
            key.name,
            parent.map(|p| self.nodes[p.index()].name().to_string())
        );

        match parent {
            Some(p) => {
                let pn = &mut self.nodes[p.index()];
                pn.children.push(id);
                pn.children_by_key.insert(key.clone(), id);
            }
            None => {
                self.roots.push(id);
                self.roots_by_key.insert(key.clone(), id);
            }
        }

        self.nodes
            .push(ZoneNode::new(key, depth, parent, root, self.averaging_window));
        id
    }

    pub fn get(&self, zone: ZoneId) -> Option<&ZoneNode> {
        self.nodes.get(zone.index())
    }

    pub(crate) fn get_mut(&mut self, zone: ZoneId) -> Option<&mut ZoneNode> {
        self.nodes.get_mut(zone.index())
    }

    pub fn roots(&self) -> &[ZoneId] {
        &self.roots
    }

    pub fn root(&self, call_site: CallSite, name: &str) -> Option<ZoneId> {
        let key = ZoneKeyRef {
            call_site,
            name,
            is_root: true,
        };
        self.roots_by_key.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &ZoneNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (ZoneId(i as u32), n))
    }

    pub fn last_zone_at_depth(&self, depth: u32) -> Option<ZoneId> {
        self.depth_to_last.get(depth as usize).copied().flatten()
    }

    /// Path from the root down to `zone`, keeping only the deepest
    /// `breadcrumb_levels` entries.
    pub fn breadcrumb(&self, zone: ZoneId) -> Vec<ZoneId> {
        let mut trail = Vec::new();
        let mut cursor = Some(zone);
        while let Some(z) = cursor {
            if trail.len() == self.breadcrumb_levels {
                break;
            }
            trail.push(z);
            cursor = self.nodes.get(z.index()).and_then(|n| n.parent);
        }
        trail.reverse();
        trail
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.roots_by_key.clear();
        self.depth_to_last.iter_mut().for_each(|s| *s = None);
    }
}
