//! Read-only copy of the zone tree for flame-graph style consumers.

use serde::Serialize;

use crate::{
    error::Diagnostics,
    registry::ZoneRegistry,
    session::FrameSession,
    zone::ZoneId,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSnapshot {
    pub id: usize,
    pub name: String,
    pub call_site: u64,
    pub depth: u32,
    pub called_count: u32,
    /// Entered during the most recently begun frame.
    pub seen: bool,
    pub last_elapsed_ms: f64,
    pub average_start: u64,
    pub average_end: u64,
    pub average_elapsed_ms: f64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub resolved_count: u64,
    pub children: Vec<ZoneSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilerSnapshot {
    pub loaded: bool,
    pub frame_id: u64,
    pub frame_label: String,
    pub timestamp_period_ns: f32,
    pub max_depth_ever_seen: u32,
    pub diagnostics: Diagnostics,
    pub roots: Vec<ZoneSnapshot>,
}

fn capture_zone(
    registry: &ZoneRegistry,
    id: ZoneId,
    frame_id: u64,
    period_ns: f32,
) -> Option<ZoneSnapshot> {
    let node = registry.get(id)?;
    Some(ZoneSnapshot {
        id: id.index(),
        name: node.name().to_string(),
        call_site: node.call_site().raw(),
        depth: node.depth(),
        called_count: node.called_count_in(frame_id),
        seen: node.was_seen(frame_id),
        last_elapsed_ms: node.last_elapsed_ms(),
        average_start: node.average_start(),
        average_end: node.average_end(),
        average_elapsed_ms: node.average_elapsed_ms(period_ns),
        start_timestamp: node.start_timestamp(),
        end_timestamp: node.end_timestamp(),
        resolved_count: node.resolved_count(),
        children: node
            .children()
            .iter()
            .filter_map(|&c| capture_zone(registry, c, frame_id, period_ns))
            .collect(),
    })
}

impl ProfilerSnapshot {
    pub(crate) fn capture(
        registry: &ZoneRegistry,
        session: &FrameSession,
        period_ns: f32,
        diagnostics: Diagnostics,
        loaded: bool,
    ) -> Self {
        let frame_id = session.frame_id();
        Self {
            loaded,
            frame_id,
            frame_label: session.frame_label().to_string(),
            timestamp_period_ns: period_ns,
            max_depth_ever_seen: session.max_depth_ever_seen(),
            diagnostics,
            roots: registry
                .roots()
                .iter()
                .filter_map(|&r| capture_zone(registry, r, frame_id, period_ns))
                .collect(),
        }
    }

    /// Zone reached by following names from a root, e.g. `["frame", "shadows"]`.
    pub fn find(&self, path: &[&str]) -> Option<&ZoneSnapshot> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.iter().find(|z| z.name == *first)?;
        for name in rest {
            node = node.children.iter().find(|z| z.name == *name)?;
        }
        Some(node)
    }

    /// Depth-first, parents before children, siblings in first-seen order.
    pub fn iter(&self) -> ZoneIter<'_> {
        ZoneIter {
            stack: self.roots.iter().rev().collect(),
        }
    }

    pub fn zone_count(&self) -> usize {
        self.iter().count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn log_summary(&self) {
        log::info!(
            "[gpuzones] frame {} `{}`: {} zone(s), max depth {}",
            self.frame_id,
            self.frame_label,
            self.zone_count(),
            self.max_depth_ever_seen
        );
        for z in self.iter() {
            log::info!(
                "[gpuzones] {:indent$}{}: {:.3} ms (avg {:.3} ms) x{}",
                "",
                z.name,
                z.last_elapsed_ms,
                z.average_elapsed_ms,
                z.called_count,
                indent = z.depth as usize * 2
            );
        }
    }
}

pub struct ZoneIter<'a> {
    stack: Vec<&'a ZoneSnapshot>,
}

impl<'a> Iterator for ZoneIter<'a> {
    type Item = &'a ZoneSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let z = self.stack.pop()?;
        self.stack.extend(z.children.iter().rev());
        Some(z)
    }
}
