//! Per-frame preparation on the render thread.
//!
//! Freezes the camera into a snapshot, settles which sources the layer tree
//! needs, lets every active source pick its tiles and hands out clip IDs
//! for the union of those tiles.

use std::collections::BTreeSet;
use std::time::Duration;

use render_protocol::{FrameSnapshot, SourceId};
use renderer::{ActiveSetChange, SourceRegistry};
use tiles::{ClipIdAssignment, ClipOverflowPolicy, TileId, compute_clip_ids};
use view::TransformState;

use crate::style::Style;

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFrame {
    pub snapshot: FrameSnapshot,
    /// Framebuffer size or pixel ratio differ from the previous frame.
    pub dimensions_changed: bool,
    pub active_set: ActiveSetChange,
    pub clipped_tiles: usize,
    /// Tiles drawn without stencil protection because the stencil ran out
    /// of bits.
    pub unclipped_tiles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverflowReport {
    unclipped: usize,
    bits_used: u8,
}

#[derive(Debug)]
pub struct FramePreparer {
    policy: ClipOverflowPolicy,
    previous: Option<FrameSnapshot>,
    reported_overflow: Option<OverflowReport>,
    reported_missing: BTreeSet<SourceId>,
}

impl FramePreparer {
    pub fn new(policy: ClipOverflowPolicy) -> Self {
        Self {
            policy,
            previous: None,
            reported_overflow: None,
            reported_missing: BTreeSet::new(),
        }
    }

    /// Forgets the previous snapshot, so the next frame counts as a
    /// dimension change.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn prepare(
        &mut self,
        state: &TransformState,
        now: Duration,
        style: &mut dyn Style,
        sources: &mut SourceRegistry,
    ) -> PreparedFrame {
        let snapshot = state.snapshot(now);
        let dimensions_changed = self
            .previous
            .as_ref()
            .is_none_or(|previous| !snapshot.dimensions_match(previous));
        self.previous = Some(snapshot);

        let active_set = sources.update_active_set(style.layers());
        if !active_set.activated.is_empty() || !active_set.deactivated.is_empty() {
            log::debug!(
                "active sources changed: +{:?} -{:?}",
                active_set.activated,
                active_set.deactivated
            );
        }
        self.report_missing(&active_set.missing);

        style.update_properties(snapshot.normalized_zoom(), now);

        for (_, source) in sources.active_mut() {
            source.refresh_tile_set(&snapshot);
        }
        let visible: Vec<TileId> = sources
            .active()
            .flat_map(|(_, source)| source.tile_ids())
            .collect();
        let clip_ids = compute_clip_ids(visible, self.policy);
        self.report_overflow(&clip_ids);
        for (_, source) in sources.active_mut() {
            source.update_clip_ids(&clip_ids);
            source.update_matrices(&snapshot);
        }

        PreparedFrame {
            snapshot,
            dimensions_changed,
            active_set,
            clipped_tiles: clip_ids.len(),
            unclipped_tiles: clip_ids.unclipped_count(),
        }
    }

    fn report_missing(&mut self, missing: &[SourceId]) {
        for id in missing {
            if !self.reported_missing.contains(id) {
                log::warn!("source '{id}' is used by a layer but not configured");
            }
        }
        self.reported_missing = missing.iter().cloned().collect();
    }

    /// Warns once per distinct overflow; a frame that fits clears the
    /// record.
    fn report_overflow(&mut self, clip_ids: &ClipIdAssignment) {
        let unclipped = clip_ids.unclipped_count();
        if unclipped == 0 {
            self.reported_overflow = None;
            return;
        }
        let report = OverflowReport {
            unclipped,
            bits_used: clip_ids.bits_used(),
        };
        if self.reported_overflow != Some(report) {
            log::warn!(
                "clip IDs exhausted: {unclipped} tiles drawn unclipped ({} stencil bits used, {:?})",
                report.bits_used,
                self.policy
            );
            self.reported_overflow = Some(report);
        }
    }
}
