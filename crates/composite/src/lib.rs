//! Composite painter.
//!
//! Produces the staging bytes for one render from the retained main snapshot
//! and the popup state. The painter remembers where it last drew the popup so
//! that pixels under a moved or vanished popup are restored from the main
//! snapshot; it owns no pixel memory of its own.
//!
//! Decision order:
//! 1. forced full copy or popup just closed: whole main frame, popup on top
//!    if one is still composable;
//! 2. composable popup: base copy, restore the old overlay rect if the popup
//!    moved, overlay last;
//! 3. no popup: the dirty rect, or the whole frame when dirty rects are not
//!    supported.

use frame_buffer::{FrameBuffer, FrameLayout, PixelRect, PopupOverlay, PopupState};
use smallvec::SmallVec;

mod blit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// Nothing was written.
    Skipped,
    Full,
    DirtyRect,
    PopupOverlay,
}

/// What changed since the last composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompositeRequest {
    /// Region of the main snapshot that changed, already clamped.
    pub base_dirty: Option<PixelRect>,
    pub force_full_copy: bool,
    pub popup_closed: bool,
}

impl CompositeRequest {
    pub fn full() -> Self {
        Self {
            force_full_copy: true,
            ..Self::default()
        }
    }

    pub fn dirty(rect: PixelRect) -> Self {
        Self {
            base_dirty: Some(rect),
            ..Self::default()
        }
    }

    /// Popup pixels or placement changed; the main snapshot did not.
    pub fn popup_changed() -> Self {
        Self::default()
    }

    pub fn popup_closed() -> Self {
        Self {
            popup_closed: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeOutcome {
    pub mode: CompositeMode,
    /// Bounding box of every region written; the only part worth uploading.
    pub touched: PixelRect,
    /// Regions in the order they were written.
    pub regions: SmallVec<[PixelRect; 4]>,
}

impl CompositeOutcome {
    fn skipped() -> Self {
        Self {
            mode: CompositeMode::Skipped,
            touched: PixelRect::default(),
            regions: SmallVec::new(),
        }
    }

    fn record(&mut self, rect: PixelRect) {
        if rect.is_empty() {
            return;
        }
        self.touched = self.touched.union(&rect);
        self.regions.push(rect);
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }
}

#[derive(Debug)]
pub struct CompositePainter {
    dirty_rect_support: bool,
    last_overlay: Option<PixelRect>,
}

impl CompositePainter {
    pub fn new(dirty_rect_support: bool) -> Self {
        Self {
            dirty_rect_support,
            last_overlay: None,
        }
    }

    pub fn dirty_rect_support(&self) -> bool {
        self.dirty_rect_support
    }

    /// Canvas rect the popup occupied after the last composite.
    pub fn last_overlay(&self) -> Option<PixelRect> {
        self.last_overlay
    }

    /// Forgets the previous overlay. Call when staging is replaced.
    pub fn reset(&mut self) {
        self.last_overlay = None;
    }

    /// Writes one composite into `staging`, laid out per `canvas`.
    ///
    /// The main snapshot must have the canvas layout; anything else is
    /// skipped, since a resize always goes through a fresh staging buffer.
    pub fn paint(
        &mut self,
        staging: &mut [u8],
        canvas: FrameLayout,
        main: &FrameBuffer,
        popup: &PopupState,
        request: CompositeRequest,
    ) -> CompositeOutcome {
        if canvas.is_empty() || main.layout() != canvas || staging.len() != canvas.byte_len() {
            tracing::trace!(
                canvas_width = canvas.width(),
                canvas_height = canvas.height(),
                main_width = main.width(),
                main_height = main.height(),
                "composite skipped: canvas does not match main frame"
            );
            return CompositeOutcome::skipped();
        }

        let overlay = popup.overlay_for(canvas);
        let mut outcome = CompositeOutcome::skipped();

        if request.force_full_copy || request.popup_closed {
            blit::copy_in_place(main.pixels(), staging, canvas, canvas.bounds());
            outcome.mode = CompositeMode::Full;
            outcome.record(canvas.bounds());
            if let Some(overlay) = overlay {
                draw_overlay(staging, canvas, popup, overlay);
                outcome.record(overlay.dest_rect);
            }
        } else {
            let base = if self.dirty_rect_support {
                request.base_dirty.and_then(|rect| rect.intersect(&canvas.bounds()))
            } else {
                Some(canvas.bounds())
            };
            if let Some(base) = base {
                blit::copy_in_place(main.pixels(), staging, canvas, base);
                outcome.mode = if base == canvas.bounds() {
                    CompositeMode::Full
                } else {
                    CompositeMode::DirtyRect
                };
                outcome.record(base);
            }

            let moved_from = self
                .last_overlay
                .filter(|previous| overlay.is_none_or(|overlay| overlay.dest_rect != *previous))
                .and_then(|previous| previous.intersect(&canvas.bounds()));
            if let Some(previous) = moved_from {
                tracing::trace!(?previous, "restoring pixels under previous popup position");
                blit::copy_in_place(main.pixels(), staging, canvas, previous);
                if outcome.mode == CompositeMode::Skipped {
                    outcome.mode = CompositeMode::DirtyRect;
                }
                outcome.record(previous);
            }

            if let Some(overlay) = overlay {
                draw_overlay(staging, canvas, popup, overlay);
                outcome.mode = CompositeMode::PopupOverlay;
                outcome.record(overlay.dest_rect);
            }
        }

        self.last_overlay = overlay.map(|overlay| overlay.dest_rect);
        tracing::trace!(
            mode = ?outcome.mode,
            touched = ?outcome.touched,
            regions = outcome.regions.len(),
            "composited"
        );
        outcome
    }
}

fn draw_overlay(staging: &mut [u8], canvas: FrameLayout, popup: &PopupState, overlay: PopupOverlay) {
    let Some(frame) = popup.frame() else {
        return;
    };
    blit::copy_between(
        frame.pixels(),
        frame.layout(),
        overlay.source_rect,
        staging,
        canvas,
        overlay.dest_rect.x,
        overlay.dest_rect.y,
    );
}
