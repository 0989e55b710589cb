//! Editor interaction core
//!
//! Tracks mouse state, owns the transform gizmo and the HUD, and turns
//! clicks into selection via the scene raycast. Cursor rays come from
//! [`crate::foundation::math::Ray::from_screen`]; the host feeds mouse
//! events in window pixels.

pub mod gizmo;
pub mod hud;

pub use gizmo::{Gizmo, GizmoInteraction, GizmoMode, GizmoOrientation};
pub use hud::Hud;

use crate::foundation::math::Ray;
use crate::handle::INVALID_ID;
use crate::scene::Scene;
use crate::transform::TransformStore;

/// Pixels of motion with a button held before a press becomes a drag
pub const DRAG_THRESHOLD: f32 = 5.0;

/// Mouse state tracked across events
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseState {
    /// Cursor position in window pixels
    pub position: (f32, f32),
    /// Position at the last button press
    pub press_position: (f32, f32),
    /// Left button held
    pub pressed: bool,
    /// Motion exceeded [`DRAG_THRESHOLD`] while pressed
    pub dragging: bool,
}

/// Editor state: selection, gizmo, HUD
pub struct Editor {
    /// Transform gizmo
    pub gizmo: Gizmo,
    /// Text overlay
    pub hud: Hud,
    mouse: MouseState,
    selected_id: u32,
}

impl Editor {
    /// Object ids at or above this value belong to HUD text
    pub const HUD_ID_BASE: u32 = 0x00F0_0000;

    /// Create the editor
    pub fn new() -> Self {
        Self {
            gizmo: Gizmo::new(),
            hud: Hud::new(Self::HUD_ID_BASE),
            mouse: MouseState::default(),
            selected_id: INVALID_ID,
        }
    }

    /// Currently selected object id (`INVALID_ID` for none)
    pub fn selected_id(&self) -> u32 {
        self.selected_id
    }

    /// Mouse state snapshot
    pub fn mouse(&self) -> MouseState {
        self.mouse
    }

    /// Cursor motion. While dragging, the gizmo consumes the ray; otherwise
    /// it updates hover highlighting.
    pub fn mouse_moved(&mut self, x: f32, y: f32, ray: &Ray, transforms: &mut TransformStore) {
        self.mouse.position = (x, y);
        if self.mouse.pressed && !self.mouse.dragging {
            let dx = x - self.mouse.press_position.0;
            let dy = y - self.mouse.press_position.1;
            if (dx * dx + dy * dy).sqrt() > DRAG_THRESHOLD {
                self.mouse.dragging = true;
            }
        }

        if self.mouse.pressed {
            self.gizmo.drag(ray, transforms);
        } else {
            self.gizmo.handle_hover(ray);
        }
    }

    /// Left button press. Returns true when the gizmo claimed the press.
    pub fn mouse_pressed(&mut self, ray: &Ray) -> bool {
        self.mouse.pressed = true;
        self.mouse.dragging = false;
        self.mouse.press_position = self.mouse.position;
        self.gizmo.mouse_down(ray)
    }

    /// Left button release. A release without a drag is a selection click:
    /// the nearest scene raycast hit becomes the selection, a miss clears
    /// it.
    pub fn mouse_released(
        &mut self,
        ray: &Ray,
        scene: &Scene,
        transforms: &mut TransformStore,
    ) {
        let was_dragging =
            self.mouse.dragging || self.gizmo.interaction() == GizmoInteraction::Drag;
        self.mouse.pressed = false;
        self.mouse.dragging = false;
        self.gizmo.end_interaction();

        if was_dragging {
            return;
        }

        let hits = scene.raycast(transforms, ray);
        match hits.first() {
            Some(hit) => {
                self.selected_id = hit.unique_id;
                self.gizmo
                    .target_set(scene.transform_of(hit.unique_id), transforms);
                log::debug!("selected object {}", hit.unique_id);
            }
            None => {
                self.selected_id = INVALID_ID;
                self.gizmo.target_set(None, transforms);
            }
        }
    }

    /// Escape or focus loss: cancel any interaction in flight
    pub fn cancel_interaction(&mut self) {
        self.mouse.pressed = false;
        self.mouse.dragging = false;
        self.gizmo.end_interaction();
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}
