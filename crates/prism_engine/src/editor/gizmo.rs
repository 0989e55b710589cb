//! Transform gizmo
//!
//! Axis-constrained manipulation of a selected transform. The gizmo keeps
//! a small state machine: idle, hovering an axis, and dragging. A drag
//! stores the interaction plane containing the chosen axis; each motion
//! projects the cursor ray onto that plane and applies the delta to the
//! target according to the active mode.

use crate::foundation::math::{Aabb, Mat4, Plane, Quat, Ray, Vec3};
use crate::handle::Handle;
use crate::renderer::types::GeometryRenderData;
use crate::transform::TransformStore;
use crate::view::GizmoPacket;

/// Manipulation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoMode {
    /// Gizmo hidden, no interaction
    #[default]
    None,
    /// Translate along an axis
    Move,
    /// Rotate about an axis
    Rotate,
    /// Scale along an axis
    Scale,
}

/// Axis frame deltas are applied in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoOrientation {
    /// World axes
    #[default]
    Global,
    /// Target-rotated axes
    Local,
}

/// Interaction phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoInteraction {
    /// No cursor involvement
    #[default]
    None,
    /// Cursor over an axis handle
    Hover,
    /// Button pressed on an axis handle
    Down,
    /// Dragging
    Drag,
}

// Axis handle dimensions, in gizmo-local units
const AXIS_LENGTH: f32 = 2.0;
const AXIS_THICKNESS: f32 = 0.15;

/// The editor's transform gizmo
pub struct Gizmo {
    position: Vec3,
    rotation: Quat,
    target: Option<Handle>,
    mode: GizmoMode,
    orientation: GizmoOrientation,
    interaction: GizmoInteraction,
    current_axis: Option<usize>,
    interaction_plane: Option<Plane>,
    /// Set when the drag started against the plane's back face
    plane_back: bool,
    interaction_start: Vec3,
    last_interaction: Vec3,
    /// Screen-constant scale factor applied to the rendered geometry.
    /// Held at 1.0; a camera-distance recompute can slot in here.
    pub scale_scalar: f32,
}

impl Gizmo {
    /// Create an idle gizmo
    pub fn new() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            target: None,
            mode: GizmoMode::None,
            orientation: GizmoOrientation::Global,
            interaction: GizmoInteraction::None,
            current_axis: None,
            interaction_plane: None,
            plane_back: false,
            interaction_start: Vec3::zeros(),
            last_interaction: Vec3::zeros(),
            scale_scalar: 1.0,
        }
    }

    /// Active mode
    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    /// Set the active mode; any interaction in flight is cancelled
    pub fn mode_set(&mut self, mode: GizmoMode) {
        self.mode = mode;
        self.reset_interaction();
    }

    /// Current interaction phase
    pub fn interaction(&self) -> GizmoInteraction {
        self.interaction
    }

    /// Axis under the cursor (0 = x, 1 = y, 2 = z)
    pub fn current_axis(&self) -> Option<usize> {
        self.current_axis
    }

    /// Current orientation frame
    pub fn orientation(&self) -> GizmoOrientation {
        self.orientation
    }

    /// Cycle global -> local -> global
    pub fn orientation_cycle(&mut self, transforms: &TransformStore) {
        self.orientation = match self.orientation {
            GizmoOrientation::Global => GizmoOrientation::Local,
            GizmoOrientation::Local => GizmoOrientation::Global,
        };
        self.refresh_rotation(transforms);
    }

    /// Attach the gizmo to a target transform, or detach with `None`
    pub fn target_set(&mut self, target: Option<Handle>, transforms: &TransformStore) {
        self.target = target;
        self.reset_interaction();
        if let Some(handle) = target {
            if let Ok(world) = transforms.world_get(handle) {
                self.position = Vec3::new(world[(0, 3)], world[(1, 3)], world[(2, 3)]);
            }
        }
        self.refresh_rotation(transforms);
    }

    /// Whether a target is attached
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    fn refresh_rotation(&mut self, transforms: &TransformStore) {
        self.rotation = match (self.orientation, self.target) {
            (GizmoOrientation::Local, Some(handle)) => transforms.rotation_get(handle),
            _ => Quat::identity(),
        };
    }

    fn axis_direction(&self, axis: usize) -> Vec3 {
        let base = match axis {
            0 => Vec3::new(1.0, 0.0, 0.0),
            1 => Vec3::new(0.0, 1.0, 0.0),
            _ => Vec3::new(0.0, 0.0, 1.0),
        };
        self.rotation * base
    }

    /// Pick bounds of one axis handle, in world space
    fn axis_bounds(&self, axis: usize) -> Aabb {
        let dir = self.axis_direction(axis);
        let half = dir * (AXIS_LENGTH * 0.5 * self.scale_scalar);
        let center = self.position + half;
        let mut extents = Vec3::new(AXIS_THICKNESS, AXIS_THICKNESS, AXIS_THICKNESS)
            * self.scale_scalar;
        // Stretch the box along the axis direction, per component
        extents += half.abs();
        Aabb::from_center_extents(center, extents)
    }

    /// Axis hit test: nearest axis handle intersected by the ray
    fn hit_axis(&self, ray: &Ray) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for axis in 0..3 {
            if let Some(distance) = self.axis_bounds(axis).intersect_ray(ray) {
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((axis, distance));
                }
            }
        }
        best.map(|(axis, _)| axis)
    }

    /// Plane containing the chosen axis, facing the ray origin as much as
    /// possible so projections stay stable.
    fn interaction_plane_for(&self, axis: usize, ray: &Ray) -> (Plane, bool) {
        let dir = self.axis_direction(axis);
        // Candidate normals are the other two axes; take the one most
        // opposed to the view direction.
        let a = self.axis_direction((axis + 1) % 3);
        let b = self.axis_direction((axis + 2) % 3);
        let normal = if a.dot(&ray.direction).abs() > b.dot(&ray.direction).abs() {
            a
        } else {
            b
        };
        debug_assert!(normal.dot(&dir).abs() < 1e-4);
        let back = normal.dot(&ray.direction) > 0.0;
        (Plane::from_point_normal(self.position, normal), back)
    }

    /// Update hover state from the cursor ray while no button is down
    pub fn handle_hover(&mut self, ray: &Ray) {
        if self.mode == GizmoMode::None || matches!(self.interaction, GizmoInteraction::Drag) {
            return;
        }
        match self.hit_axis(ray) {
            Some(axis) => {
                self.current_axis = Some(axis);
                if self.interaction == GizmoInteraction::None {
                    self.interaction = GizmoInteraction::Hover;
                }
            }
            None => {
                if self.interaction == GizmoInteraction::Hover {
                    self.interaction = GizmoInteraction::None;
                    self.current_axis = None;
                }
            }
        }
    }

    /// Button press over the gizmo. Returns true when the press claimed an
    /// axis (the caller should not treat it as a selection click).
    pub fn mouse_down(&mut self, ray: &Ray) -> bool {
        if self.mode == GizmoMode::None || self.target.is_none() {
            return false;
        }
        let Some(axis) = self.hit_axis(ray) else {
            return false;
        };
        let (plane, back) = self.interaction_plane_for(axis, ray);
        let Some(start) = plane.intersect_ray(ray) else {
            return false;
        };
        self.current_axis = Some(axis);
        self.interaction_plane = Some(plane);
        self.plane_back = back;
        self.interaction_start = start;
        self.last_interaction = start;
        self.interaction = GizmoInteraction::Down;
        true
    }

    /// Drag motion; applies the projected delta to the target transform
    pub fn drag(&mut self, ray: &Ray, transforms: &mut TransformStore) {
        if !matches!(
            self.interaction,
            GizmoInteraction::Down | GizmoInteraction::Drag
        ) {
            return;
        }
        let (Some(axis), Some(plane), Some(target)) =
            (self.current_axis, self.interaction_plane, self.target)
        else {
            return;
        };
        let Some(projected) = plane.intersect_ray(ray) else {
            return;
        };
        self.interaction = GizmoInteraction::Drag;

        let delta = projected - self.last_interaction;
        let dir = self.axis_direction(axis);
        match self.mode {
            GizmoMode::Move => {
                let step = dir * delta.dot(&dir);
                if transforms.translate(target, step).is_ok() {
                    self.position += step;
                }
            }
            GizmoMode::Scale => {
                let step = delta.dot(&dir);
                let scale = transforms.scale_get(target);
                let base = match axis {
                    0 => Vec3::new(step, 0.0, 0.0),
                    1 => Vec3::new(0.0, step, 0.0),
                    _ => Vec3::new(0.0, 0.0, step),
                };
                if let Err(err) = transforms.scale_set(target, scale + base) {
                    log::warn!("gizmo scale drag lost its target: {err}");
                }
            }
            GizmoMode::Rotate => {
                let from = self.last_interaction - self.position;
                let to = projected - self.position;
                if from.norm() > 1e-6 && to.norm() > 1e-6 {
                    let mut angle = from.normalize().dot(&to.normalize()).clamp(-1.0, 1.0).acos();
                    if from.cross(&to).dot(&dir) < 0.0 {
                        angle = -angle;
                    }
                    if self.plane_back {
                        angle = -angle;
                    }
                    let spin =
                        Quat::from_axis_angle(&nalgebra::Unit::new_normalize(dir), angle);
                    if let Err(err) = transforms.rotate(target, spin) {
                        log::warn!("gizmo rotate drag lost its target: {err}");
                    }
                }
            }
            GizmoMode::None => {}
        }
        self.last_interaction = projected;
    }

    /// Button release or explicit cancel; drag state resets
    pub fn end_interaction(&mut self) {
        self.reset_interaction();
    }

    fn reset_interaction(&mut self) {
        self.interaction = GizmoInteraction::None;
        self.current_axis = None;
        self.interaction_plane = None;
        self.plane_back = false;
    }

    /// Build the editor-world packet contribution for this frame
    pub fn render_data(&self) -> Option<GizmoPacket> {
        if self.mode == GizmoMode::None || self.target.is_none() {
            return None;
        }
        let world = Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_scaling(self.scale_scalar);
        let vertex_count = match self.mode {
            GizmoMode::Move => 18,
            GizmoMode::Rotate => 3 * 64 * 2,
            GizmoMode::Scale => 24,
            GizmoMode::None => 0,
        };
        let geometry = GeometryRenderData {
            model: world,
            vertex_count,
            ..GeometryRenderData::default()
        };

        let plane_normal = if cfg!(debug_assertions) {
            self.interaction_plane.map(|_| GeometryRenderData {
                model: Mat4::new_translation(&self.position),
                vertex_count: 2,
                ..GeometryRenderData::default()
            })
        } else {
            None
        };
        Some(GizmoPacket {
            geometry,
            plane_normal,
        })
    }
}

impl Default for Gizmo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store_with_target() -> (TransformStore, Handle) {
        let mut transforms = TransformStore::with_capacity(4);
        let handle = transforms.acquire();
        // World at origin
        let local = transforms.local_get(handle).expect("local");
        transforms.world_set(handle, local).expect("world");
        (transforms, handle)
    }

    #[test]
    fn test_hover_highlights_nearest_axis() {
        let (transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        gizmo.mode_set(GizmoMode::Move);
        gizmo.target_set(Some(handle), &transforms);

        // Ray from +Z aimed at a point along the x axis handle
        let ray = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        gizmo.handle_hover(&ray);

        assert_eq!(gizmo.interaction(), GizmoInteraction::Hover);
        assert_eq!(gizmo.current_axis(), Some(0));
    }

    #[test]
    fn test_move_drag_translates_target_along_axis() {
        let (mut transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        gizmo.mode_set(GizmoMode::Move);
        gizmo.target_set(Some(handle), &transforms);

        let down = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(gizmo.mouse_down(&down));

        // Move the cursor one unit along +x
        let drag = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        gizmo.drag(&drag, &mut transforms);

        let position = transforms.position_get(handle);
        assert_relative_eq!(position, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-4);
        assert_eq!(gizmo.interaction(), GizmoInteraction::Drag);
    }

    #[test]
    fn test_drag_constrained_to_axis() {
        let (mut transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        gizmo.mode_set(GizmoMode::Move);
        gizmo.target_set(Some(handle), &transforms);

        let down = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(gizmo.mouse_down(&down));

        // Diagonal motion: only the x component may apply
        let drag = Ray::new(Vec3::new(2.0, 1.5, 5.0), Vec3::new(0.0, 0.0, -1.0));
        gizmo.drag(&drag, &mut transforms);

        let position = transforms.position_get(handle);
        assert_relative_eq!(position.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(position.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_end_interaction_resets_state() {
        let (mut transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        gizmo.mode_set(GizmoMode::Move);
        gizmo.target_set(Some(handle), &transforms);

        let down = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(gizmo.mouse_down(&down));
        gizmo.drag(
            &Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0)),
            &mut transforms,
        );
        gizmo.end_interaction();

        assert_eq!(gizmo.interaction(), GizmoInteraction::None);
        assert_eq!(gizmo.current_axis(), None);
    }

    #[test]
    fn test_miss_does_not_claim_press() {
        let (transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        gizmo.mode_set(GizmoMode::Move);
        gizmo.target_set(Some(handle), &transforms);

        let ray = Ray::new(Vec3::new(50.0, 50.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!gizmo.mouse_down(&ray));
        assert_eq!(gizmo.interaction(), GizmoInteraction::None);
    }

    #[test]
    fn test_render_data_only_with_mode_and_target() {
        let (transforms, handle) = store_with_target();
        let mut gizmo = Gizmo::new();
        assert!(gizmo.render_data().is_none());

        gizmo.mode_set(GizmoMode::Move);
        assert!(gizmo.render_data().is_none());

        gizmo.target_set(Some(handle), &transforms);
        assert!(gizmo.render_data().is_some());
    }
}
