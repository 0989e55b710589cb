//! Distance attenuation
//!
//! Gain falloff for 3D emitters. Inside the inner radius a source plays at
//! full volume; beyond the outer radius it is silent; between the two the
//! configured model shapes the rolloff.

use serde::Deserialize;

/// Rolloff shape between the inner and outer radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AttenuationModel {
    /// Gain falls linearly from 1.0 to 0.0
    #[default]
    Linear,
    /// Gain falls as `(1 - t)^falloff`
    Exponential,
}

/// Gain multiplier for a listener at `distance` from the emitter.
///
/// `falloff` only shapes the exponential model. A degenerate radius pair
/// (outer <= inner) snaps to full volume inside and silence outside.
pub fn attenuation(
    distance: f32,
    inner_radius: f32,
    outer_radius: f32,
    falloff: f32,
    model: AttenuationModel,
) -> f32 {
    // Outer wins the degenerate overlap (outer <= inner): silence at the
    // outer boundary holds even when both radii coincide.
    if distance >= outer_radius {
        return 0.0;
    }
    if distance <= inner_radius {
        return 1.0;
    }
    let t = (distance - inner_radius) / (outer_radius - inner_radius);
    match model {
        AttenuationModel::Linear => 1.0 - t,
        AttenuationModel::Exponential => (1.0 - t).powf(falloff.max(0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inside_inner_radius_full_volume() {
        assert_relative_eq!(
            attenuation(1.0, 2.0, 10.0, 1.0, AttenuationModel::Linear),
            1.0
        );
    }

    #[test]
    fn test_beyond_outer_radius_silent() {
        assert_relative_eq!(
            attenuation(12.0, 2.0, 10.0, 1.0, AttenuationModel::Linear),
            0.0
        );
    }

    #[test]
    fn test_linear_midpoint() {
        assert_relative_eq!(
            attenuation(6.0, 2.0, 10.0, 1.0, AttenuationModel::Linear),
            0.5
        );
    }

    #[test]
    fn test_exponential_falls_faster_than_linear() {
        let linear = attenuation(6.0, 2.0, 10.0, 2.0, AttenuationModel::Linear);
        let exponential = attenuation(6.0, 2.0, 10.0, 2.0, AttenuationModel::Exponential);
        assert!(exponential < linear);
        assert_relative_eq!(exponential, 0.25);
    }

    #[test]
    fn test_degenerate_radii_snap() {
        assert_relative_eq!(
            attenuation(1.0, 5.0, 5.0, 1.0, AttenuationModel::Linear),
            1.0
        );
        assert_relative_eq!(
            attenuation(5.0, 5.0, 5.0, 1.0, AttenuationModel::Linear),
            0.0
        );
    }
}
