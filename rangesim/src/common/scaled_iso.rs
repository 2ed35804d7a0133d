//! A rigid transform combined with a non-uniform scale, applied scale first.

use crate::{Iso3, Point3, Vector3};
use parry3d_f64::bounding_volume::Aabb;
use serde::{Deserialize, Serialize};

const MIN_SCALE: f64 = 1e-12;

/// A rigid pose with a non-uniform scale. A point is scaled component-wise in the local frame and
/// then moved by the isometry, so `x' = R * (s ∘ x) + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledIso3 {
    pub iso: Iso3,
    pub scale: Vector3,
}

impl Default for ScaledIso3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl ScaledIso3 {
    pub fn new(iso: Iso3, scale: Vector3) -> Self {
        Self { iso, scale }
    }

    pub fn identity() -> Self {
        Self {
            iso: Iso3::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// True if any scale component is zero (or close enough to it) or not finite, in which case
    /// the transform cannot be inverted.
    pub fn is_degenerate(&self) -> bool {
        self.scale
            .iter()
            .any(|s| !s.is_finite() || s.abs() < MIN_SCALE)
    }

    pub fn transform_point(&self, p: &Point3) -> Point3 {
        self.iso * Point3::from(p.coords.component_mul(&self.scale))
    }

    pub fn transform_vector(&self, v: &Vector3) -> Vector3 {
        self.iso.rotation * v.component_mul(&self.scale)
    }

    /// Transform a surface normal with the inverse transpose of the linear part, re-normalizing
    /// the result. A zero normal stays zero.
    pub fn transform_normal(&self, n: &Vector3) -> Vector3 {
        (self.iso.rotation * n.component_div(&self.scale))
            .try_normalize(MIN_SCALE)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn inverse_transform_point(&self, p: &Point3) -> Point3 {
        Point3::from(
            self.iso
                .inverse_transform_point(p)
                .coords
                .component_div(&self.scale),
        )
    }

    /// Moves a vector into the local frame without re-normalizing it, so that a ray parameter
    /// measured in the parent frame is the same as the one measured in the local frame.
    pub fn inverse_transform_vector(&self, v: &Vector3) -> Vector3 {
        self.iso.inverse_transform_vector(v).component_div(&self.scale)
    }

    /// The axis aligned bounding box, in the parent frame, of a box given in the local frame.
    pub fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        let corners = aabb.vertices().map(|c| self.transform_point(&c));
        Aabb::from_points(corners.iter())
    }
}
