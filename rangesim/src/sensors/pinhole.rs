use super::RayModel;
use crate::common::Interval;
use crate::errors::RaycastError;
use crate::{Point3, Result, Vector3};
use serde::{Deserialize, Serialize};

/// A pinhole (depth) camera. Pixel coordinates follow the usual optical convention of `u` along
/// the columns and `v` down the rows, with the optical axis looking along +x of the sensor frame,
/// so that the camera is a drop-in replacement for a LiDAR mounted in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeModel {
    pub width: u32,
    pub height: u32,
    pub range: Interval,

    /// Focal lengths `[fx, fy]` in pixels
    pub f: [f64; 2],

    /// Principal point `[cx, cy]` in pixels
    pub c: [f64; 2],
}

impl PinholeModel {
    pub fn new(width: u32, height: u32, f: [f64; 2], c: [f64; 2], range: Interval) -> Self {
        Self {
            width,
            height,
            range,
            f,
            c,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.f.iter().any(|f| *f == 0.0 || !f.is_finite()) {
            return Err(RaycastError::config(format!(
                "pinhole focal lengths {:?} must be finite and non-zero",
                self.f
            )));
        }
        Ok(())
    }
}

impl RayModel for PinholeModel {
    fn width(&self) -> usize {
        self.width as usize
    }

    fn height(&self) -> usize {
        self.height as usize
    }

    fn range(&self) -> Interval {
        self.range
    }

    fn origin(&self, _vid: usize, _hid: usize) -> Point3 {
        Point3::origin()
    }

    fn direction(&self, vid: usize, hid: usize) -> Vector3 {
        let x = (hid as f64 - self.c[0]) / self.f[0];
        let y = (vid as f64 - self.c[1]) / self.f[1];

        // Optical frame (x right, y down, z forward) to sensor frame (x forward, y left, z up)
        Vector3::new(1.0, -x, -y).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PinholeModel {
        PinholeModel::new(
            200,
            150,
            [100.0, 100.0],
            [100.0, 75.0],
            Interval::new(0.0, 100.0),
        )
    }

    #[test]
    fn principal_point_looks_forward() {
        assert_relative_eq!(camera().direction(75, 100), Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn top_left_pixel_looks_up_and_left() {
        let d = camera().direction(0, 0);
        let expected = Vector3::new(1.0, 1.0, 0.75).normalize();
        assert_relative_eq!(d, expected, epsilon = 1e-12);
    }

    #[test]
    fn zero_focal_length_is_invalid() {
        let mut c = camera();
        c.f[1] = 0.0;
        assert!(c.validate().unwrap_err().is_configuration());
    }
}
