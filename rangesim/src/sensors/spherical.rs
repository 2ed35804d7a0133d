use super::RayModel;
use crate::common::{DiscreteInterval, Interval};
use crate::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A rotating LiDAR style model. All rays start at the sensor origin, with elevation `phi`
/// sampled along the rows and azimuth `theta` sampled along the columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalModel {
    /// Vertical angle (elevation above the xy plane), one value per row
    pub phi: DiscreteInterval,

    /// Horizontal angle (azimuth about z, from +x towards +y), one value per column
    pub theta: DiscreteInterval,

    pub range: Interval,
}

impl SphericalModel {
    pub fn new(phi: DiscreteInterval, theta: DiscreteInterval, range: Interval) -> Self {
        Self { phi, theta, range }
    }

    /// A 16 channel spinning LiDAR with a 30 degree vertical field of view and 900 columns per
    /// revolution.
    pub fn vlp16_900() -> Self {
        let phi_max = 15.0_f64.to_radians();
        let theta_step = 0.4_f64.to_radians();
        Self::new(
            DiscreteInterval::new(-phi_max, phi_max, 16),
            DiscreteInterval::new(-std::f64::consts::PI, std::f64::consts::PI - theta_step, 900),
            Interval::new(0.5, 130.0),
        )
    }

    pub fn phi(&self, vid: usize) -> f64 {
        self.phi.value(vid as u32)
    }

    pub fn theta(&self, hid: usize) -> f64 {
        self.theta.value(hid as u32)
    }
}

impl RayModel for SphericalModel {
    fn width(&self) -> usize {
        self.theta.size as usize
    }

    fn height(&self) -> usize {
        self.phi.size as usize
    }

    fn range(&self) -> Interval {
        self.range
    }

    fn origin(&self, _vid: usize, _hid: usize) -> Point3 {
        Point3::origin()
    }

    fn direction(&self, vid: usize, hid: usize) -> Vector3 {
        let (sp, cp) = self.phi(vid).sin_cos();
        let (st, ct) = self.theta(hid).sin_cos();
        Vector3::new(cp * ct, cp * st, sp)
    }
}
