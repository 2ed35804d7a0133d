//! Sensor models describe the bundle of rays a sensor casts, in the sensor's own frame. The
//! samples of a model form a `height` x `width` grid, addressed by a vertical id (row) and a
//! horizontal id (column), and stored row-major in result buffers.

mod ondn;
mod pinhole;
mod spherical;

use crate::common::Interval;
use crate::errors::RaycastError;
use crate::{Point3, Result, Vector3};
use serde::{Deserialize, Serialize};

pub use ondn::{O1DnModel, OnDnModel};
pub use pinhole::PinholeModel;
pub use spherical::SphericalModel;

/// A bundle of rays in the sensor frame.
pub trait RayModel {
    /// Number of columns (horizontal ids).
    fn width(&self) -> usize;

    /// Number of rows (vertical ids).
    fn height(&self) -> usize;

    /// The valid measurement range. Hits closer than `min` are ignored and hits beyond `max`
    /// are reported as misses.
    fn range(&self) -> Interval;

    fn origin(&self, vid: usize, hid: usize) -> Point3;

    /// The unit direction of the ray at the given row and column.
    fn direction(&self, vid: usize, hid: usize) -> Vector3;

    fn size(&self) -> usize {
        self.width() * self.height()
    }

    fn buffer_id(&self, vid: usize, hid: usize) -> usize {
        vid * self.width() + hid
    }

    /// The origin and direction of the ray stored at the given buffer index.
    fn ray(&self, buffer_id: usize) -> (Point3, Vector3) {
        let vid = buffer_id / self.width();
        let hid = buffer_id % self.width();
        (self.origin(vid, hid), self.direction(vid, hid))
    }
}

/// Any one of the supported sensor models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorModel {
    Spherical(SphericalModel),
    Pinhole(PinholeModel),
    #[serde(rename = "o1dn")]
    O1Dn(O1DnModel),
    #[serde(rename = "ondn")]
    OnDn(OnDnModel),
}

macro_rules! dispatch {
    ($self:ident, $m:ident => $e:expr) => {
        match $self {
            SensorModel::Spherical($m) => $e,
            SensorModel::Pinhole($m) => $e,
            SensorModel::O1Dn($m) => $e,
            SensorModel::OnDn($m) => $e,
        }
    };
}

impl SensorModel {
    pub fn from_json(json: &str) -> Result<Self> {
        let model: SensorModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check that the model describes at least one ray, that its range is valid, and that its
    /// per-ray buffers (if any) match its dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.size() == 0 {
            return Err(RaycastError::config("sensor model has no rays"));
        }
        if !self.range().is_valid() {
            return Err(RaycastError::config(format!(
                "sensor model has an invalid range {:?}",
                self.range()
            )));
        }
        match self {
            SensorModel::Pinhole(m) => m.validate(),
            SensorModel::O1Dn(m) => m.validate(),
            SensorModel::OnDn(m) => m.validate(),
            SensorModel::Spherical(_) => Ok(()),
        }
    }
}

impl RayModel for SensorModel {
    fn width(&self) -> usize {
        dispatch!(self, m => m.width())
    }

    fn height(&self) -> usize {
        dispatch!(self, m => m.height())
    }

    fn range(&self) -> Interval {
        dispatch!(self, m => m.range())
    }

    fn origin(&self, vid: usize, hid: usize) -> Point3 {
        dispatch!(self, m => m.origin(vid, hid))
    }

    fn direction(&self, vid: usize, hid: usize) -> Vector3 {
        dispatch!(self, m => m.direction(vid, hid))
    }
}

impl From<SphericalModel> for SensorModel {
    fn from(value: SphericalModel) -> Self {
        SensorModel::Spherical(value)
    }
}

impl From<PinholeModel> for SensorModel {
    fn from(value: PinholeModel) -> Self {
        SensorModel::Pinhole(value)
    }
}

impl From<O1DnModel> for SensorModel {
    fn from(value: O1DnModel) -> Self {
        SensorModel::O1Dn(value)
    }
}

impl From<OnDnModel> for SensorModel {
    fn from(value: OnDnModel) -> Self {
        SensorModel::OnDn(value)
    }
}
