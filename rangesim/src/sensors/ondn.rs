//! Models with arbitrary, explicitly listed rays. `O1DnModel` casts every ray from one shared
//! origin while `OnDnModel` gives each ray its own origin. Rays are stored row-major, so the ray at
//! row `vid` and column `hid` is element `vid * width + hid`.

use super::RayModel;
use crate::common::Interval;
use crate::errors::RaycastError;
use crate::{Point3, Result, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct O1DnModel {
    pub origin: Point3,
    pub directions: Vec<Vector3>,
    pub width: u32,
    pub height: u32,
    pub range: Interval,
}

impl O1DnModel {
    /// Create a model from a shared origin and `width * height` ray directions, which are
    /// normalized on the way in.
    pub fn try_new(
        origin: Point3,
        directions: Vec<Vector3>,
        width: u32,
        height: u32,
        range: Interval,
    ) -> Result<Self> {
        let model = Self {
            origin,
            directions: normalized(directions)?,
            width,
            height,
            range,
        };
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_len("directions", self.directions.len(), self.width, self.height)?;
        check_units(&self.directions)
    }
}

impl RayModel for O1DnModel {
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
        self.origin
    }

    fn direction(&self, vid: usize, hid: usize) -> Vector3 {
        self.directions[self.buffer_id(vid, hid)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDnModel {
    pub origins: Vec<Point3>,
    pub directions: Vec<Vector3>,
    pub width: u32,
    pub height: u32,
    pub range: Interval,
}

impl OnDnModel {
    /// Create a model from `width * height` origins and as many directions, which are normalized
    /// on the way in.
    pub fn try_new(
        origins: Vec<Point3>,
        directions: Vec<Vector3>,
        width: u32,
        height: u32,
        range: Interval,
    ) -> Result<Self> {
        let model = Self {
            origins,
            directions: normalized(directions)?,
            width,
            height,
            range,
        };
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_len("origins", self.origins.len(), self.width, self.height)?;
        check_len("directions", self.directions.len(), self.width, self.height)?;
        check_units(&self.directions)
    }
}

impl RayModel for OnDnModel {
    fn width(&self) -> usize {
        self.width as usize
    }

    fn height(&self) -> usize {
        self.height as usize
    }

    fn range(&self) -> Interval {
        self.range
    }

    fn origin(&self, vid: usize, hid: usize) -> Point3 {
        self.origins[self.buffer_id(vid, hid)]
    }

    fn direction(&self, vid: usize, hid: usize) -> Vector3 {
        self.directions[self.buffer_id(vid, hid)]
    }
}

fn normalized(directions: Vec<Vector3>) -> Result<Vec<Vector3>> {
    directions
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            d.try_normalize(1e-12).ok_or_else(|| {
                RaycastError::config(format!("direction {} has zero length", i))
            })
        })
        .collect()
}

fn check_len(what: &str, len: usize, width: u32, height: u32) -> Result<()> {
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(RaycastError::config(format!(
            "{} {} were given for a {}x{} model",
            len, what, width, height
        )));
    }
    Ok(())
}

fn check_units(directions: &[Vector3]) -> Result<()> {
    match directions
        .iter()
        .position(|d| (d.norm() - 1.0).abs() > 1e-6)
    {
        Some(i) => Err(RaycastError::config(format!(
            "direction {} is not a unit vector",
            i
        ))),
        None => Ok(()),
    }
}
