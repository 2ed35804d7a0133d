use crate::errors::RaycastError;
use crate::{Point3, Result, Vector3};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// The per-sample values a simulation can produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Attributes: u32 {
        const HITS = 1;
        const RANGES = 1 << 1;
        const POINTS = 1 << 2;
        const NORMALS = 1 << 3;
        const FACE_IDS = 1 << 4;
        const GEOM_IDS = 1 << 5;
        const OBJECT_IDS = 1 << 6;
    }
}

/// Output buffers of a simulation. Only attributes with a buffer present are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationBuffers {
    pub hits: Option<Vec<bool>>,
    pub ranges: Option<Vec<f64>>,
    pub points: Option<Vec<Point3>>,
    pub normals: Option<Vec<Vector3>>,
    pub face_ids: Option<Vec<u32>>,
    pub geom_ids: Option<Vec<u32>>,
    pub object_ids: Option<Vec<u32>>,
}

/// The result of casting a single ray.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    pub hit: bool,
    pub range: f64,
    pub point: Point3,
    pub normal: Vector3,
    pub face_id: u32,
    pub geom_id: u32,
    pub object_id: u32,
}

impl SimulationBuffers {
    /// Allocate a buffer of `len` default values for each requested attribute.
    pub fn allocate(attributes: Attributes, len: usize) -> Self {
        fn alloc<T: Clone>(
            attributes: Attributes,
            flag: Attributes,
            fill: T,
            len: usize,
        ) -> Option<Vec<T>> {
            attributes.contains(flag).then(|| vec![fill; len])
        }

        Self {
            hits: alloc(attributes, Attributes::HITS, false, len),
            ranges: alloc(attributes, Attributes::RANGES, 0.0, len),
            points: alloc(attributes, Attributes::POINTS, Point3::origin(), len),
            normals: alloc(attributes, Attributes::NORMALS, Vector3::zeros(), len),
            face_ids: alloc(attributes, Attributes::FACE_IDS, 0, len),
            geom_ids: alloc(attributes, Attributes::GEOM_IDS, 0, len),
            object_ids: alloc(attributes, Attributes::OBJECT_IDS, 0, len),
        }
    }

    /// The attributes which have a buffer present.
    pub fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::empty();
        attributes.set(Attributes::HITS, self.hits.is_some());
        attributes.set(Attributes::RANGES, self.ranges.is_some());
        attributes.set(Attributes::POINTS, self.points.is_some());
        attributes.set(Attributes::NORMALS, self.normals.is_some());
        attributes.set(Attributes::FACE_IDS, self.face_ids.is_some());
        attributes.set(Attributes::GEOM_IDS, self.geom_ids.is_some());
        attributes.set(Attributes::OBJECT_IDS, self.object_ids.is_some());
        attributes
    }

    fn lengths(&self) -> [(&'static str, Option<usize>); 7] {
        [
            ("hits", self.hits.as_ref().map(Vec::len)),
            ("ranges", self.ranges.as_ref().map(Vec::len)),
            ("points", self.points.as_ref().map(Vec::len)),
            ("normals", self.normals.as_ref().map(Vec::len)),
            ("face_ids", self.face_ids.as_ref().map(Vec::len)),
            ("geom_ids", self.geom_ids.as_ref().map(Vec::len)),
            ("object_ids", self.object_ids.as_ref().map(Vec::len)),
        ]
    }

    /// Check that every present buffer holds exactly `len` entries.
    pub(crate) fn check_len(&self, len: usize) -> Result<()> {
        for (name, actual) in self.lengths() {
            if let Some(actual) = actual {
                if actual != len {
                    return Err(RaycastError::config(format!(
                        "the {} buffer has {} entries, but the simulation produces {}",
                        name, actual, len
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write samples into the present buffers, starting at index 0.
    pub(crate) fn fill(&mut self, samples: &[Sample]) {
        fn write<T>(buffer: &mut Option<Vec<T>>, samples: &[Sample], f: impl Fn(&Sample) -> T) {
            if let Some(buffer) = buffer {
                for (dst, s) in buffer.iter_mut().zip(samples) {
                    *dst = f(s);
                }
            }
        }

        write(&mut self.hits, samples, |s| s.hit);
        write(&mut self.ranges, samples, |s| s.range);
        write(&mut self.points, samples, |s| s.point);
        write(&mut self.normals, samples, |s| s.normal);
        write(&mut self.face_ids, samples, |s| s.face_id);
        write(&mut self.geom_ids, samples, |s| s.geom_id);
        write(&mut self.object_ids, samples, |s| s.object_id);
    }
}
