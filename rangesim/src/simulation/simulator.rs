use super::buffers::Sample;
use super::{Attributes, OutputFrame, PendingSimulation, SimulationBuffers, SimulatorConfig};
use crate::errors::RaycastError;
use crate::map::{Scene, SceneHandle, INVALID_ID};
use crate::sensors::{RayModel, SensorModel};
use crate::{Iso3, Result, Vector3};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

/// Casts the rays of a sensor model against a committed map.
///
/// The simulator owns a worker pool. `simulate*` calls block the calling thread while the pool
/// does the work, while `launch*` calls return immediately with a `PendingSimulation`. Both read a
/// snapshot of the map taken when the call is made, so the map may be edited and re-committed
/// while a launched simulation is still running.
pub struct Simulator {
    config: SimulatorConfig,
    pool: ThreadPool,
    map: Option<Arc<Scene>>,
    model: Option<Arc<SensorModel>>,
    tsb: Iso3,
}

/// Everything needed to compute samples, detached from the simulator so that it can be moved to
/// a worker.
struct Kernel {
    handle: SceneHandle,
    model: Arc<SensorModel>,
    tsb: Iso3,
    frame: OutputFrame,
}

impl Simulator {
    pub fn new() -> Result<Self> {
        Self::try_new(SimulatorConfig::default())
    }

    /// Create a simulator and its worker pool. Fails if the pool cannot be started.
    pub fn try_new(config: SimulatorConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("rangesim-{}", i))
            .build()
            .map_err(|e| RaycastError::backend(format!("failed to start worker pool: {}", e)))?;
        log::debug!(
            "simulator started with {} threads",
            pool.current_num_threads()
        );

        Ok(Self {
            config,
            pool,
            map: None,
            model: None,
            tsb: Iso3::identity(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn set_output_frame(&mut self, frame: OutputFrame) {
        self.config.output_frame = frame;
    }

    /// Set the scene to simulate against. It must be committed by the time a simulation runs.
    pub fn set_map(&mut self, map: Arc<Scene>) {
        self.map = Some(map);
    }

    pub fn map(&self) -> Option<&Arc<Scene>> {
        self.map.as_ref()
    }

    /// Set the pose of the sensor in the body frame.
    pub fn set_tsb(&mut self, tsb: Iso3) {
        self.tsb = tsb;
    }

    pub fn tsb(&self) -> Iso3 {
        self.tsb
    }

    /// Set the sensor model, failing if it is not valid.
    pub fn set_model(&mut self, model: impl Into<SensorModel>) -> Result<()> {
        let model = model.into();
        model.validate()?;
        self.model = Some(Arc::new(model));
        Ok(())
    }

    pub fn model(&self) -> Option<&SensorModel> {
        self.model.as_deref()
    }

    /// Simulate into caller owned buffers. Every present buffer is written and must hold exactly
    /// `poses.len() * model.size()` entries.
    ///
    /// # Arguments
    ///
    /// * `poses`: poses of the body in the map frame
    /// * `buffers`: the output buffers, whose presence selects the attributes to compute
    ///
    /// returns: Result<(), RaycastError>
    pub fn simulate(&self, poses: &[Iso3], buffers: &mut SimulationBuffers) -> Result<()> {
        let kernel = self.kernel()?;
        buffers.check_len(poses.len() * kernel.model.size())?;
        if buffers.attributes().is_empty() {
            return Ok(());
        }

        let samples = self.pool.install(|| kernel.run(poses));
        buffers.fill(&samples);
        Ok(())
    }

    /// Simulate into newly allocated buffers for the requested attributes.
    pub fn simulate_new(
        &self,
        poses: &[Iso3],
        attributes: Attributes,
    ) -> Result<SimulationBuffers> {
        let size = self.require_model()?.size();
        let mut buffers = SimulationBuffers::allocate(attributes, poses.len() * size);
        self.simulate(poses, &mut buffers)?;
        Ok(buffers)
    }

    pub fn simulate_ranges(&self, poses: &[Iso3]) -> Result<Vec<f64>> {
        let buffers = self.simulate_new(poses, Attributes::RANGES)?;
        Ok(buffers.ranges.unwrap_or_default())
    }

    pub fn simulate_hits(&self, poses: &[Iso3]) -> Result<Vec<bool>> {
        let buffers = self.simulate_new(poses, Attributes::HITS)?;
        Ok(buffers.hits.unwrap_or_default())
    }

    /// Start a simulation on the worker pool and return immediately. Configuration errors are
    /// reported here, before anything is launched.
    pub fn launch(&self, poses: Vec<Iso3>, attributes: Attributes) -> Result<PendingSimulation> {
        let size = self.require_model()?.size();
        let buffers = SimulationBuffers::allocate(attributes, poses.len() * size);
        self.launch_into(poses, buffers)
    }

    /// Start a simulation on the worker pool which fills the given buffers, handing them back
    /// through the returned `PendingSimulation`.
    pub fn launch_into(
        &self,
        poses: Vec<Iso3>,
        mut buffers: SimulationBuffers,
    ) -> Result<PendingSimulation> {
        let kernel = self.kernel()?;
        buffers.check_len(poses.len() * kernel.model.size())?;

        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.pool.spawn(move || {
            if !buffers.attributes().is_empty() {
                let samples = kernel.run(&poses);
                buffers.fill(&samples);
            }
            // The receiver may have been dropped, in which case nobody wants the result
            let _ = sender.send(buffers);
        });

        Ok(PendingSimulation::new(receiver))
    }

    fn require_model(&self) -> Result<&Arc<SensorModel>> {
        self.model
            .as_ref()
            .ok_or_else(|| RaycastError::config("no sensor model was set"))
    }

    fn kernel(&self) -> Result<Kernel> {
        let model = self.require_model()?.clone();
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| RaycastError::config("no map was set"))?;
        let handle = map.handle().ok_or_else(|| {
            RaycastError::config("the map has changed since it was last committed")
        })?;

        Ok(Kernel {
            handle,
            model,
            tsb: self.tsb,
            frame: self.config.output_frame,
        })
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("config", &self.config)
            .field("map", &self.map.as_ref().map(|m| m.uuid()))
            .field("model", &self.model)
            .field("tsb", &self.tsb)
            .finish()
    }
}

impl Kernel {
    /// Compute every sample of every pose in parallel on the current pool, pose-major.
    fn run(&self, poses: &[Iso3]) -> Vec<Sample> {
        let size = self.model.size();
        (0..poses.len() * size)
            .into_par_iter()
            .map(|i| self.sample(&poses[i / size], i % size))
            .collect()
    }

    fn sample(&self, tbm: &Iso3, index: usize) -> Sample {
        let tsm = tbm * self.tsb;
        let (origin_s, dir_s) = self.model.ray(index);
        let origin = tsm * origin_s;
        let dir = tsm.rotation * dir_s;
        let range = self.model.range();

        let hit = self.handle.intersect(&origin, &dir, range.min, range.max);
        let distance = hit.map_or(range.max + 1.0, |h| h.range);
        let (point, normal) = match (self.frame, &hit) {
            (OutputFrame::Sensor, Some(h)) => (
                origin_s + dir_s * distance,
                tsm.inverse_transform_vector(&h.normal),
            ),
            (OutputFrame::Sensor, None) => (origin_s + dir_s * distance, Vector3::zeros()),
            (OutputFrame::Map, Some(h)) => (origin + dir * distance, h.normal),
            (OutputFrame::Map, None) => (origin + dir * distance, Vector3::zeros()),
        };

        Sample {
            hit: hit.is_some(),
            range: distance,
            point,
            normal,
            face_id: hit.map_or(INVALID_ID, |h| h.face_id),
            geom_id: hit.map_or(INVALID_ID, |h| h.geom_id),
            object_id: hit.map_or(INVALID_ID, |h| h.object_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DiscreteInterval, Interval};
    use crate::map::{Instance, Mesh};
    use crate::sensors::{PinholeModel, SphericalModel};
    use crate::Point3;
    use approx::assert_relative_eq;
    use parry3d_f64::na::{Translation3, UnitQuaternion};
    use rand::Rng;

    fn room() -> Arc<Scene> {
        let scene = Scene::new();
        let cube = Mesh::cube();
        cube.set_scale(Vector3::new(10.0, 10.0, 10.0));
        cube.apply().unwrap();
        cube.commit().unwrap();
        scene.add(cube);
        scene.commit().unwrap();
        scene
    }

    fn lidar() -> SphericalModel {
        SphericalModel::new(
            DiscreteInterval::new(-0.4, 0.35, 7),
            DiscreteInterval::new(-3.0, 3.1, 37),
            Interval::new(0.1, 50.0),
        )
    }

    fn pose() -> Iso3 {
        Iso3::from_parts(
            Translation3::new(1.1, 0.53, 0.31),
            UnitQuaternion::from_euler_angles(0.05, -0.08, 0.7),
        )
    }

    fn simulator(map: Arc<Scene>) -> Simulator {
        let mut sim = Simulator::new().unwrap();
        sim.set_map(map);
        sim.set_model(lidar()).unwrap();
        sim
    }

    #[test]
    fn fails_fast_without_model_or_map() {
        let mut sim = Simulator::new().unwrap();
        let poses = [Iso3::identity()];
        assert!(sim.simulate_ranges(&poses).unwrap_err().is_configuration());

        sim.set_model(lidar()).unwrap();
        assert!(sim.simulate_ranges(&poses).unwrap_err().is_configuration());

        let scene = Scene::new();
        scene.add(Mesh::cube());
        sim.set_map(scene);
        assert!(sim.simulate_ranges(&poses).unwrap_err().is_configuration());
        assert!(sim
            .launch(poses.to_vec(), Attributes::RANGES)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn rejects_invalid_model() {
        let mut sim = Simulator::new().unwrap();
        let mut model = lidar();
        model.range = Interval::new(5.0, 1.0);
        assert!(sim.set_model(model).unwrap_err().is_configuration());
        assert!(sim.model().is_none());
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let sim = simulator(room());
        let mut buffers = SimulationBuffers::allocate(Attributes::RANGES, 10);
        let result = sim.simulate(&[Iso3::identity()], &mut buffers);
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn round_trip_inside_room() {
        let mut sim = simulator(room());
        let poses = [pose()];
        let n = lidar().size();

        let sensor = sim.simulate_new(&poses, Attributes::all()).unwrap();
        sim.set_output_frame(OutputFrame::Map);
        let map = sim
            .simulate_new(&poses, Attributes::POINTS | Attributes::NORMALS)
            .unwrap();

        let hits = sensor.hits.unwrap();
        let ranges = sensor.ranges.unwrap();
        let points = sensor.points.unwrap();
        let normals = sensor.normals.unwrap();
        let map_points = map.points.unwrap();
        let map_normals = map.normals.unwrap();
        assert_eq!(ranges.len(), n);

        for i in 0..n {
            assert!(hits[i]);
            assert_eq!(sensor.geom_ids.as_ref().unwrap()[i], 0);
            assert_eq!(sensor.object_ids.as_ref().unwrap()[i], 0);
            assert!(sensor.face_ids.as_ref().unwrap()[i] < 12);

            // The sensor frame point is the ray evaluated at the range
            let (_, d) = lidar().ray(i);
            assert_relative_eq!(points[i], Point3::from(d * ranges[i]), epsilon = 1e-4);

            // The map frame point lies on a wall of the room
            let p = map_points[i];
            let extent = p.coords.abs().max();
            assert_relative_eq!(extent, 5.0, epsilon = 1e-4);
            assert_relative_eq!(poses[0] * points[i], p, epsilon = 1e-4);

            // Normals face back toward the sensor in both frames
            assert!(normals[i].dot(&d) < 0.0);
            assert_relative_eq!(poses[0].rotation * normals[i], map_normals[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn misses_use_sentinels() {
        let scene = Scene::new();
        let cube = Mesh::cube();
        cube.set_transform(Iso3::translation(0.0, 0.0, -20.0));
        cube.apply().unwrap();
        cube.commit().unwrap();
        scene.add(cube);
        scene.commit().unwrap();

        // Looking along the horizon, nothing is below the sensor within the vertical field
        let mut sim = simulator(scene);
        sim.set_model(SphericalModel::new(
            DiscreteInterval::new(0.0, 0.2, 3),
            DiscreteInterval::new(-3.0, 3.0, 11),
            Interval::new(0.0, 30.0),
        ))
        .unwrap();
        let buffers = sim.simulate_new(&[Iso3::identity()], Attributes::all()).unwrap();

        assert!(buffers.hits.unwrap().iter().all(|h| !h));
        assert!(buffers.ranges.unwrap().iter().all(|r| *r == 31.0));
        assert!(buffers.normals.unwrap().iter().all(|n| *n == Vector3::zeros()));
        for ids in [buffers.face_ids, buffers.geom_ids, buffers.object_ids] {
            assert!(ids.unwrap().iter().all(|id| *id == INVALID_ID));
        }
        for p in buffers.points.unwrap() {
            assert_relative_eq!(p.coords.norm(), 31.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn min_range_skips_close_hits() {
        let scene = Scene::new();
        for x in [2.0, 6.0] {
            let plane = Mesh::plane();
            plane.set_scale(Vector3::new(10.0, 10.0, 1.0));
            plane.set_transform(Iso3::from_parts(
                Translation3::new(x, 0.0, 0.0),
                UnitQuaternion::from_euler_angles(0.0, std::f64::consts::FRAC_PI_2, 0.0),
            ));
            plane.apply().unwrap();
            plane.commit().unwrap();
            scene.add(plane);
        }
        scene.commit().unwrap();

        let mut sim = simulator(scene);
        let model = PinholeModel::new(1, 1, [1.0, 1.0], [0.1, 0.2], Interval::new(3.0, 10.0));
        sim.set_model(model).unwrap();
        let buffers = sim
            .simulate_new(&[Iso3::identity()], Attributes::RANGES | Attributes::GEOM_IDS)
            .unwrap();

        let d = model.direction(0, 0);
        assert_relative_eq!(buffers.ranges.unwrap()[0], 6.0 / d.x, epsilon = 1e-9);
        assert_eq!(buffers.geom_ids.unwrap()[0], 1);
    }

    #[test]
    fn identical_poses_identical_samples() {
        let sim = simulator(room());
        let poses = vec![pose(); 100];
        let buffers = sim
            .simulate_new(&poses, Attributes::RANGES | Attributes::NORMALS | Attributes::FACE_IDS)
            .unwrap();

        let n = lidar().size();
        let ranges = buffers.ranges.unwrap();
        let normals = buffers.normals.unwrap();
        let faces = buffers.face_ids.unwrap();
        for p in 1..100 {
            for s in 0..n {
                assert_eq!(ranges[p * n + s], ranges[s]);
                assert_eq!(normals[p * n + s], normals[s]);
                assert_eq!(faces[p * n + s], faces[s]);
            }
        }
    }

    #[test]
    fn instanced_matches_direct() {
        let placements = [
            (
                Iso3::from_parts(
                    Translation3::new(6.0, -1.0, 0.5),
                    UnitQuaternion::from_euler_angles(0.2, 0.1, -0.4),
                ),
                Vector3::new(2.0, 3.0, 1.5),
            ),
            (
                Iso3::from_parts(
                    Translation3::new(-5.0, 4.0, -0.5),
                    UnitQuaternion::from_euler_angles(-0.3, 0.0, 1.1),
                ),
                Vector3::new(2.0, 2.0, 2.0),
            ),
            (
                Iso3::from_parts(
                    Translation3::new(0.5, -7.0, 0.0),
                    UnitQuaternion::from_euler_angles(0.0, 0.4, 0.25),
                ),
                Vector3::new(2.0, 2.5, 3.0),
            ),
        ];

        let direct = Scene::new();
        for (transform, scale) in placements.iter() {
            let cube = Mesh::cube();
            cube.set_transform(*transform);
            cube.set_scale(*scale);
            cube.apply().unwrap();
            cube.commit().unwrap();
            direct.add(cube);
        }
        direct.commit().unwrap();

        let child = Scene::new();
        let cube = Mesh::cube();
        cube.apply().unwrap();
        cube.commit().unwrap();
        child.add(cube);
        child.commit().unwrap();
        let instanced = Scene::new();
        for (transform, scale) in placements.iter() {
            let instance = Instance::of(&child);
            instance.set_transform(*transform);
            instance.set_scale(*scale);
            instance.apply().unwrap();
            instance.commit().unwrap();
            instanced.add(instance);
        }
        instanced.commit().unwrap();

        // Two poses per placement, each yawed to face it with some jitter
        let mut rng = rand::rng();
        let poses = placements
            .iter()
            .flat_map(|(transform, _)| {
                let target = transform.translation.vector;
                let yaw = target.y.atan2(target.x);
                (0..2)
                    .map(|_| {
                        Iso3::from_parts(
                            Translation3::new(
                                rng.random_range(-0.5..0.5),
                                rng.random_range(-0.5..0.5),
                                0.0,
                            ),
                            UnitQuaternion::from_euler_angles(
                                0.0,
                                0.0,
                                yaw + rng.random_range(-0.1..0.1),
                            ),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let attributes =
            Attributes::HITS | Attributes::RANGES | Attributes::NORMALS | Attributes::OBJECT_IDS;
        let a = simulator(direct).simulate_new(&poses, attributes).unwrap();
        let b = simulator(instanced).simulate_new(&poses, attributes).unwrap();

        let (a_hits, b_hits) = (a.hits.unwrap(), b.hits.unwrap());
        let (a_ranges, b_ranges) = (a.ranges.unwrap(), b.ranges.unwrap());
        let (a_normals, b_normals) = (a.normals.unwrap(), b.normals.unwrap());
        let (a_objects, b_objects) = (a.object_ids.unwrap(), b.object_ids.unwrap());
        for i in 0..a_hits.len() {
            assert_eq!(a_hits[i], b_hits[i]);
            assert_eq!(a_objects[i], b_objects[i]);
            assert_relative_eq!(a_ranges[i], b_ranges[i], epsilon = 1e-6);
            assert_relative_eq!(a_normals[i], b_normals[i], epsilon = 1e-6);
        }

        // Every placement is seen
        for id in 0..placements.len() as u32 {
            assert!(b_objects.contains(&id));
        }
    }

    #[test]
    fn pinhole_inside_unit_cube() {
        let scene = Scene::new();
        let cube = Mesh::cube();
        cube.apply().unwrap();
        cube.commit().unwrap();
        scene.add(cube);
        scene.commit().unwrap();

        let mut sim = Simulator::new().unwrap();
        sim.set_map(scene);
        let model = PinholeModel::new(
            200,
            150,
            [100.0, 100.0],
            [100.0, 75.0],
            Interval::new(0.0, 100.0),
        );
        sim.set_model(model).unwrap();
        let buffers = sim
            .simulate_new(&[Iso3::identity()], Attributes::POINTS | Attributes::RANGES)
            .unwrap();

        let id = model.buffer_id(50, 50);
        let point = buffers.points.unwrap()[id];
        assert_relative_eq!(point, Point3::new(0.5, 0.25, 0.125), epsilon = 1e-4);
        assert_relative_eq!(
            buffers.ranges.unwrap()[id],
            0.5 * 1.3125_f64.sqrt(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn launch_matches_simulate() {
        let sim = simulator(room());
        let poses = vec![pose(), Iso3::translation(-2.0, 1.0, 0.0), Iso3::identity()];
        let attributes = Attributes::all();

        let pending = sim.launch(poses.clone(), attributes).unwrap();
        let sync = sim.simulate_new(&poses, attributes).unwrap();
        let launched = pending.wait().unwrap();
        assert_eq!(launched, sync);
    }

    #[test]
    fn launch_survives_map_edits() {
        let map = room();
        let sim = simulator(map.clone());
        let poses = vec![Iso3::identity(); 4];
        let before = sim.simulate_ranges(&poses).unwrap();

        let pending = sim.launch(poses, Attributes::RANGES).unwrap();
        map.remove(0);
        map.commit().unwrap();

        let launched = pending.wait().unwrap();
        assert_eq!(launched.ranges.unwrap(), before);
    }
}
