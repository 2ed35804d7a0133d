//! Scenes are id-indexed collections of geometries, committed together into a single queryable
//! `SceneHandle`.

use super::accel::{SceneAccel, SceneHandle};
use super::{BuildQuality, Geometry, GeometryType, Instance, Mesh, SceneFlags, SceneSettings};
use crate::common::{BackRefs, IdGen};
use crate::Result;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub struct Scene {
    uuid: Uuid,
    state: RwLock<SceneState>,
    parents: BackRefs<Instance>,
}

struct SceneState {
    name: Option<String>,
    settings: SceneSettings,
    geometries: HashMap<u32, Geometry>,
    ids: IdGen,

    /// Geometries were added or removed since the last commit
    dirty: bool,

    /// The next commit must build the top level structure from scratch
    force_rebuild: bool,

    handle: Option<SceneHandle>,
}

impl Scene {
    /// Create an empty scene with the default settings.
    pub fn new() -> Arc<Self> {
        Self::with_settings(SceneSettings::default())
    }

    pub fn with_settings(settings: SceneSettings) -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            state: RwLock::new(SceneState {
                name: None,
                settings,
                geometries: HashMap::new(),
                ids: IdGen::new(),
                dirty: true,
                force_rebuild: false,
                handle: None,
            }),
            parents: BackRefs::new(),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> Option<String> {
        self.state.read().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.state.write().name = Some(name.to_string());
    }

    pub fn settings(&self) -> SceneSettings {
        self.state.read().settings
    }

    /// Change the build quality. Takes effect at the next commit, which rebuilds the structure.
    pub fn set_quality(&self, quality: BuildQuality) {
        let mut state = self.state.write();
        state.settings.quality = quality;
        state.force_rebuild = true;
    }

    /// Change the scene flags. Takes effect at the next commit, which rebuilds the structure.
    pub fn set_flags(&self, flags: SceneFlags) {
        let mut state = self.state.write();
        state.settings.flags = flags;
        state.force_rebuild = true;
    }

    /// Add a geometry to the scene and return its id. The scene holds a strong reference to the
    /// geometry, and the geometry is told its id in this scene. Adding a geometry that is already
    /// in the scene returns its existing id.
    ///
    /// Instancing a scene inside itself, directly or through other scenes, is not supported.
    pub fn add(self: &Arc<Self>, geometry: impl Into<Geometry>) -> u32 {
        let geometry = geometry.into();
        let mut state = self.state.write();

        if let Some(id) = geometry.parent_refs().get(self) {
            if state
                .geometries
                .get(&id)
                .is_some_and(|g| g.ptr_eq(&geometry))
            {
                return id;
            }
        }

        let id = state.ids.acquire();
        geometry.parent_refs().insert(self, id);
        log::trace!(
            "added {:?} {} as id {}",
            geometry.geometry_type(),
            geometry.uuid(),
            id
        );
        state.geometries.insert(id, geometry);
        state.dirty = true;
        id
    }

    /// Remove the geometry with the given id, returning it. The id becomes available for reuse.
    pub fn remove(self: &Arc<Self>, id: u32) -> Option<Geometry> {
        let mut state = self.state.write();
        let geometry = state.geometries.remove(&id)?;
        state.ids.release(id);
        state.dirty = true;
        geometry.parent_refs().remove(self);
        log::trace!("removed {:?} id {}", geometry.geometry_type(), id);
        Some(geometry)
    }

    /// Remove a geometry from the scene, returning the id it had.
    pub fn remove_geometry(self: &Arc<Self>, geometry: &Geometry) -> Option<u32> {
        let id = geometry.parent_refs().get(self)?;
        self.remove(id).map(|_| id)
    }

    pub fn get(&self, id: u32) -> Option<Geometry> {
        self.state.read().geometries.get(&id).cloned()
    }

    pub fn get_mesh(&self, id: u32) -> Option<Arc<Mesh>> {
        self.get(id).and_then(|g| g.as_mesh().cloned())
    }

    pub fn get_instance(&self, id: u32) -> Option<Arc<Instance>> {
        self.get(id).and_then(|g| g.as_instance().cloned())
    }

    pub fn has(&self, id: u32) -> bool {
        self.state.read().geometries.contains_key(&id)
    }

    pub fn contains(self: &Arc<Self>, geometry: &Geometry) -> bool {
        geometry
            .parent_refs()
            .get(self)
            .is_some_and(|id| self.has(id))
    }

    pub fn count(&self) -> usize {
        self.state.read().geometries.len()
    }

    pub fn count_of(&self, geometry_type: GeometryType) -> usize {
        self.state
            .read()
            .geometries
            .values()
            .filter(|g| g.geometry_type() == geometry_type)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().geometries.is_empty()
    }

    /// All geometries in the scene, ordered by id.
    pub fn geometries(&self) -> BTreeMap<u32, Geometry> {
        self.state
            .read()
            .geometries
            .iter()
            .map(|(id, g)| (*id, g.clone()))
            .collect()
    }

    /// Levels of the instancing hierarchy below this scene: 0 when empty, 1 for meshes only, and
    /// one more for every level of nested instances. An instance leading back to a scene already
    /// on the path adds no further levels.
    pub fn depth(&self) -> usize {
        self.depth_on_path(&mut Vec::new())
    }

    fn depth_on_path(&self, path: &mut Vec<Uuid>) -> usize {
        if path.contains(&self.uuid) {
            log::warn!("scene {} instances itself", self.uuid);
            return 0;
        }

        let geometries = self
            .state
            .read()
            .geometries
            .values()
            .cloned()
            .collect::<Vec<_>>();

        path.push(self.uuid);
        let depth = geometries
            .iter()
            .map(|g| match g {
                Geometry::Mesh(_) => 1,
                Geometry::Instance(i) => 1 + i.child().map_or(0, |c| c.depth_on_path(path)),
            })
            .max()
            .unwrap_or(0);
        path.pop();
        depth
    }

    /// The committed structure, or `None` if the scene was never committed or geometries were
    /// added or removed since the last commit.
    pub fn handle(&self) -> Option<SceneHandle> {
        let state = self.state.read();
        if state.dirty {
            None
        } else {
            state.handle.clone()
        }
    }

    pub fn is_committed(&self) -> bool {
        self.handle().is_some()
    }

    /// The instances which place this scene.
    pub fn parents(&self) -> Vec<Arc<Instance>> {
        self.parents.alive().into_iter().map(|(i, _)| i).collect()
    }

    pub(crate) fn parent_refs(&self) -> &BackRefs<Instance> {
        &self.parents
    }

    /// Build the queryable structure from the committed state of every geometry in the scene.
    ///
    /// When nothing changed since the last commit this does nothing. When the same geometries
    /// are present and the settings allow it (`SceneFlags::DYNAMIC` or `BuildQuality::Refit`),
    /// the existing tree is refit to the moved geometries; otherwise it is rebuilt. Instances of
    /// this scene that are already committed are then re-pointed at the new structure.
    ///
    /// Fails if any geometry in the scene has never been committed.
    pub fn commit(&self) -> Result<()> {
        let handle = {
            let mut state = self.state.write();
            let entries = state
                .geometries
                .iter()
                .sorted_by_key(|(id, _)| **id)
                .map(|(id, g)| g.accel_entry(*id))
                .collect::<Result<Vec<_>>>()?;

            let previous = state.handle.clone();
            let rebuild = state.dirty || state.force_rebuild;

            if let Some(previous) = &previous {
                if !rebuild && previous.accel().matches(&entries) {
                    return Ok(());
                }
            }

            let accel = match previous {
                Some(previous) if !rebuild && state.settings.allows_refit() => {
                    let rebalance = state.settings.quality == BuildQuality::High;
                    match previous.accel().refit(entries.clone(), rebalance) {
                        Some(accel) => {
                            log::trace!("refit scene {} ({} entries)", self.uuid, entries.len());
                            accel
                        }
                        None => {
                            log::warn!("scene {} could not be refit, rebuilding", self.uuid);
                            SceneAccel::build(entries)
                        }
                    }
                }
                _ => {
                    log::debug!("building scene {} ({} entries)", self.uuid, entries.len());
                    SceneAccel::build(entries)
                }
            };

            let handle = SceneHandle::new(accel);
            state.handle = Some(handle.clone());
            state.dirty = false;
            state.force_rebuild = false;
            handle
        };

        // The scene lock is released before the parents are touched, since a parent instance may
        // read this scene while refreshing.
        for (instance, _) in self.parents.alive() {
            instance.refresh_child(self, &handle);
        }
        Ok(())
    }

    /// Rebuild the committed structure from scratch, discarding the loosened bounds that repeated
    /// refits leave behind.
    pub fn optimize(&self) -> Result<()> {
        self.state.write().force_rebuild = true;
        self.commit()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Scene")
            .field("uuid", &self.uuid)
            .field("name", &state.name)
            .field("geometries", &state.geometries.len())
            .field("committed", &(!state.dirty && state.handle.is_some()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Iso3, Point3, Stage, Vector3, INVALID_ID};
    use approx::assert_relative_eq;
    use parry3d_f64::na::{Translation3, UnitQuaternion};

    fn committed(mesh: Arc<Mesh>, iso: Iso3) -> Arc<Mesh> {
        mesh.set_transform(iso);
        mesh.apply().unwrap();
        mesh.commit().unwrap();
        mesh
    }

    #[test]
    fn ids_are_sequential_and_reused() {
        let scene = Scene::new();
        let a = scene.add(Mesh::cube());
        let b = scene.add(Mesh::cube());
        let c = scene.add(Mesh::cube());
        assert_eq!((a, b, c), (0, 1, 2));

        assert!(scene.remove(b).is_some());
        assert!(!scene.has(b));
        assert!(scene.get(b).is_none());
        assert_eq!(scene.count(), 2);
        assert_eq!(scene.add(Mesh::plane()), 1);
        assert_eq!(scene.count(), 3);
    }

    #[test]
    fn add_twice_returns_same_id() {
        let scene = Scene::new();
        let mesh = Mesh::cube();
        let id = scene.add(&mesh);
        assert_eq!(scene.add(&mesh), id);
        assert_eq!(scene.count(), 1);
    }

    #[test]
    fn geometry_knows_its_ids() {
        let a = Scene::new();
        let b = Scene::new();
        let mesh = Mesh::cube();
        a.add(Mesh::plane());
        let ia = a.add(&mesh);
        let ib = b.add(&mesh);

        assert_eq!(mesh.id_in(&a), Some(ia));
        assert_eq!(mesh.id_in(&b), Some(ib));
        assert_eq!(mesh.ids().len(), 2);

        let geometry = Geometry::from(&mesh);
        assert_eq!(a.remove_geometry(&geometry), Some(ia));
        assert_eq!(mesh.id_in(&a), None);
        assert!(mesh.is_attached());
    }

    #[test]
    fn dropped_scene_detaches() {
        let mesh = Mesh::cube();
        {
            let scene = Scene::new();
            scene.add(&mesh);
            assert!(mesh.is_attached());
        }
        assert!(!mesh.is_attached());
    }

    #[test]
    fn shared_geometry_outlives_one_scene() {
        let mesh = Mesh::cube();
        let s2 = Scene::new();
        s2.add(Mesh::plane());
        let id2 = s2.add(&mesh);
        {
            let s1 = Scene::new();
            s1.add(&mesh);
            assert_eq!(mesh.ids().len(), 2);
        }

        assert!(s2.get(id2).is_some_and(|g| g.ptr_eq(&Geometry::from(&mesh))));
        assert_eq!(mesh.id_in(&s2), Some(id2));
        assert_eq!(mesh.ids().len(), 1);
        assert!(mesh.is_attached());
    }

    #[test]
    fn self_instancing_depth_terminates() {
        let scene = Scene::new();
        scene.add(committed(Mesh::cube(), Iso3::identity()));
        scene.add(Instance::of(&scene));
        assert_eq!(scene.depth(), 1);
    }

    #[test]
    fn counts_by_type() {
        let child = Scene::new();
        let scene = Scene::new();
        scene.add(Mesh::cube());
        scene.add(Mesh::plane());
        scene.add(Instance::of(&child));
        assert_eq!(scene.count_of(GeometryType::Mesh), 2);
        assert_eq!(scene.count_of(GeometryType::Instance), 1);
        assert!(scene.get_instance(2).is_some());
        assert!(scene.get_mesh(2).is_none());
        assert_eq!(scene.geometries().keys().copied().collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn commit_with_uncommitted_geometry_fails() {
        let scene = Scene::new();
        scene.add(Mesh::cube());
        assert!(scene.commit().unwrap_err().is_configuration());
        assert!(scene.handle().is_none());
    }

    #[test]
    fn empty_scene_misses() {
        let scene = Scene::new();
        scene.commit().unwrap();
        let handle = scene.handle().unwrap();
        assert!(handle.is_empty());
        assert_eq!(handle.depth(), 0);
        assert!(handle
            .intersect(&Point3::origin(), &Vector3::x(), 0.0, 100.0)
            .is_none());
    }

    #[test]
    fn structural_change_invalidates_handle() {
        let scene = Scene::new();
        scene.add(committed(Mesh::cube(), Iso3::identity()));
        scene.commit().unwrap();
        assert!(scene.is_committed());

        let id = scene.add(committed(Mesh::cube(), Iso3::translation(3.0, 0.0, 0.0)));
        assert!(scene.handle().is_none());
        scene.commit().unwrap();
        scene.remove(id);
        assert!(scene.handle().is_none());
    }

    #[test]
    fn commit_without_changes_keeps_handle() {
        let scene = Scene::new();
        scene.add(committed(Mesh::cube(), Iso3::identity()));
        scene.commit().unwrap();
        let first = scene.handle().unwrap();
        scene.commit().unwrap();
        assert!(first.ptr_eq(&scene.handle().unwrap()));
    }

    #[test]
    fn sphere_center_ray() {
        // Rotated slightly about z so that the ray does not run exactly along a triangle edge
        let sphere = Mesh::sphere(1.0, 64, 33);
        let iso = Iso3::from_parts(
            Translation3::new(0.0, 5.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.01),
        );
        let sphere = committed(sphere, iso);

        let scene = Scene::new();
        let id = scene.add(sphere);
        scene.commit().unwrap();

        let hit = scene
            .handle()
            .unwrap()
            .intersect(&Point3::new(0.0, 5.0, 0.0), &Vector3::x(), 0.0, 100.0)
            .unwrap();
        assert_relative_eq!(hit.range, 1.0, epsilon = 0.01);
        assert_eq!(hit.geom_id, id);
        assert_eq!(hit.object_id, id);
        assert!(hit.face_id < 64 * 32 * 2);
        assert!(hit.normal.x < -0.9);
    }

    #[test]
    fn closest_of_several_hits() {
        let scene = Scene::new();
        scene.add(committed(Mesh::cube(), Iso3::translation(10.0, 0.1, 0.2)));
        let near = scene.add(committed(Mesh::cube(), Iso3::translation(4.0, 0.1, 0.2)));
        scene.commit().unwrap();

        let hit = scene
            .handle()
            .unwrap()
            .intersect(&Point3::origin(), &Vector3::x(), 0.0, 100.0)
            .unwrap();
        assert_eq!(hit.geom_id, near);
        assert_relative_eq!(hit.range, 3.5, epsilon = 1e-9);
        assert_relative_eq!(hit.normal, -Vector3::x(), epsilon = 1e-9);
        assert_ne!(hit.face_id, INVALID_ID);
    }

    #[test]
    fn range_limits() {
        let scene = Scene::new();
        scene.add(committed(Mesh::cube(), Iso3::translation(4.0, 0.1, 0.2)));
        scene.commit().unwrap();
        let handle = scene.handle().unwrap();
        let o = Point3::origin();
        let d = Vector3::x();

        assert!(handle.intersect(&o, &d, 0.0, 3.0).is_none());

        // Starting past the front face finds the back face from the inside
        let hit = handle.intersect(&o, &d, 4.0, 100.0).unwrap();
        assert_relative_eq!(hit.range, 4.5, epsilon = 1e-9);
        assert_relative_eq!(hit.normal, -Vector3::x(), epsilon = 1e-9);
    }

    #[test]
    fn moved_mesh_needs_commit() {
        let scene = Scene::with_settings(SceneSettings::dynamic());
        let mesh = committed(Mesh::cube(), Iso3::translation(4.0, 0.1, 0.2));
        scene.add(&mesh);
        scene.commit().unwrap();
        let first = scene.handle().unwrap();

        committed(mesh.clone(), Iso3::translation(6.0, 0.1, 0.2));
        assert_eq!(mesh.stage(), Stage::Committed);

        // The old handle is unaffected until the scene is committed
        let hit = first
            .intersect(&Point3::origin(), &Vector3::x(), 0.0, 100.0)
            .unwrap();
        assert_relative_eq!(hit.range, 3.5, epsilon = 1e-9);

        scene.commit().unwrap();
        let hit = scene
            .handle()
            .unwrap()
            .intersect(&Point3::origin(), &Vector3::x(), 0.0, 100.0)
            .unwrap();
        assert_relative_eq!(hit.range, 5.5, epsilon = 1e-9);
    }

    #[test]
    fn refit_and_rebuild_agree() {
        let _ = env_logger::builder().is_test(true).try_init();
        let make = |settings: SceneSettings| {
            let scene = Scene::with_settings(settings);
            let meshes = (0..6)
                .map(|i| committed(Mesh::cube(), Iso3::translation(3.0 * i as f64, 0.0, 0.0)))
                .collect::<Vec<_>>();
            for m in &meshes {
                scene.add(m);
            }
            scene.commit().unwrap();
            for (i, m) in meshes.iter().enumerate() {
                committed(m.clone(), Iso3::translation(3.0 * i as f64 + 1.5, 0.0, 0.0));
            }
            scene.commit().unwrap();
            scene
        };

        let dynamic = make(SceneSettings::dynamic());
        let refit = make(SceneSettings::new(BuildQuality::Refit, SceneFlags::empty()));
        let stat = make(SceneSettings::default());

        for x in [-1.0, 2.5, 5.2, 11.0] {
            let o = Point3::new(x, 0.1, 0.2);
            let hits = [&dynamic, &refit, &stat].map(|s| {
                s.handle()
                    .unwrap()
                    .intersect(&o, &Vector3::x(), 0.0, 100.0)
                    .map(|h| (h.geom_id, h.range))
            });
            assert_eq!(hits[0], hits[2]);
            assert_eq!(hits[1], hits[2]);
        }

        stat.optimize().unwrap();
        assert!(stat.is_committed());
    }

    #[test]
    fn depth_follows_nesting() {
        let leaf = Scene::new();
        leaf.add(committed(Mesh::cube(), Iso3::identity()));
        leaf.commit().unwrap();

        let middle = Scene::new();
        let instance = Instance::of(&leaf);
        instance.apply().unwrap();
        instance.commit().unwrap();
        middle.add(instance);
        middle.commit().unwrap();

        let top = Scene::new();
        let instance = Instance::of(&middle);
        instance.apply().unwrap();
        instance.commit().unwrap();
        top.add(instance);
        top.add(committed(Mesh::plane(), Iso3::identity()));
        top.commit().unwrap();

        assert_eq!(leaf.depth(), 1);
        assert_eq!(middle.depth(), 2);
        assert_eq!(top.depth(), 3);
        assert_eq!(top.handle().unwrap().depth(), 3);
    }

    #[test]
    fn instance_ids_and_transforms() {
        let child = Scene::new();
        child.add(committed(Mesh::plane(), Iso3::identity()));
        let cube_id = child.add(committed(Mesh::cube(), Iso3::identity()));
        child.commit().unwrap();

        let scene = Scene::new();
        scene.add(committed(Mesh::plane(), Iso3::translation(0.0, 0.0, -50.0)));
        let instance = Instance::of(&child);
        instance.set_transform(Iso3::translation(5.0, 0.0, 0.0));
        instance.set_scale(Vector3::new(2.0, 2.0, 2.0));
        instance.apply().unwrap();
        instance.commit().unwrap();
        let instance_id = scene.add(&instance);
        scene.commit().unwrap();

        // The cube spans x in [4, 6] after scaling and translating
        let hit = scene
            .handle()
            .unwrap()
            .intersect(&Point3::new(0.0, 0.3, 0.2), &Vector3::x(), 0.0, 100.0)
            .unwrap();
        assert_relative_eq!(hit.range, 4.0, epsilon = 1e-9);
        assert_eq!(hit.geom_id, cube_id);
        assert_eq!(hit.object_id, instance_id);
        assert_relative_eq!(hit.normal, -Vector3::x(), epsilon = 1e-9);
    }

    #[test]
    fn child_change_reaches_parent_after_commit() {
        let child = Scene::new();
        let cube = committed(Mesh::cube(), Iso3::identity());
        child.add(&cube);
        child.commit().unwrap();

        let scene = Scene::new();
        let instance = Instance::of(&child);
        instance.set_transform(Iso3::translation(5.0, 0.0, 0.0));
        instance.apply().unwrap();
        instance.commit().unwrap();
        scene.add(&instance);
        scene.commit().unwrap();

        let o = Point3::new(0.0, 0.1, 0.2);
        let range = |s: &Arc<Scene>| {
            s.handle()
                .unwrap()
                .intersect(&o, &Vector3::x(), 0.0, 100.0)
                .map(|h| h.range)
        };
        assert_relative_eq!(range(&scene).unwrap(), 4.5, epsilon = 1e-9);

        committed(cube.clone(), Iso3::translation(1.0, 0.0, 0.0));
        child.commit().unwrap();
        assert_relative_eq!(range(&scene).unwrap(), 4.5, epsilon = 1e-9);
        scene.commit().unwrap();
        assert_relative_eq!(range(&scene).unwrap(), 5.5, epsilon = 1e-9);
    }
}
