//! Instances place a whole committed scene inside another scene under a transform, so the same
//! geometry can appear many times while only being committed once.

use super::accel::{InstanceAccel, SceneHandle};
use super::geometry::{Placement, Stage};
use super::Scene;
use crate::common::{BackRefs, ScaledIso3};
use crate::errors::RaycastError;
use crate::{Iso3, Result, Vector3};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

const KIND: &str = "instance";

pub struct Instance {
    uuid: Uuid,
    state: RwLock<InstanceState>,
    parents: BackRefs<Scene, u32>,
}

struct InstanceState {
    placement: Placement,
    child: Option<Arc<Scene>>,
    applied: Option<ScaledIso3>,
    committed: Option<Arc<InstanceAccel>>,

    /// The scene the committed structure was built from
    committed_child: Option<Uuid>,
}

impl Instance {
    /// Create an empty instance. It must be given a child scene with `set()` before it can be
    /// committed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            state: RwLock::new(InstanceState {
                placement: Placement::new(),
                child: None,
                applied: None,
                committed: None,
                committed_child: None,
            }),
            parents: BackRefs::new(),
        })
    }

    /// Create an instance of a scene.
    pub fn of(scene: &Arc<Scene>) -> Arc<Self> {
        let instance = Self::new();
        instance.set(scene.clone());
        instance
    }

    /// Set the scene this instance places. The instance registers itself with the scene so that
    /// committing the scene refreshes this instance, and unregisters from any previous child.
    pub fn set(self: &Arc<Self>, scene: Arc<Scene>) {
        let previous = {
            let mut state = self.state.write();
            state.placement.stage = Stage::Modified;
            state.child.replace(scene.clone())
        };

        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &scene) {
                previous.parent_refs().remove(self);
            }
        }
        scene.parent_refs().insert(self, ());
    }

    /// The scene placed by this instance, if one was set.
    pub fn child(&self) -> Option<Arc<Scene>> {
        self.state.read().child.clone()
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> Option<String> {
        self.state.read().placement.name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.state.write().placement.name = Some(name.to_string());
    }

    pub fn transform(&self) -> Iso3 {
        self.state.read().placement.transform.iso
    }

    pub fn set_transform(&self, iso: Iso3) {
        self.state.write().placement.set_iso(iso);
    }

    pub fn scale(&self) -> Vector3 {
        self.state.read().placement.transform.scale
    }

    pub fn set_scale(&self, scale: Vector3) {
        self.state.write().placement.set_scale(scale);
    }

    pub fn stage(&self) -> Stage {
        self.state.read().placement.stage
    }

    /// Latch the current transform and scale so that the next `commit()` uses them. Fails if any
    /// scale component is zero.
    pub fn apply(&self) -> Result<()> {
        let mut state = self.state.write();
        let transform = state.placement.appliable(KIND)?;
        state.applied = Some(transform);
        state.placement.stage = Stage::Applied;
        Ok(())
    }

    /// Point the backend at the latest committed version of the child scene under the applied
    /// transform. Fails if no child was set, if the child scene has not been committed since its
    /// last change, or if there are edits which have not been applied.
    pub fn commit(&self) -> Result<()> {
        let child = self.child().ok_or_else(|| {
            RaycastError::config(format!(
                "{} has no child scene",
                self.state.read().placement.label(KIND)
            ))
        })?;
        let handle = child.handle();

        let mut state = self.state.write();
        state.placement.committable(KIND)?;
        let handle = handle.ok_or_else(|| {
            RaycastError::config(format!(
                "the child scene of {} has not been committed",
                state.placement.label(KIND)
            ))
        })?;

        if state.placement.stage == Stage::Committed
            && state
                .committed
                .as_ref()
                .is_some_and(|c| c.child().ptr_eq(&handle))
        {
            return Ok(());
        }

        let transform = state.applied.ok_or_else(|| {
            RaycastError::config(format!(
                "{} has never been applied",
                state.placement.label(KIND)
            ))
        })?;
        state.committed = Some(Arc::new(InstanceAccel::new(transform, handle)));
        state.committed_child = Some(child.uuid());
        state.placement.stage = Stage::Committed;
        Ok(())
    }

    pub fn ids(&self) -> Vec<(Arc<Scene>, u32)> {
        self.parents.alive()
    }

    pub fn id_in(&self, scene: &Arc<Scene>) -> Option<u32> {
        self.parents.get(scene)
    }

    pub fn parents(&self) -> Vec<Arc<Scene>> {
        self.parents.alive().into_iter().map(|(s, _)| s).collect()
    }

    pub fn is_attached(&self) -> bool {
        !self.parents.is_empty()
    }

    pub(crate) fn parent_refs(&self) -> &BackRefs<Scene, u32> {
        &self.parents
    }

    pub(crate) fn committed_accel(&self) -> Option<Arc<InstanceAccel>> {
        self.state.read().committed.clone()
    }

    /// Called after `scene` was committed. If this instance was committed against that scene it
    /// is re-pointed at the new structure, keeping the transform it was committed with, so that
    /// the parent scenes pick the change up on their next commit. A child set with `set()` but not
    /// yet committed is left alone.
    pub(crate) fn refresh_child(&self, scene: &Scene, handle: &SceneHandle) {
        let mut state = self.state.write();
        if state.committed_child != Some(scene.uuid()) {
            return;
        }
        let refreshed = match &state.committed {
            Some(c) if !c.child().ptr_eq(handle) => {
                InstanceAccel::new(c.transform(), handle.clone())
            }
            _ => return,
        };
        log::trace!("{} refreshed to {:?}", state.placement.label(KIND), handle);
        state.committed = Some(Arc::new(refreshed));
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Instance")
            .field("uuid", &self.uuid)
            .field("name", &state.placement.name)
            .field("child", &state.child.as_ref().map(|c| c.uuid()))
            .field("stage", &state.placement.stage)
            .finish()
    }
}
