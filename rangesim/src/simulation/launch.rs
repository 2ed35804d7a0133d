use super::SimulationBuffers;
use crate::errors::RaycastError;
use crate::Result;
use crossbeam_channel::Receiver;

/// Completion token for a simulation launched onto the simulator's worker pool. A launched
/// simulation cannot be cancelled; dropping the token discards its result.
pub struct PendingSimulation {
    result: Receiver<SimulationBuffers>,
}

impl PendingSimulation {
    pub(crate) fn new(result: Receiver<SimulationBuffers>) -> Self {
        Self { result }
    }

    /// True once the result is ready to be taken without blocking.
    pub fn is_complete(&self) -> bool {
        !self.result.is_empty()
    }

    /// Block until the simulation has finished and take its buffers.
    pub fn wait(self) -> Result<SimulationBuffers> {
        self.result
            .recv()
            .map_err(|_| RaycastError::backend("the simulation worker exited without a result"))
    }
}

impl std::fmt::Debug for PendingSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSimulation")
            .field("complete", &self.is_complete())
            .finish()
    }
}
