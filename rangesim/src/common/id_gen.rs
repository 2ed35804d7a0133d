use crate::map::INVALID_ID;
use std::collections::BTreeSet;

/// Hands out integer ids, preferring the smallest id that was released back to it. An id is never
/// handed out twice while it is still in use.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdGen {
    next: u32,
    free: BTreeSet<u32>,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an id. Every id is below `INVALID_ID`; running out of ids panics.
    pub fn acquire(&mut self) -> u32 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        assert!(self.next < INVALID_ID, "all geometry ids are in use");
        let id = self.next;
        self.next += 1;
        id
    }

    /// Release an id so that it can be reused. Releasing an id which was never handed out, or
    /// which was already released, does nothing.
    pub fn release(&mut self, id: u32) {
        if id >= self.next {
            return;
        }

        if id + 1 == self.next {
            self.next = id;
            // Fold any trailing free ids back into the counter
            while self.next > 0 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(id);
        }
    }
}
