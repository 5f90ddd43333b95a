//! Non-owning references to protocol runtimes (e.g. a peer swarm).
//!
//! The runtime's lifetime belongs to the subsystem that created it; a task
//! only keeps a weak reference and asks whether it is still alive.

use std::rc::{Rc, Weak};

use crate::task::TaskId;

pub trait ProtocolRuntime {
    fn name(&self) -> &str;
    /// The task no longer uses this runtime; stop serving it.
    fn detach(&self, task: TaskId);
    /// Peer-to-peer runtimes upload as well as download.
    fn is_p2p(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct RuntimeRef {
    inner: Option<Weak<dyn ProtocolRuntime>>,
}

impl RuntimeRef {
    pub fn attach(&mut self, runtime: &Rc<dyn ProtocolRuntime>) {
        self.inner = Some(Rc::downgrade(runtime));
    }

    pub fn get(&self) -> Option<Rc<dyn ProtocolRuntime>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_alive(&self) -> bool {
        self.get().is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    /// Detach from the runtime if it is still alive. Returns true if a
    /// reference was held.
    pub fn release(&mut self, task: TaskId) -> bool {
        match self.inner.take() {
            Some(weak) => {
                if let Some(rt) = weak.upgrade() {
                    tracing::debug!(task, runtime = rt.name(), "detaching protocol runtime");
                    rt.detach(task);
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for RuntimeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRef")
            .field("attached", &self.is_attached())
            .field("alive", &self.is_alive())
            .finish()
    }
}
