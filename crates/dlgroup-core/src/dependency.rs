//! Gates that hold a task back until an external condition holds.

use std::cell::Cell;
use std::rc::Rc;

pub trait DependencyGate {
    fn is_resolved(&self) -> bool;
}

/// Gate opened through a [`GateHandle`]. Tasks are driven from a single
/// scheduler thread, so the shared flag needs no locking.
#[derive(Debug, Default)]
pub struct ManualGate {
    open: Rc<Cell<bool>>,
}

/// Opens the [`ManualGate`] it was created from.
#[derive(Debug, Clone)]
pub struct GateHandle {
    open: Rc<Cell<bool>>,
}

impl ManualGate {
    pub fn new() -> (Self, GateHandle) {
        let open = Rc::new(Cell::new(false));
        (
            Self {
                open: Rc::clone(&open),
            },
            GateHandle { open },
        )
    }
}

impl DependencyGate for ManualGate {
    fn is_resolved(&self) -> bool {
        self.open.get()
    }
}

impl GateHandle {
    pub fn resolve(&self) {
        self.open.set(true);
    }

    pub fn is_resolved(&self) -> bool {
        self.open.get()
    }
}
