//! Connection budget shared by every task in a directory.
//!
//! Each outstanding transfer command holds one slot. The directory reserves
//! slots before asking a task for commands and releases one per finished
//! command, so the total stays under `max_total`.

#[derive(Debug, Clone)]
pub struct ConnectionBudget {
    max_total: usize,
    in_use: usize,
}

impl ConnectionBudget {
    pub fn new(max_total: usize) -> Self {
        Self {
            max_total: max_total.max(1),
            in_use: 0,
        }
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn available(&self) -> usize {
        self.max_total.saturating_sub(self.in_use)
    }

    /// Reserve up to `requested` slots; returns how many were granted.
    pub fn reserve(&mut self, requested: usize) -> usize {
        let take = requested.min(self.available());
        self.in_use += take;
        take
    }

    pub fn release(&mut self, n: usize) {
        self.in_use -= n.min(self.in_use);
    }
}
