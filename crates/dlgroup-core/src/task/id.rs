//! Process-wide task id counter, owned by the task directory and lent to
//! whoever constructs tasks.

use super::TaskId;

#[derive(Debug, Clone)]
pub struct TaskIdCounter {
    base: TaskId,
    next: TaskId,
}

impl Default for TaskIdCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TaskIdCounter {
    /// Ids start at `base`; 0 is reserved for "no parent" and is never issued.
    pub fn new(base: TaskId) -> Self {
        let base = base.max(1);
        Self { base, next: base }
    }

    pub fn next_id(&mut self) -> TaskId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id the next call to `next_id` returns.
    pub fn peek(&self) -> TaskId {
        self.next
    }

    /// Restart from the base. Only valid while no task created from this
    /// counter is alive; see `TaskDirectory::reset_id_counter`.
    pub fn reset(&mut self) {
        self.next = self.base;
    }
}
