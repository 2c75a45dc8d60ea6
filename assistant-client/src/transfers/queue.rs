use crate::models::TaskId;
use std::collections::{HashSet, VecDeque};

/// Pending FIFO plus the bounded set of admitted tasks.
///
/// A task id is in at most one of the two collections.
#[derive(Debug)]
pub struct TransferQueue {
    pending: VecDeque<TaskId>,
    active: HashSet<TaskId>,
    max_concurrent: usize,
}

impl TransferQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            active: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn enqueue(&mut self, id: TaskId) {
        if !self.active.contains(&id) && !self.pending.contains(&id) {
            self.pending.push_back(id);
        }
    }

    /// Promote the head of the queue if a slot is free.
    pub fn admit_next(&mut self) -> Option<TaskId> {
        if self.active.len() >= self.max_concurrent {
            return None;
        }
        let id = self.pending.pop_front()?;
        self.active.insert(id.clone());
        Some(id)
    }

    /// Free the slot held by `id`. Returns false if it was not active.
    pub fn release(&mut self, id: &TaskId) -> bool {
        self.active.remove(id)
    }

    pub fn remove_pending(&mut self, id: &TaskId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending != id);
        before != self.pending.len()
    }

    pub fn is_active(&self, id: &TaskId) -> bool {
        self.active.contains(id)
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.pending.contains(id)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn drain(&mut self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.pending.drain(..).collect();
        ids.extend(self.active.drain());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<TaskId> {
        (0..n).map(|i| TaskId::canonical(format!("t{i}"))).collect()
    }

    #[test]
    fn test_admission_respects_cap_and_fifo() {
        let mut queue = TransferQueue::new(3);
        let ids = ids(5);
        for id in &ids {
            queue.enqueue(id.clone());
        }

        let admitted: Vec<TaskId> = std::iter::from_fn(|| queue.admit_next()).collect();
        assert_eq!(admitted, ids[..3].to_vec());
        assert_eq!(queue.active_len(), 3);
        assert_eq!(queue.pending_len(), 2);

        assert!(queue.release(&ids[1]));
        assert_eq!(queue.admit_next(), Some(ids[3].clone()));
        assert_eq!(queue.admit_next(), None);
    }

    #[test]
    fn test_remove_pending_only_touches_queue() {
        let mut queue = TransferQueue::new(1);
        let ids = ids(2);
        queue.enqueue(ids[0].clone());
        queue.enqueue(ids[1].clone());
        queue.admit_next();

        assert!(!queue.remove_pending(&ids[0]));
        assert!(queue.remove_pending(&ids[1]));
        assert!(queue.is_active(&ids[0]));
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut queue = TransferQueue::new(1);
        let id = TaskId::canonical("a");
        queue.enqueue(id.clone());
        queue.enqueue(id.clone());
        assert_eq!(queue.pending_len(), 1);

        queue.admit_next();
        queue.enqueue(id.clone());
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        assert_eq!(TransferQueue::new(0).max_concurrent(), 1);
    }
}
