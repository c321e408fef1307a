//! Undo/redo history for annotation edits
//!
//! Every mutation made through the Library records the image's sequence
//! before and after the change. Undo and redo walk this list and hand back
//! the snapshot to restore.

use super::data::Annotation;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of snapshots kept
pub const HISTORY_LIMIT: usize = 50;

/// One image's annotation sequence at a point in time
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub image_path: String,
    pub annotations: Vec<Annotation>,
}

/// Bounded linear history with a cursor
///
/// `cursor` points at the snapshot matching the current state, so undo
/// moves it back and redo moves it forward.
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    snapshots: VecDeque<Snapshot>,
    cursor: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a snapshot, discarding anything that could have been redone
    ///
    /// Recording the state the cursor already points at is a no-op.
    pub fn record(&mut self, image_path: &str, annotations: &[Annotation]) {
        if let Some(current) = self.cursor.and_then(|c| self.snapshots.get(c)) {
            if current.image_path == image_path && current.annotations == annotations {
                return;
            }
        }

        if let Some(cursor) = self.cursor {
            self.snapshots.truncate(cursor + 1);
        } else {
            self.snapshots.clear();
        }

        self.snapshots.push_back(Snapshot {
            image_path: image_path.to_string(),
            annotations: annotations.to_vec(),
        });
        if self.snapshots.len() > HISTORY_LIMIT {
            self.snapshots.pop_front();
        }
        self.cursor = Some(self.snapshots.len() - 1);
    }

    /// Step back; `None` when already at the oldest snapshot
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        self.snapshots.get(cursor - 1)
    }

    /// Step forward; `None` when already at the newest snapshot
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.cursor? + 1;
        if next >= self.snapshots.len() {
            return None;
        }
        self.cursor = Some(next);
        self.snapshots.get(next)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Reset the history (dataset reload)
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(n: usize) -> Vec<Annotation> {
        (0..n)
            .map(|i| Annotation::new_box("Mass", i as f64, 0.0, 1.0, 1.0, "a"))
            .collect()
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut history = EditHistory::new();
        history.record("/a.png", &boxes(0));
        history.record("/a.png", &boxes(1));
        history.record("/a.png", &boxes(2));

        assert_eq!(history.undo().unwrap().annotations.len(), 1);
        assert_eq!(history.undo().unwrap().annotations.len(), 0);
        assert!(history.undo().is_none());

        assert_eq!(history.redo().unwrap().annotations.len(), 1);
        assert!(history.can_redo());
    }

    #[test]
    fn test_record_discards_redo_tail() {
        let mut history = EditHistory::new();
        history.record("/a.png", &boxes(0));
        history.record("/a.png", &boxes(1));
        history.undo();

        history.record("/a.png", &boxes(3));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_recording_current_state_is_noop() {
        let mut history = EditHistory::new();
        let one = boxes(1);
        history.record("/a.png", &one);
        history.record("/a.png", &one);
        assert_eq!(history.len(), 1);
        history.record("/b.png", &one);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_limit() {
        let mut history = EditHistory::new();
        for i in 0..(HISTORY_LIMIT + 10) {
            history.record("/a.png", &boxes(i % 3));
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert!(history.can_undo());
    }

    #[test]
    fn test_empty_history() {
        let mut history = EditHistory::new();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(history.is_empty());
    }
}
