use std::collections::VecDeque;

use crate::{
    codec::CodecError,
    project::Project,
    snapshot::{capture_undo, restore_undo},
};

pub const DEFAULT_UNDO_DEPTH: usize = 100;

#[derive(Debug, Clone)]
pub struct UndoHistory {
    undo_stack: VecDeque<Vec<u8>>,
    redo_stack: VecDeque<Vec<u8>>,
    max_depth: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoHistory {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn push(&mut self, snapshot: Vec<u8>) {
        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
        self.redo_stack.clear();
    }

    pub fn undo(&mut self, project: &mut Project) -> Result<bool, CodecError> {
        step(&mut self.undo_stack, &mut self.redo_stack, project)
    }

    pub fn redo(&mut self, project: &mut Project) -> Result<bool, CodecError> {
        step(&mut self.redo_stack, &mut self.undo_stack, project)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

fn step(
    from: &mut VecDeque<Vec<u8>>,
    to: &mut VecDeque<Vec<u8>>,
    project: &mut Project,
) -> Result<bool, CodecError> {
    let Some(snapshot) = from.pop_back() else {
        return Ok(false);
    };
    let inverse = match capture_undo(project) {
        Ok(inverse) => inverse,
        Err(err) => {
            from.push_back(snapshot);
            return Err(err);
        }
    };
    if let Err(err) = restore_undo(project, &snapshot) {
        from.push_back(snapshot);
        return Err(err);
    }
    to.push_back(inverse);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_then_redo_returns_to_identical_bytes() {
        let mut project = Project::with_default_content();
        let mut history = UndoHistory::new(8);

        let before = capture_undo(&mut project).expect("capture");
        history.push(before.clone());
        let _ = project.create_arpeggio(Some("Major"));
        let after = capture_undo(&mut project).expect("capture");

        assert!(history.undo(&mut project).expect("undo"));
        assert_eq!(capture_undo(&mut project).expect("capture"), before);
        assert!(history.redo(&mut project).expect("redo"));
        assert_eq!(capture_undo(&mut project).expect("capture"), after);
        assert!(!history.can_redo());
    }

    #[test]
    fn depth_is_bounded_and_push_clears_redo() {
        let mut project = Project::new();
        let mut history = UndoHistory::new(2);
        for _ in 0..3 {
            history.push(capture_undo(&mut project).expect("capture"));
        }
        assert_eq!(history.undo_len(), 2);

        assert!(history.undo(&mut project).expect("undo"));
        assert!(history.can_redo());
        history.push(capture_undo(&mut project).expect("capture"));
        assert!(!history.can_redo());
    }

    #[test]
    fn empty_history_is_a_no_op() {
        let mut project = Project::new();
        let mut history = UndoHistory::default();
        assert!(!history.undo(&mut project).expect("undo"));
        assert!(!history.redo(&mut project).expect("redo"));
    }
}
