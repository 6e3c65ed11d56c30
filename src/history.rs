//! Undo and redo for sheet documents.
//!
//! Every recorded [`State`] holds a snapshot of the sheet before and after the
//! change. Snapshots clone frames, which shares their column buffers, so a
//! snapshot only costs memory for the columns an edit actually rewrites.

use std::collections::VecDeque;

use polars::prelude::DataFrame;

use crate::pipeline::spec::Step;
use crate::sheet::{BoundingBox, SheetData, SheetView};

pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Tables and view of a sheet at one point in time.
#[derive(Debug, Clone)]
pub struct SheetSnapshot {
    pub frames: Vec<DataFrame>,
    pub boxes: Vec<BoundingBox>,
    pub has_main: bool,
    pub view: SheetView,
}

impl SheetSnapshot {
    pub fn capture(data: &SheetData, view: &SheetView) -> Self {
        Self {
            frames: data.frames.clone(),
            boxes: data.boxes.clone(),
            has_main: data.has_main,
            view: view.clone(),
        }
    }

    pub fn restore(&self, data: &mut SheetData, view: &mut SheetView) {
        data.restore(self.frames.clone(), self.boxes.clone(), self.has_main);
        *view = self.view.clone();
    }
}

/// How a change carries over to a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEffect {
    /// Presentation only, such as hiding columns
    None,
    Step(Step),
    /// Undoes the filters recorded so far
    ClearFilters,
}

#[derive(Debug, Clone)]
pub struct State {
    pub label: String,
    pub effect: PipelineEffect,
    pub before: SheetSnapshot,
    pub after: SheetSnapshot,
}

impl State {
    pub fn step(&self) -> Option<&Step> {
        match &self.effect {
            PipelineEffect::Step(step) => Some(step),
            PipelineEffect::None | PipelineEffect::ClearFilters => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryManager {
    undo_stack: VecDeque<State>,
    redo_stack: Vec<State>,
    max_depth: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl HistoryManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Records a change. The oldest state is dropped past `max_depth` and
    /// anything that could be redone is forgotten.
    pub fn save(&mut self, state: State) {
        tracing::debug!("History: {}", state.label);
        self.undo_stack.push_back(state);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Moves the latest state to the redo stack and returns it.
    pub fn undo(&mut self) -> Option<&State> {
        let state = self.undo_stack.pop_back()?;
        self.redo_stack.push(state);
        self.redo_stack.last()
    }

    /// Moves the latest undone state back and returns it.
    pub fn redo(&mut self) -> Option<&State> {
        let state = self.redo_stack.pop()?;
        self.undo_stack.push_back(state);
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Recorded states, oldest first.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.undo_stack.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.undo_stack.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn state(label: &str, value: i64) -> State {
        let data = SheetData::new(df!("x" => [value]).unwrap());
        let snapshot = SheetSnapshot::capture(&data, &SheetView::default());
        State {
            label: label.to_owned(),
            effect: PipelineEffect::None,
            before: snapshot.clone(),
            after: snapshot,
        }
    }

    #[test]
    fn test_undo_redo_moves_between_stacks() {
        let mut history = HistoryManager::new(10);
        history.save(state("first", 1));
        history.save(state("second", 2));

        assert_eq!(history.undo().map(|s| s.label.clone()), Some("second".to_owned()));
        assert!(history.can_redo());
        assert_eq!(history.redo().map(|s| s.label.clone()), Some("second".to_owned()));
        assert!(!history.can_redo());
        assert_eq!(history.labels(), ["first", "second"]);
    }

    #[test]
    fn test_save_clears_redo() {
        let mut history = HistoryManager::new(10);
        history.save(state("first", 1));
        history.undo();
        history.save(state("other", 2));
        assert!(!history.can_redo());
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_depth_drops_oldest() {
        let mut history = HistoryManager::new(2);
        for (i, label) in ["a", "b", "c"].into_iter().enumerate() {
            history.save(state(label, i as i64));
        }
        assert_eq!(history.labels(), ["b", "c"]);
    }

    #[test]
    fn test_snapshot_restores_tables_and_view() {
        let mut data = SheetData::new(df!("x" => [1i64, 2]).unwrap());
        let mut view = SheetView::default();
        let snapshot = SheetSnapshot::capture(&data, &view);

        data.delete_rows(1, 1, 0).unwrap();
        view.hide_columns(0, 1, 1);
        snapshot.restore(&mut data, &mut view);

        assert_eq!(data.frame(0).unwrap().height(), 2);
        assert!(!view.has_hidden_columns());
    }
}
