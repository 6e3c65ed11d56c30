//! The open sheets of a session, kept in tab order with unique titles.

use polars::prelude::DataFrame;

use crate::config::{AppSettings, ListSeparator};
use crate::history::DEFAULT_HISTORY_DEPTH;
use crate::sheet::SheetDocument;
use crate::utils::next_numbered_name;

pub const DEFAULT_SHEET_NAME: &str = "Sheet";

#[derive(Debug, Clone)]
pub struct Workspace {
    sheets: Vec<SheetDocument>,
    /// Position of the selected sheet
    pub active_tab: usize,
    pub pinned_tabs: Vec<usize>,
    history_depth: usize,
    separator: ListSeparator,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            sheets: Vec::new(),
            active_tab: 0,
            pinned_tabs: Vec::new(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            separator: ListSeparator::default(),
        }
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sheets take their history depth and formula separator from `settings`.
    pub fn with_settings(settings: &AppSettings) -> Self {
        Self {
            history_depth: settings.history_depth,
            separator: settings.list_separator,
            ..Self::default()
        }
    }

    pub fn sheets(&self) -> &[SheetDocument] {
        &self.sheets
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.sheets.iter().map(SheetDocument::title).collect()
    }

    /// `<base> N` with the next free N. A trailing ` N` on `base` is ignored.
    pub fn generate_sheet_name(&self, base: Option<&str>) -> String {
        next_numbered_name(base.unwrap_or(DEFAULT_SHEET_NAME), self.titles())
    }

    fn unique_title(&self, wanted: Option<&str>) -> String {
        match wanted {
            Some(title) if !title.trim().is_empty() && !self.titles().contains(&title) => {
                title.to_owned()
            }
            other => self.generate_sheet_name(other.filter(|t| !t.trim().is_empty())),
        }
    }

    /// Creates a sheet around `frame` and returns its id.
    pub fn create_sheet(&mut self, frame: DataFrame, title: Option<&str>) -> String {
        let title = self.unique_title(title);
        let document = SheetDocument::new(title, frame)
            .with_history_depth(self.history_depth)
            .with_separator(self.separator);
        self.push(document)
    }

    /// Adds an existing document, renaming it if its title is taken.
    pub fn add_sheet(&mut self, mut document: SheetDocument) -> String {
        let title = self.unique_title(Some(document.title()));
        document.set_title(title);
        self.push(document)
    }

    fn push(&mut self, document: SheetDocument) -> String {
        let id = document.id().to_owned();
        tracing::debug!("Sheet {} opened as {id}", document.title());
        self.sheets.push(document);
        id
    }

    /// Copies a sheet with its data and view. The copy starts without history.
    pub fn duplicate_sheet(&mut self, id: &str) -> Option<String> {
        let source = self.get(id)?;
        let title = self.generate_sheet_name(Some(source.title()));
        let copy = SheetDocument::from_parts(
            uuid::Uuid::new_v4().simple().to_string(),
            title,
            source.data().clone(),
            source.view().clone(),
        )
        .with_history_depth(self.history_depth)
        .with_separator(source.separator());
        Some(self.push(copy))
    }

    /// Renames a sheet and returns the title it ended up with.
    pub fn rename_sheet(&mut self, id: &str, title: &str) -> Option<String> {
        let current = self.get(id)?.title().to_owned();
        if current == title {
            return Some(current);
        }
        let title = self.unique_title(Some(title));
        self.get_mut(id)?.set_title(title.clone());
        Some(title)
    }

    pub fn delete_sheet(&mut self, id: &str) -> Option<SheetDocument> {
        let index = self.sheets.iter().position(|s| s.id() == id)?;
        self.pinned_tabs.retain(|&tab| tab != index);
        for tab in &mut self.pinned_tabs {
            if *tab > index {
                *tab -= 1;
            }
        }
        self.active_tab = self.active_tab.min(self.sheets.len().saturating_sub(2));
        Some(self.sheets.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&SheetDocument> {
        self.sheets.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SheetDocument> {
        self.sheets.iter_mut().find(|s| s.id() == id)
    }

    pub fn by_title(&self, title: &str) -> Option<&SheetDocument> {
        self.sheets.iter().find(|s| s.title() == title)
    }

    pub fn by_title_mut(&mut self, title: &str) -> Option<&mut SheetDocument> {
        self.sheets.iter_mut().find(|s| s.title() == title)
    }

    pub fn active(&self) -> Option<&SheetDocument> {
        self.sheets.get(self.active_tab)
    }
}
