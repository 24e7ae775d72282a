use derive_setters::Setters;
use ratatui::text::Line;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::domain::Record;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const EMPTY_MESSAGE: &str = "No records found";
pub const ACTIONS_LABEL: &str = "Actions";

/// A browsable entity. Only the identifier is structural, everything else is
/// looked up by attribute name.
pub trait Row {
    fn id(&self) -> i64;
    /// Textual value of one attribute.
    fn get(&self, key: &str) -> Option<String>;
    /// Textual value of every attribute, displayed or not.
    fn values(&self) -> Vec<String>;
}

impl Row for Record {
    fn id(&self) -> i64 {
        self.identifier().unwrap_or_default()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.text(key)
    }

    fn values(&self) -> Vec<String> {
        self.0.keys().filter_map(|k| self.text(k)).collect()
    }
}

pub type RenderFn<R> = Box<dyn Fn(&str, &R) -> Line<'static> + Send + Sync>;

/// One displayed attribute of the bound rows.
pub struct Column<R> {
    pub key: String,
    pub label: String,
    render: Option<RenderFn<R>>,
}

impl<R> Column<R> {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            render: None,
        }
    }

    pub fn render<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &R) -> Line<'static> + Send + Sync + 'static,
    {
        self.render = Some(Box::new(f));
        self
    }

    fn cell(&self, row: &R) -> Line<'static>
    where
        R: Row,
    {
        let raw = row.get(&self.key).unwrap_or_default();
        match &self.render {
            Some(f) => f(&raw, row),
            None => Line::raw(raw),
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct TableOptions {
    pub page_size: usize,
    pub search_placeholder: String,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_placeholder: "Search...".to_string(),
        }
    }
}

/// Everything the ui needs to draw the current page.
pub struct TableViewData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Line<'static>>>,
    pub row_ids: Vec<i64>,
    pub selected: usize,
    /// Set when nothing matched; drawn under the column headers.
    pub empty_message: Option<String>,
    pub pages: Vec<usize>,
    pub current_page: usize,
    pub summary: String,
    pub query: String,
    pub placeholder: String,
    pub loading: bool,
}

/// Searchable, paginated view over a homogeneous row list.
///
/// The table never changes its rows on its own. Deleting calls back into the
/// owner, which is expected to fetch the list again.
pub struct DataTable<R> {
    rows: Vec<R>,
    columns: Vec<Column<R>>,
    loading: bool,
    on_delete: Option<Box<dyn FnMut(i64)>>,
    edit_url: Option<Box<dyn Fn(i64) -> String>>,
    options: TableOptions,
    query: String,
    page: usize,
    cursor: usize,
}

impl<R: Row + Sync> DataTable<R> {
    pub fn new(columns: Vec<Column<R>>, options: TableOptions) -> Self {
        Self {
            rows: Vec::new(),
            columns,
            loading: false,
            on_delete: None,
            edit_url: None,
            options,
            query: String::new(),
            page: 1,
            cursor: 0,
        }
    }

    pub fn on_delete<F: FnMut(i64) + 'static>(mut self, f: F) -> Self {
        self.on_delete = Some(Box::new(f));
        self
    }

    pub fn edit_url<F: Fn(i64) -> String + 'static>(mut self, f: F) -> Self {
        self.edit_url = Some(Box::new(f));
        self
    }

    pub fn set_rows(&mut self, rows: Vec<R>) {
        debug!("Table received {} rows", rows.len());
        self.rows = rows;
        self.loading = false;
        self.clamp_cursor();
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Narrowing the result set starts again from the first page.
    pub fn set_query(&mut self, query: &str) {
        trace!("Table query: {query:?}");
        self.query = query.to_string();
        self.page = 1;
        self.cursor = 0;
    }

    pub fn clear_query(&mut self) {
        self.set_query("");
    }

    /// Rows where any attribute contains the query, ignoring case.
    pub fn filtered(&self) -> Vec<&R> {
        let needle = self.query.to_lowercase();
        if needle.is_empty() {
            return self.rows.iter().collect();
        }
        self.rows
            .par_iter()
            .filter(|row| {
                row.values()
                    .iter()
                    .any(|v| v.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered().len()
    }

    pub fn page_size(&self) -> usize {
        self.options.page_size.max(1)
    }

    pub fn page_count(&self) -> usize {
        self.filtered_count().div_ceil(self.page_size())
    }

    /// 1-based, always inside `[1, page_count]` (1 for an empty table).
    pub fn current_page(&self) -> usize {
        self.page.clamp(1, self.page_count().max(1))
    }

    pub fn page_rows(&self) -> Vec<&R> {
        let size = self.page_size();
        let start = (self.current_page() - 1) * size;
        self.filtered().into_iter().skip(start).take(size).collect()
    }

    pub fn next_page(&mut self) {
        self.goto_page(self.current_page() + 1);
    }

    pub fn prev_page(&mut self) {
        self.goto_page(self.current_page().saturating_sub(1));
    }

    pub fn goto_page(&mut self, page: usize) {
        self.page = page.clamp(1, self.page_count().max(1));
        self.cursor = 0;
    }

    pub fn pagination_visible(&self) -> bool {
        self.page_count() > 1
    }

    pub fn select_next(&mut self) {
        self.cursor += 1;
        self.clamp_cursor();
    }

    pub fn select_prev(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn selected_row(&self) -> Option<&R> {
        self.page_rows().get(self.cursor).copied()
    }

    fn clamp_cursor(&mut self) {
        let visible = self.page_rows().len();
        self.cursor = self.cursor.min(visible.saturating_sub(1));
    }

    pub fn has_actions(&self) -> bool {
        self.on_delete.is_some() || self.edit_url.is_some()
    }

    pub fn can_delete(&self) -> bool {
        self.on_delete.is_some()
    }

    /// Hands `id` to the delete callback. The row stays until the owner
    /// replaces the rows.
    pub fn delete(&mut self, id: i64) -> bool {
        match self.on_delete.as_mut() {
            Some(f) => {
                debug!("Delete requested for row {id}");
                f(id);
                true
            }
            None => false,
        }
    }

    pub fn delete_selected(&mut self) -> bool {
        match self.selected_row().map(Row::id) {
            Some(id) => self.delete(id),
            None => false,
        }
    }

    pub fn edit_target(&self, id: i64) -> Option<String> {
        self.edit_url.as_ref().map(|f| f(id))
    }

    pub fn summary(&self) -> String {
        format!(
            "Showing {} of {} items",
            self.page_rows().len(),
            self.filtered_count()
        )
    }

    pub fn view(&self) -> TableViewData {
        let mut headers: Vec<String> = self.columns.iter().map(|c| c.label.clone()).collect();
        if self.has_actions() {
            headers.push(ACTIONS_LABEL.to_string());
        }

        let page_rows = self.page_rows();
        let rows = page_rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Line<'static>> =
                    self.columns.iter().map(|c| c.cell(*row)).collect();
                if self.has_actions() {
                    cells.push(Line::raw(self.action_text()));
                }
                cells
            })
            .collect::<Vec<_>>();

        let pages = if self.pagination_visible() {
            (1..=self.page_count()).collect()
        } else {
            Vec::new()
        };

        TableViewData {
            headers,
            empty_message: rows.is_empty().then(|| EMPTY_MESSAGE.to_string()),
            row_ids: page_rows.iter().map(|r| r.id()).collect(),
            rows,
            selected: self.cursor,
            pages,
            current_page: self.current_page(),
            summary: self.summary(),
            query: self.query.clone(),
            placeholder: self.options.search_placeholder.clone(),
            loading: self.loading,
        }
    }

    fn action_text(&self) -> String {
        let mut parts = Vec::new();
        if self.edit_url.is_some() {
            parts.push("[e]dit");
        }
        if self.on_delete.is_some() {
            parts.push("[d]elete");
        }
        parts.join(" ")
    }
}
