use similar::{Algorithm, DiffOp, capture_diff_slices};

/// Diffs longer than this many rows are collapsed behind a disclosure.
pub const COLLAPSE_THRESHOLD: usize = 7;

/// Title shown on a collapsed diff.
pub const COLLAPSED_TITLE: &str = "Text too long to display, expand for a full view";

/// Indicator shown instead of an empty table.
pub const NO_CHANGE: &str = "No change";

/// One side of a diff row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffCell {
    /// `-` for a removed line, `+` for an added one
    pub marker: char,
    pub text: String,
}

impl DiffCell {
    fn removed(text: &str) -> Self {
        Self {
            marker: '-',
            text: text.to_string(),
        }
    }

    fn added(text: &str) -> Self {
        Self {
            marker: '+',
            text: text.to_string(),
        }
    }
}

/// A row of the From/To table. A missing side means the other side's line
/// has no counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRow {
    pub left: Option<DiffCell>,
    pub right: Option<DiffCell>,
}

/// How a field's diff is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRender {
    NoChange,
    Inline(Vec<DiffRow>),
    Collapsed(Vec<DiffRow>),
}

impl DiffRender {
    pub fn rows(&self) -> &[DiffRow] {
        match self {
            DiffRender::NoChange => &[],
            DiffRender::Inline(rows) | DiffRender::Collapsed(rows) => rows,
        }
    }

    /// Plain-text rendering: a From/To table, prefixed by the disclosure
    /// title when collapsed. `expanded` prints collapsed rows anyway.
    pub fn to_text(&self, expanded: bool) -> String {
        match self {
            DiffRender::NoChange => NO_CHANGE.to_string(),
            DiffRender::Inline(rows) => table_text(rows),
            DiffRender::Collapsed(rows) if expanded => {
                format!("{}\n{}", COLLAPSED_TITLE, table_text(rows))
            }
            DiffRender::Collapsed(rows) => format!("{} ({} rows)", COLLAPSED_TITLE, rows.len()),
        }
    }
}

/// Compute an aligned line diff with no context lines.
///
/// Uses a longest-common-subsequence diff. Changed blocks pair removed and
/// added lines row by row; the shorter side is padded with empty cells.
pub fn render_diff(before: &[&str], after: &[&str]) -> Vec<DiffRow> {
    let mut rows = Vec::new();

    for op in capture_diff_slices(Algorithm::Lcs, before, after) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for line in &before[old_index..old_index + old_len] {
                    rows.push(DiffRow {
                        left: Some(DiffCell::removed(line)),
                        right: None,
                    });
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for line in &after[new_index..new_index + new_len] {
                    rows.push(DiffRow {
                        left: None,
                        right: Some(DiffCell::added(line)),
                    });
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                let removed = &before[old_index..old_index + old_len];
                let added = &after[new_index..new_index + new_len];
                for i in 0..old_len.max(new_len) {
                    rows.push(DiffRow {
                        left: removed.get(i).map(|l| DiffCell::removed(l)),
                        right: added.get(i).map(|l| DiffCell::added(l)),
                    });
                }
            }
        }
    }

    rows
}

/// Render the diff between two serialized snapshots for display.
///
/// Missing and empty text are both treated as no lines at all.
pub fn render_field(original: Option<&str>, data: Option<&str>) -> DiffRender {
    fn lines(text: Option<&str>) -> Vec<&str> {
        text.filter(|s| !s.is_empty())
            .map(|s| s.split('\n').collect())
            .unwrap_or_default()
    }

    let before = lines(original);
    let after = lines(data);

    let rows = render_diff(&before, &after);
    if rows.is_empty() {
        DiffRender::NoChange
    } else if rows.len() > COLLAPSE_THRESHOLD {
        DiffRender::Collapsed(rows)
    } else {
        DiffRender::Inline(rows)
    }
}

fn cell_text(cell: &Option<DiffCell>) -> String {
    match cell {
        Some(c) => format!("{} {}", c.marker, c.text),
        None => String::new(),
    }
}

fn table_text(rows: &[DiffRow]) -> String {
    let width = rows
        .iter()
        .map(|r| cell_text(&r.left).chars().count())
        .max()
        .unwrap_or(0)
        .max("From".len());

    let mut out = format!("{:<width$} | To", "From", width = width);
    for row in rows {
        out.push('\n');
        out.push_str(&format!(
            "{:<width$} | {}",
            cell_text(&row.left),
            cell_text(&row.right),
            width = width
        ));
    }
    out
}
