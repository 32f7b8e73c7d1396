//! Connection-independent result cache.
//!
//! A [`CachedResultSet`] is filled completely inside the call that ran the
//! query, so the connection can go back to the pool before the caller starts
//! reading rows. Accessors never fail: an absent value, a value that does not
//! parse, or a cursor outside the row range yields `None` or zero.

use crate::models::{RowMap, SqlValue};
use serde::Serialize;

/// Column reference accepted by the typed accessors: a 1-based index or a
/// case-insensitive column name.
pub trait ColumnRef {
    fn position(&self, columns: &[String]) -> Option<usize>;
}

impl ColumnRef for usize {
    fn position(&self, columns: &[String]) -> Option<usize> {
        (*self >= 1 && *self <= columns.len()).then(|| *self - 1)
    }
}

impl ColumnRef for &str {
    fn position(&self, columns: &[String]) -> Option<usize> {
        let wanted = self.to_uppercase();
        columns.iter().position(|c| *c == wanted)
    }
}

impl ColumnRef for String {
    fn position(&self, columns: &[String]) -> Option<usize> {
        self.as_str().position(columns)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CachedResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    /// -1 before the first row, `rows.len()` after the last
    #[serde(skip)]
    cursor: isize,
}

impl CachedResultSet {
    /// Capture fully decoded rows. Column names are upper-cased.
    pub fn capture<S: AsRef<str>>(columns: &[S], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_uppercase()).collect(),
            rows,
            cursor: -1,
        }
    }

    pub fn empty() -> Self {
        Self::capture::<&str>(&[], Vec::new())
    }

    /// Advance the cursor. Returns false once the cursor has moved past the
    /// last row.
    pub fn next(&mut self) -> bool {
        if self.cursor < self.rows.len() as isize {
            self.cursor += 1;
        }
        self.cursor < self.rows.len() as isize
    }

    /// Position the cursor on a 0-based row, or -1 for "before first".
    /// Out-of-range positions are ignored.
    pub fn seek(&mut self, row: isize) {
        if row < -1 || row >= self.rows.len() as isize {
            return;
        }
        self.cursor = row;
    }

    pub fn before_first(&mut self) {
        self.cursor = -1;
    }

    /// 1-based number of the current row, 0 before the first.
    pub fn row_num(&self) -> usize {
        (self.cursor + 1) as usize
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column name at a 1-based index.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        index
            .position(&self.columns)
            .map(|i| self.columns[i].as_str())
    }

    fn current(&self) -> Option<&Vec<SqlValue>> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.rows.get(i))
    }

    fn cell<C: ColumnRef>(&self, column: C) -> Option<&SqlValue> {
        let idx = column.position(&self.columns)?;
        self.current()?.get(idx)
    }

    /// Raw value at the cursor; `None` for NULL or an unknown column.
    pub fn get_object<C: ColumnRef>(&self, column: C) -> Option<SqlValue> {
        self.cell(column).filter(|v| !v.is_null()).cloned()
    }

    pub fn get_string<C: ColumnRef>(&self, column: C) -> Option<String> {
        self.cell(column).and_then(SqlValue::as_text)
    }

    pub fn get_long<C: ColumnRef>(&self, column: C) -> i64 {
        self.numeric(column).unwrap_or(0)
    }

    pub fn get_int<C: ColumnRef>(&self, column: C) -> i32 {
        self.numeric::<_, i64>(column)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0)
    }

    pub fn get_double<C: ColumnRef>(&self, column: C) -> f64 {
        self.numeric(column).unwrap_or(0.0)
    }

    pub fn get_float<C: ColumnRef>(&self, column: C) -> f32 {
        self.get_double(column) as f32
    }

    pub fn get_bool<C: ColumnRef>(&self, column: C) -> bool {
        match self.cell(column) {
            Some(SqlValue::Bool(v)) => *v,
            Some(SqlValue::Int(v)) => *v != 0,
            Some(SqlValue::Text(s)) => s.eq_ignore_ascii_case("true") || s == "1",
            _ => false,
        }
    }

    fn numeric<C: ColumnRef, T: std::str::FromStr>(&self, column: C) -> Option<T> {
        let text = match self.cell(column)? {
            SqlValue::Bool(v) => (*v as i64).to_string(),
            other => other.as_text()?,
        };
        text.trim().parse().ok()
    }

    /// Current row as an upper-cased column name to value map.
    pub fn get_row_value_map(&self) -> Option<RowMap> {
        let row = self.current()?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }

    /// Every row as a map, independent of the cursor.
    pub fn row_maps(&self) -> Vec<RowMap> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    pub fn into_row_maps(self) -> Vec<RowMap> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|r| r.first())
    }
}
