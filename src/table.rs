use std::fmt;

use crate::col::Field;
use crate::error::{Error, Result};
use crate::row::Row;

/// Widest cell drawn by [`Table::render`]
pub const MAX_RENDER_WIDTH: usize = 32;

/// Result of a text query
///
/// Statements without a result set produce a table with no fields and no rows;
/// `affected_rows` and `last_insert_id` then come from the server's OK packet.
///
/// All indices are 0-based and exclusive: `row(i)` is valid for
/// `i < num_rows()`, `field(i)` for `i < num_fields()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    fields: Vec<Field>,
    rows: Vec<Row>,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
}

impl Table {
    /// Build a table, checking that every row has one value per field
    pub fn new(fields: Vec<Field>, rows: Vec<Row>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != fields.len()) {
            return Err(Error::ColumnCountMismatch {
                expected: fields.len(),
                actual: row.len(),
            });
        }
        Ok(Self {
            fields,
            rows,
            ..Self::default()
        })
    }

    /// Empty table for a statement answered with an OK packet
    pub fn from_ok(affected_rows: u64, last_insert_id: u64, warnings: u16) -> Self {
        Self {
            affected_rows,
            last_insert_id,
            warnings,
            ..Self::default()
        }
    }

    pub(crate) fn set_warnings(&mut self, warnings: u16) {
        self.warnings = warnings;
    }

    /// Drop all fields, rows and counters so the table can be reused
    pub fn clear(&mut self) {
        self.fields.clear();
        self.rows.clear();
        self.affected_rows = 0;
        self.last_insert_id = 0;
        self.warnings = 0;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the statement returned no result set
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.rows.is_empty()
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.field(index).map(|field| field.name.as_str())
    }

    /// Index of the first field called `name`
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Value at (`row`, `col`), `None` when NULL or out of range
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.row(row)?.get(col)
    }

    /// Value of the first field called `name` in `row`
    pub fn value_by_name(&self, row: usize, name: &str) -> Option<&str> {
        self.value(row, self.field_index(name)?)
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Draw the table as an ASCII grid into `out`
    ///
    /// Each column is as wide as its declared size (32 when the size is 0 or
    /// larger than 32), widened to fit the header. Cells that do not fit end
    /// in `...`; NULL and empty values are blank.
    pub fn render<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let widths: Vec<usize> = self.fields.iter().map(render_width).collect();

        write_separator(out, &widths)?;
        for (field, width) in self.fields.iter().zip(&widths) {
            write!(out, "| {:>width$} ", fit(&field.name, *width))?;
        }
        out.write_str("|\n")?;
        write_separator(out, &widths)?;

        for row in &self.rows {
            for (value, width) in row.values().iter().zip(&widths) {
                let value = value.as_deref().unwrap_or("");
                write!(out, "| {:>width$} ", fit(value, *width))?;
            }
            out.write_str("|\n")?;
        }
        write_separator(out, &widths)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}

fn render_width(field: &Field) -> usize {
    let declared = match usize::try_from(field.size) {
        Ok(0) | Err(_) => MAX_RENDER_WIDTH,
        Ok(size) => size.min(MAX_RENDER_WIDTH),
    };
    declared
        .max(field.name.chars().count())
        .min(MAX_RENDER_WIDTH)
}

fn write_separator<W: fmt::Write>(out: &mut W, widths: &[usize]) -> fmt::Result {
    for width in widths {
        out.write_char('+')?;
        for _ in 0..width + 2 {
            out.write_char('-')?;
        }
    }
    out.write_str("+\n")
}

/// Cut `value` to `width` characters, marking the cut with `...`
fn fit(value: &str, width: usize) -> std::borrow::Cow<'_, str> {
    if value.chars().count() <= width {
        return value.into();
    }
    let keep = width.saturating_sub(3);
    let mut cut: String = value.chars().take(keep).collect();
    cut.extend("...".chars().take(width.min(3)));
    cut.into()
}
