//! Display sink seam and table model

pub mod terminal;

pub use terminal::TerminalSink;

use std::io;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRow {
    Cells(Vec<String>),
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(TableRow::Cells(cells));
    }

    pub fn add_empty_row(&mut self) {
        self.rows.push(TableRow::Blank);
    }

    /// Display width of each column, header included.
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            if let TableRow::Cells(cells) = row {
                for (i, cell) in cells.iter().enumerate() {
                    if i < widths.len() {
                        widths[i] = widths[i].max(cell.width());
                    } else {
                        widths.push(cell.width());
                    }
                }
            }
        }
        widths
    }
}

/// Where rendered frames go.
pub trait DisplaySink: Send {
    fn set_cursor(&mut self, column: u16, row: u16) -> io::Result<()>;

    /// Writes `text` padded to the full terminal width, then a newline.
    fn write_line(&mut self, text: &str) -> io::Result<()>;

    fn render_table(&mut self, table: &Table) -> io::Result<()>;

    fn end_frame(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Releases the terminal on shutdown.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}
