use super::{DisplaySink, Table, TableRow};
use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, Stdout, Write};
use unicode_width::UnicodeWidthStr;

const FALLBACK_WIDTH: u16 = 80;

/// Draws frames in place on an ANSI terminal.
///
/// The cursor is hidden from the first frame on and shown again by `finish`,
/// which parks it on the row below the last frame.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    width: Option<u16>,
    /// Row the current frame started at, once a frame has been positioned.
    origin: Option<u16>,
    frame_rows: u16,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, width: None, origin: None, frame_rows: 0 }
    }

    /// Pins the line width instead of querying the terminal.
    pub fn with_width(out: W, width: u16) -> Self {
        Self { out, width: Some(width), origin: None, frame_rows: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line_width(&self) -> usize {
        let width = self
            .width
            .unwrap_or_else(|| terminal::size().map(|(cols, _)| cols).unwrap_or(FALLBACK_WIDTH));
        width as usize
    }

    fn border(&mut self, widths: &[usize], left: char, mid: char, right: char) -> io::Result<()> {
        let mut line = String::new();
        line.push(left);
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                line.push(mid);
            }
            line.push_str(&"─".repeat(w + 2));
        }
        line.push(right);
        self.table_line(&line)
    }

    fn cells(&mut self, widths: &[usize], cells: &[String]) -> io::Result<()> {
        let mut line = String::from("│");
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(w.saturating_sub(cell.width()) + 1));
            line.push('│');
        }
        self.table_line(&line)
    }

    fn table_line(&mut self, line: &str) -> io::Result<()> {
        self.frame_rows = self.frame_rows.saturating_add(1);
        queue!(self.out, Print(line), Clear(ClearType::UntilNewLine), Print("\n"))
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn set_cursor(&mut self, column: u16, row: u16) -> io::Result<()> {
        if self.origin.is_none() {
            queue!(self.out, cursor::Hide)?;
        }
        self.origin = Some(row);
        self.frame_rows = 0;
        queue!(self.out, cursor::MoveTo(column, row))
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.frame_rows = self.frame_rows.saturating_add(1);
        let pad = self.line_width().saturating_sub(text.width());
        queue!(self.out, Print(text), Print(" ".repeat(pad)), Print("\n"))
    }

    fn render_table(&mut self, table: &Table) -> io::Result<()> {
        let widths = table.column_widths();
        self.border(&widths, '┌', '┬', '┐')?;
        self.cells(&widths, &table.headers)?;
        self.border(&widths, '├', '┼', '┤')?;
        for row in &table.rows {
            match row {
                TableRow::Cells(cells) => self.cells(&widths, cells)?,
                TableRow::Blank => self.cells(&widths, &[])?,
            }
        }
        self.border(&widths, '└', '┴', '┘')
    }

    fn end_frame(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(row) = self.origin.take() {
            queue!(
                self.out,
                cursor::MoveTo(0, row.saturating_add(self.frame_rows)),
                cursor::Show
            )?;
        }
        self.out.flush()
    }
}
