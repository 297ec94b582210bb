#![forbid(unsafe_code)]

use std::io;

use crate::core::state::SortedView;
use crate::task::columns::{self, COLUMNS};
use crate::task::user::User;

#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// One row per task, in view order, with the standard task columns.
    #[must_use]
    pub fn tasks(view: &SortedView<'_>) -> Self {
        let mut table = Self::new(COLUMNS.iter().map(|c| c.title));
        for task in view.iter() {
            table.row(COLUMNS.iter().map(|c| columns::cell_text(task, c)));
        }
        table
    }

    #[must_use]
    pub fn users(users: &[User]) -> Self {
        let mut table = Self::new(["ID", "USERNAME", "RANK"]);
        for u in users {
            table.row([
                u.id.as_ref().map(ToString::to_string).unwrap_or_default(),
                u.username.clone(),
                u.rank.to_string(),
            ]);
        }
        table
    }

    pub fn row(&mut self, cols: impl IntoIterator<Item = impl Into<String>>) {
        self.rows.push(cols.into_iter().map(Into::into).collect());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) -> io::Result<()> {
        self.write_to(io::stdout().lock())
    }

    pub fn print_csv(&self) -> io::Result<()> {
        self.write_csv_to(io::stdout().lock())
    }

    pub fn write_csv_to(&self, out: impl io::Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
    }

    pub fn write_to(&self, mut out: impl io::Write) -> io::Result<()> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| visible_width(h)).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(visible_width(cell)),
                    None => widths.push(visible_width(cell)),
                }
            }
        }

        writeln!(out, "{}", format_row(&self.headers, &widths))?;
        for row in &self.rows {
            writeln!(out, "{}", format_row(row, &widths))?;
        }
        Ok(())
    }
}

fn visible_width(s: &str) -> usize {
    // Accented labels are single chars; wide glyphs are not expected here.
    s.chars().count()
}

fn format_row(row: &[String], widths: &[usize]) -> String {
    let cells: Vec<String> = row
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            let pad = w.saturating_sub(visible_width(cell));
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    cells.join("  ").trim_end().to_owned()
}
