use anyhow::{anyhow, Context};
use serde::Serialize;
use std::io::Cursor;
use umya_spreadsheet::structs::{OrientationValues, Worksheet};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Cell {
        Cell::Text(s.into())
    }
}

/// Column range merged on one header row, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Merge {
    pub header_row: usize,
    pub first_col: usize,
    pub last_col: usize,
}

/// One worksheet worth of cells plus layout hints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub name: String,
    pub title: Vec<String>,
    pub header: Vec<Vec<Cell>>,
    pub rows: Vec<Vec<Cell>>,
    pub column_widths: Vec<f64>,
    pub merges: Vec<Merge>,
    pub landscape: bool,
}

impl Sheet {
    pub fn column_count(&self) -> usize {
        self.header
            .iter()
            .chain(self.rows.iter())
            .map(|r| r.len())
            .max()
            .unwrap_or(0)
    }
}

pub trait SheetWriter {
    fn render(&self, sheet: &Sheet) -> anyhow::Result<Vec<u8>>;
}

pub struct XlsxSheetWriter;

/// 1-based column number to spreadsheet letters (1 -> A, 27 -> AA).
pub fn column_letters(mut n: usize) -> String {
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn write_row(ws: &mut Worksheet, row: u32, cells: &[Cell], bold: bool) {
    for (i, cell) in cells.iter().enumerate() {
        let coord = ((i + 1) as u32, row);
        match cell {
            Cell::Empty => continue,
            Cell::Text(s) => {
                ws.get_cell_mut(coord).set_value_string(s.clone());
            }
            Cell::Number(v) => {
                ws.get_cell_mut(coord).set_value_number(*v);
            }
            Cell::Bool(b) => {
                ws.get_cell_mut(coord).set_value_bool(*b);
            }
        }
        if bold {
            ws.get_style_mut(coord).get_font_mut().set_bold(true);
        }
    }
}

impl SheetWriter for XlsxSheetWriter {
    fn render(&self, sheet: &Sheet) -> anyhow::Result<Vec<u8>> {
        let mut book = umya_spreadsheet::new_file();
        let ws = book
            .get_sheet_mut(&0)
            .ok_or_else(|| anyhow!("new workbook has no worksheet"))?;
        ws.set_name(sheet.name.clone());

        let width = sheet.column_count();
        let mut row: u32 = 1;
        for line in &sheet.title {
            ws.get_cell_mut((1, row)).set_value_string(line.clone());
            ws.get_style_mut((1, row)).get_font_mut().set_bold(true);
            if width > 1 {
                ws.add_merge_cells(format!("A{}:{}{}", row, column_letters(width), row));
            }
            row += 1;
        }
        if !sheet.title.is_empty() {
            row += 1;
        }

        let header_start = row;
        for header in &sheet.header {
            write_row(ws, row, header, true);
            row += 1;
        }
        for data in &sheet.rows {
            write_row(ws, row, data, false);
            row += 1;
        }

        for m in &sheet.merges {
            if m.last_col <= m.first_col {
                continue;
            }
            let r = header_start + m.header_row as u32;
            ws.add_merge_cells(format!(
                "{}{}:{}{}",
                column_letters(m.first_col + 1),
                r,
                column_letters(m.last_col + 1),
                r
            ));
        }
        for (i, width) in sheet.column_widths.iter().enumerate() {
            ws.get_column_dimension_mut(&column_letters(i + 1))
                .set_width(*width);
        }
        if sheet.landscape {
            ws.get_page_setup_mut()
                .set_orientation(OrientationValues::Landscape);
        }

        let mut buf = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&book, &mut buf)
            .map_err(|e| anyhow!("{e:?}"))
            .context("failed to serialize workbook")?;
        Ok(buf.into_inner())
    }
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut dash = false;
    for ch in s.trim().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// `<kind>_<scope>_<moment>_<date>.xlsx`, safe for a download header.
pub fn export_file_name(kind: &str, scope: &str, moment_label: &str, date: &str) -> String {
    let scope = slug(scope);
    let scope = if scope.is_empty() { "aula".to_string() } else { scope };
    format!("{}_{}_{}_{}.xlsx", slug(kind), scope, moment_label, date)
}
