//! Record parsing for competency blocks and reference tables.

use regex::Regex;

use crate::models::{BibliographyRow, Competency, Faculty};
use crate::patterns::ColumnNames;
use crate::table::Table;

/// Splits a competency block into `(code, text)` pairs.
///
/// Codes and texts are matched independently and zipped by position; a code
/// without a matching text gets an empty one.
pub fn parse_competencies(text: &str, code: &Regex, split: &Regex) -> Vec<Competency> {
    let codes = code
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()));
    let texts: Vec<String> = split
        .split(text)
        .map(|t| t.replace('\n', " ").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    codes
        .enumerate()
        .map(|(i, code)| Competency {
            code,
            text: texts.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Column lookup over a table whose first row is the header.
struct HeaderedTable<'a> {
    header: Vec<String>,
    body: &'a [Vec<Option<String>>],
}

impl<'a> HeaderedTable<'a> {
    fn new(table: &'a Table) -> Option<Self> {
        let (first, body) = table.rows.split_first()?;
        let header = first
            .iter()
            .map(|c| fold(c.as_deref().unwrap_or("")))
            .collect();
        Some(Self { header, body })
    }

    fn column(&self, name: &str) -> Option<usize> {
        let wanted = fold(name);
        self.header.iter().position(|h| *h == wanted)
    }

    /// Cell text, or empty when the column or the cell is absent.
    fn cell(row: &[Option<String>], column: Option<usize>) -> String {
        column
            .and_then(|i| row.get(i))
            .and_then(|c| c.clone())
            .unwrap_or_default()
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_url(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("http://") || s.starts_with("https://")
}

/// Keeps the bibliography rows typed `kind`, dropping link rows and
/// flattening line breaks.
pub fn bibliography_rows(table: &Table, columns: &ColumnNames, kind: &str) -> Vec<BibliographyRow> {
    let Some(t) = HeaderedTable::new(table) else {
        return Vec::new();
    };
    let name_col = t.column(&columns.name);
    let kind_col = t.column(&columns.kind);
    let notes_col = t.column(&columns.notes);

    t.body
        .iter()
        .filter_map(|row| {
            let name = HeaderedTable::cell(row, name_col);
            let row_kind = HeaderedTable::cell(row, kind_col);
            if is_url(&name) || row_kind.trim() != kind {
                return None;
            }
            Some(BibliographyRow {
                name: name.replace('\n', " ").trim().to_string(),
                kind: row_kind.trim().to_string(),
                notes: HeaderedTable::cell(row, notes_col)
                    .replace('\n', " ")
                    .trim()
                    .to_string(),
            })
        })
        .collect()
}

/// Reads `(name, email)` pairs from a faculty table. Only the first line of
/// a name cell is kept; the rest holds office and tutoring details.
pub fn faculty_rows(table: &Table, columns: &ColumnNames) -> Vec<Faculty> {
    let Some(t) = HeaderedTable::new(table) else {
        return Vec::new();
    };
    let name_col = t.column(&columns.name);
    let email_col = t.column(&columns.email);

    t.body
        .iter()
        .filter_map(|row| {
            let name = HeaderedTable::cell(row, name_col)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            let email = HeaderedTable::cell(row, email_col).trim().to_string();
            if is_url(&name) || (name.is_empty() && email.is_empty()) {
                return None;
            }
            Some(Faculty { name, email })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BBox;

    fn code_re() -> Regex {
        Regex::new(r"\n?([A-Z]{2}\d+)\s*-\s*").unwrap()
    }

    fn split_re() -> Regex {
        Regex::new(r"\n?[A-Z]{2}\d+\s*-\s*").unwrap()
    }

    fn table(rows: &[&[Option<&str>]]) -> Table {
        Table {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.map(String::from)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_competencies_split_into_code_text_pairs() {
        let parsed = parse_competencies("AB12 - texto uno\nCD34 - texto dos", &code_re(), &split_re());
        assert_eq!(
            parsed,
            vec![
                Competency { code: "AB12".into(), text: "texto uno".into() },
                Competency { code: "CD34".into(), text: "texto dos".into() },
            ]
        );
    }

    #[test]
    fn test_competency_text_lines_are_joined() {
        let parsed = parse_competencies(
            "CG01 - Capacidad de análisis\ny síntesis\nCE12-Diseño",
            &code_re(),
            &split_re(),
        );
        assert_eq!(parsed[0].text, "Capacidad de análisis y síntesis");
        assert_eq!(parsed[1].code, "CE12");
        assert_eq!(parsed[1].text, "Diseño");
    }

    #[test]
    fn test_competency_without_text_gets_empty_string() {
        let parsed = parse_competencies("CG01 - ", &code_re(), &split_re());
        assert_eq!(parsed, vec![Competency { code: "CG01".into(), text: String::new() }]);
    }

    #[test]
    fn test_bibliography_rows_filter_links_and_type() {
        let t = table(&[
            &[Some("Nombre"), Some("Tipo"), Some("Observaciones")],
            &[Some("Sistemas operativos.\nStallings"), Some("Bibliografía"), Some("Edición\n9")],
            &[Some("https://moodle.upm.es"), Some("Bibliografía"), None],
            &[Some("Laboratorio"), Some("Equipamiento"), Some("")],
        ]);
        let rows = bibliography_rows(&t, &ColumnNames::default(), "Bibliografía");
        assert_eq!(
            rows,
            vec![BibliographyRow {
                name: "Sistemas operativos. Stallings".into(),
                kind: "Bibliografía".into(),
                notes: "Edición 9".into(),
            }]
        );
    }

    #[test]
    fn test_faculty_rows_keep_first_name_line() {
        let t = table(&[
            &[Some("Nombre"), Some("Despacho"), Some("Correo electrónico")],
            &[Some("Ana García (Coordinadora)\nTutorías: L 10-12"), Some("1201"), Some(" ana@upm.es ")],
            &[Some("http://www.upm.es"), None, None],
            &[Some(""), Some(""), Some("")],
        ]);
        let rows = faculty_rows(&t, &ColumnNames::default());
        assert_eq!(
            rows,
            vec![Faculty {
                name: "Ana García (Coordinadora)".into(),
                email: "ana@upm.es".into(),
            }]
        );
    }

    #[test]
    fn test_missing_column_defaults_to_empty() {
        let t = table(&[&[Some("Nombre")], &[Some("Luis Pérez")]]);
        let rows = faculty_rows(&t, &ColumnNames::default());
        assert_eq!(rows[0].email, "");
    }
}
