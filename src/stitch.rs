//! Continuation of tables that overflow onto following pages.

use std::collections::HashSet;

use crate::layout::NormalizedDocument;
use crate::table::{find_tables, Table, TableSettings};

/// Extracts ruled tables from every body page. Tables with fewer than two
/// rows are dropped; pages keep their position even when empty.
pub fn tables_by_page(doc: &NormalizedDocument) -> Vec<Vec<Table>> {
    let settings = TableSettings::lines();
    doc.pages
        .iter()
        .map(|page| {
            find_tables(page, &settings)
                .into_iter()
                .filter(|t| t.rows.len() >= 2)
                .collect()
        })
        .collect()
}

fn fold(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when the row's non-empty cells, trimmed and lower-cased, include
/// every target header.
pub fn has_target_headers(row: &[Option<String>], targets: &[String]) -> bool {
    let present: HashSet<String> = row
        .iter()
        .flatten()
        .map(|c| fold(c))
        .filter(|c| !c.is_empty())
        .collect();
    targets.iter().all(|t| present.contains(&fold(t)))
}

fn table_has_headers(table: &Table, targets: &[String]) -> bool {
    table
        .first_row()
        .is_some_and(|row| has_target_headers(row, targets))
}

/// Finds the first table headed by `targets` and appends the rows of the
/// leading table of each following page while that table has no header of
/// its own. Continuation only happens from the last table on a page.
pub fn stitch(pages: &[Vec<Table>], targets: &[String]) -> Option<Table> {
    let (mut page_idx, mut table_idx) = pages.iter().enumerate().find_map(|(p, tables)| {
        tables
            .iter()
            .position(|t| table_has_headers(t, targets))
            .map(|t| (p, t))
    })?;

    let mut merged = pages[page_idx][table_idx].clone();

    loop {
        let is_last_on_page = table_idx + 1 == pages[page_idx].len();
        let next = pages.get(page_idx + 1).and_then(|tables| tables.first());
        match next {
            Some(next) if is_last_on_page && !table_has_headers(next, targets) => {
                merged.rows.extend(next.rows.iter().cloned());
                page_idx += 1;
                table_idx = 0;
            }
            _ => break,
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BBox;

    fn t(rows: &[&[&str]]) -> Table {
        Table {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        }
    }

    fn targets() -> Vec<String> {
        vec!["nombre".into(), "correo electrónico".into()]
    }

    #[test]
    fn test_header_superset_ignores_case_and_blank_cells() {
        let row = vec![
            Some(" Nombre ".to_string()),
            None,
            Some("Despacho".to_string()),
            Some("Correo\nelectrónico".to_string()),
        ];
        assert!(has_target_headers(&row, &targets()));
        assert!(!has_target_headers(&[Some("Nombre".to_string())], &targets()));
    }

    #[test]
    fn test_merges_continuation_without_header() {
        let pages = vec![
            vec![
                t(&[&["Otra", "tabla"], &["x", "y"]]),
                t(&[&["Nombre", "Correo electrónico"], &["Ana", "ana@upm.es"]]),
            ],
            vec![t(&[&["Luis", "luis@upm.es"], &["Eva", "eva@upm.es"]])],
            vec![t(&[&["Pilar", "pilar@upm.es"], &["Juan", "juan@upm.es"]])],
        ];
        let merged = stitch(&pages, &targets()).unwrap();
        assert_eq!(merged.rows.len(), 6);
        assert_eq!(merged.rows[5][0].as_deref(), Some("Juan"));
    }

    #[test]
    fn test_no_merge_when_next_table_has_header() {
        let pages = vec![
            vec![t(&[&["Nombre", "Correo electrónico"], &["Ana", "ana@upm.es"]])],
            vec![t(&[&["Nombre", "Correo electrónico"], &["Luis", "luis@upm.es"]])],
        ];
        let merged = stitch(&pages, &targets()).unwrap();
        assert_eq!(merged.rows.len(), 2);
    }

    #[test]
    fn test_no_merge_when_table_is_not_last_on_page() {
        let pages = vec![
            vec![
                t(&[&["Nombre", "Correo electrónico"], &["Ana", "ana@upm.es"]]),
                t(&[&["Horario", "Aula"], &["L 9:00", "1201"]]),
            ],
            vec![t(&[&["Luis", "luis@upm.es"], &["Eva", "eva@upm.es"]])],
        ];
        assert_eq!(stitch(&pages, &targets()).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_stops_at_page_without_tables() {
        let pages = vec![
            vec![t(&[&["Nombre", "Correo electrónico"], &["Ana", "ana@upm.es"]])],
            vec![],
            vec![t(&[&["Luis", "luis@upm.es"], &["Eva", "eva@upm.es"]])],
        ];
        assert_eq!(stitch(&pages, &targets()).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_none_when_no_table_has_headers() {
        let pages = vec![vec![t(&[&["a", "b"], &["c", "d"]])]];
        assert!(stitch(&pages, &targets()).is_none());
    }
}
