//! Table detection over page geometry and anchor-based table recovery.
//!
//! Tables are found the way ruled documents are usually read: collect
//! candidate edges (drawn rulings, or edges inferred from word alignment),
//! snap and join them, intersect vertical with horizontal edges, build the
//! smallest cells bounded by connected intersections, and group cells that
//! share corners into tables. Cell text is the text of the characters whose
//! midpoint falls inside the cell.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::ExtractError;
use crate::layout::{BBox, Edge, NormalizedDocument, Orientation, PageLayout, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Use drawn ruling lines.
    Lines,
    /// Infer rulings from word alignment.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSettings {
    pub vertical_strategy: Strategy,
    pub horizontal_strategy: Strategy,
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub edge_min_length: f64,
    pub intersection_tolerance: f64,
    pub min_words_vertical: usize,
    pub min_words_horizontal: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            vertical_strategy: Strategy::Lines,
            horizontal_strategy: Strategy::Lines,
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            edge_min_length: 3.0,
            intersection_tolerance: 3.0,
            min_words_vertical: 3,
            min_words_horizontal: 1,
        }
    }
}

impl TableSettings {
    pub fn lines() -> Self {
        Self::default()
    }

    pub fn text() -> Self {
        Self {
            vertical_strategy: Strategy::Text,
            horizontal_strategy: Strategy::Text,
            ..Self::default()
        }
    }

    pub fn with_intersection_tolerance(mut self, tolerance: f64) -> Self {
        self.intersection_tolerance = tolerance;
        self
    }
}

/// An extracted table. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub bbox: BBox,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn first_row(&self) -> Option<&[Option<String>]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// Finds every table on `page`, ordered top-to-bottom then left-to-right.
pub fn find_tables(page: &PageLayout, settings: &TableSettings) -> Vec<Table> {
    let edges = table_edges(page, settings);
    let intersections = find_intersections(&edges, settings.intersection_tolerance);
    let cells = intersections_to_cells(&intersections);

    cells_to_tables(cells)
        .into_iter()
        .map(|cells| extract_table(page, &cells))
        .collect()
}

fn table_edges(page: &PageLayout, settings: &TableSettings) -> Vec<Edge> {
    let words = if settings.vertical_strategy == Strategy::Text
        || settings.horizontal_strategy == Strategy::Text
    {
        page.words()
    } else {
        Vec::new()
    };

    let vertical = match settings.vertical_strategy {
        Strategy::Lines => page
            .edges
            .iter()
            .filter(|e| e.orientation == Orientation::Vertical)
            .copied()
            .collect(),
        Strategy::Text => words_to_vertical_edges(&words, settings.min_words_vertical),
    };
    let horizontal = match settings.horizontal_strategy {
        Strategy::Lines => page
            .edges
            .iter()
            .filter(|e| e.orientation == Orientation::Horizontal)
            .copied()
            .collect(),
        Strategy::Text => words_to_horizontal_edges(&words, settings.min_words_horizontal),
    };

    let mut edges: Vec<Edge> = vertical;
    edges.extend(horizontal);
    merge_edges(edges, settings.snap_tolerance, settings.join_tolerance)
        .into_iter()
        .filter(|e| e.length() >= settings.edge_min_length)
        .collect()
}

/// Groups values into clusters whose consecutive members differ by at
/// most `tolerance`; returns, for each input index, its cluster id.
fn cluster_indices(values: &[f64], tolerance: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ids = vec![0; values.len()];
    let mut cluster = 0;
    let mut last: Option<f64> = None;
    for idx in order {
        let v = values[idx];
        if let Some(prev) = last {
            if v - prev > tolerance {
                cluster += 1;
            }
        }
        ids[idx] = cluster;
        last = Some(v);
    }
    ids
}

fn cluster_groups<T: Clone>(items: &[T], key: impl Fn(&T) -> f64, tolerance: f64) -> Vec<Vec<T>> {
    let values: Vec<f64> = items.iter().map(&key).collect();
    let ids = cluster_indices(&values, tolerance);
    let count = ids.iter().max().map_or(0, |m| m + 1);
    let mut groups: Vec<Vec<T>> = vec![Vec::new(); count];
    for (item, id) in items.iter().zip(ids) {
        groups[id].push(item.clone());
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn words_bbox(words: &[Word]) -> BBox {
    BBox::new(
        words.iter().map(|w| w.x0).fold(f64::INFINITY, f64::min),
        words.iter().map(|w| w.top).fold(f64::INFINITY, f64::min),
        words.iter().map(|w| w.x1).fold(f64::NEG_INFINITY, f64::max),
        words.iter().map(|w| w.bottom).fold(f64::NEG_INFINITY, f64::max),
    )
}

fn words_to_horizontal_edges(words: &[Word], threshold: usize) -> Vec<Edge> {
    let rects: Vec<BBox> = cluster_groups(words, |w| w.top, 1.0)
        .into_iter()
        .filter(|g| g.len() >= threshold)
        .map(|g| words_bbox(&g))
        .collect();
    if rects.is_empty() {
        return Vec::new();
    }

    let min_x0 = rects.iter().map(|r| r.x0).fold(f64::INFINITY, f64::min);
    let max_x1 = rects.iter().map(|r| r.x1).fold(f64::NEG_INFINITY, f64::max);
    rects
        .iter()
        .flat_map(|r| {
            [
                Edge::horizontal(min_x0, max_x1, r.top),
                Edge::horizontal(min_x0, max_x1, r.bottom),
            ]
        })
        .collect()
}

fn overlaps(a: &BBox, b: &BBox) -> bool {
    let w = a.x1.min(b.x1) - a.x0.max(b.x0);
    let h = a.bottom.min(b.bottom) - a.top.max(b.top);
    w >= 0.0 && h >= 0.0 && w + h > 0.0
}

fn words_to_vertical_edges(words: &[Word], threshold: usize) -> Vec<Edge> {
    let mut clusters = cluster_groups(words, |w| w.x0, 1.0);
    clusters.extend(cluster_groups(words, |w| w.x1, 1.0));
    clusters.extend(cluster_groups(words, |w| (w.x0 + w.x1) / 2.0, 1.0));
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut condensed: Vec<BBox> = Vec::new();
    for bbox in clusters
        .iter()
        .filter(|c| c.len() >= threshold)
        .map(|c| words_bbox(c))
    {
        if !condensed.iter().any(|c| overlaps(&bbox, c)) {
            condensed.push(bbox);
        }
    }
    if condensed.is_empty() {
        return Vec::new();
    }

    condensed.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    let max_x1 = condensed.iter().map(|r| r.x1).fold(f64::NEG_INFINITY, f64::max);
    let min_top = condensed.iter().map(|r| r.top).fold(f64::INFINITY, f64::min);
    let max_bottom = condensed
        .iter()
        .map(|r| r.bottom)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut edges: Vec<Edge> = condensed
        .iter()
        .map(|r| Edge::vertical(r.x0, min_top, max_bottom))
        .collect();
    edges.push(Edge::vertical(max_x1, min_top, max_bottom));
    edges
}

/// Snaps near-collinear edges onto their mean position, then joins
/// collinear edges that overlap or nearly touch.
fn merge_edges(edges: Vec<Edge>, snap_tolerance: f64, join_tolerance: f64) -> Vec<Edge> {
    let (mut vertical, mut horizontal): (Vec<Edge>, Vec<Edge>) = edges
        .into_iter()
        .partition(|e| e.orientation == Orientation::Vertical);

    snap(&mut vertical, |e| e.x0, |e, x| {
        e.x0 = x;
        e.x1 = x;
    }, snap_tolerance);
    snap(&mut horizontal, |e| e.top, |e, y| {
        e.top = y;
        e.bottom = y;
    }, snap_tolerance);

    let mut merged = join(vertical, join_tolerance);
    merged.extend(join(horizontal, join_tolerance));
    merged
}

fn snap(
    edges: &mut [Edge],
    position: impl Fn(&Edge) -> f64,
    set: impl Fn(&mut Edge, f64),
    tolerance: f64,
) {
    let values: Vec<f64> = edges.iter().map(&position).collect();
    let ids = cluster_indices(&values, tolerance);
    let count = ids.iter().max().map_or(0, |m| m + 1);
    let mut sums = vec![(0.0, 0usize); count];
    for (v, id) in values.iter().zip(&ids) {
        sums[*id].0 += v;
        sums[*id].1 += 1;
    }
    for (edge, id) in edges.iter_mut().zip(&ids) {
        let (sum, n) = sums[*id];
        set(edge, sum / n as f64);
    }
}

fn join(edges: Vec<Edge>, tolerance: f64) -> Vec<Edge> {
    let mut by_position: BTreeMap<i64, Vec<Edge>> = BTreeMap::new();
    for e in edges {
        let pos = match e.orientation {
            Orientation::Vertical => e.x0,
            Orientation::Horizontal => e.top,
        };
        by_position.entry(key(pos)).or_default().push(e);
    }

    let mut out = Vec::new();
    for (_, mut group) in by_position {
        let span = |e: &Edge| match e.orientation {
            Orientation::Vertical => (e.top, e.bottom),
            Orientation::Horizontal => (e.x0, e.x1),
        };
        group.sort_by(|a, b| span(a).0.total_cmp(&span(b).0));

        let mut current: Option<Edge> = None;
        for e in group {
            match current.as_mut() {
                Some(cur) if span(&e).0 <= span(cur).1 + tolerance => match cur.orientation {
                    Orientation::Vertical => cur.bottom = cur.bottom.max(e.bottom),
                    Orientation::Horizontal => cur.x1 = cur.x1.max(e.x1),
                },
                _ => {
                    if let Some(done) = current.replace(e) {
                        out.push(done);
                    }
                }
            }
        }
        if let Some(done) = current {
            out.push(done);
        }
    }
    out
}

/// Quantizes a coordinate for use as a map key.
fn key(v: f64) -> i64 {
    (v * 1000.0).round() as i64
}

#[derive(Debug, Clone, Default)]
struct Intersection {
    x: f64,
    y: f64,
    vertical: HashSet<usize>,
    horizontal: HashSet<usize>,
}

type IntersectionMap = BTreeMap<(i64, i64), Intersection>;

fn find_intersections(edges: &[Edge], tolerance: f64) -> IntersectionMap {
    let mut map: IntersectionMap = BTreeMap::new();
    for (vi, v) in edges.iter().enumerate() {
        if v.orientation != Orientation::Vertical {
            continue;
        }
        for (hi, h) in edges.iter().enumerate() {
            if h.orientation != Orientation::Horizontal {
                continue;
            }
            if v.top <= h.top + tolerance
                && v.bottom >= h.top - tolerance
                && v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance
            {
                let entry = map.entry((key(v.x0), key(h.top))).or_insert_with(|| Intersection {
                    x: v.x0,
                    y: h.top,
                    ..Intersection::default()
                });
                entry.vertical.insert(vi);
                entry.horizontal.insert(hi);
            }
        }
    }
    map
}

fn intersections_to_cells(map: &IntersectionMap) -> Vec<BBox> {
    let points: Vec<(&(i64, i64), &Intersection)> = map.iter().collect();

    let connects = |a: &Intersection, b: &Intersection, same_x: bool| -> bool {
        if same_x {
            !a.vertical.is_disjoint(&b.vertical)
        } else {
            !a.horizontal.is_disjoint(&b.horizontal)
        }
    };

    let mut cells = Vec::new();
    for (i, (pk, pt)) in points.iter().enumerate() {
        let rest = &points[i + 1..];
        let below: Vec<&(&(i64, i64), &Intersection)> =
            rest.iter().filter(|(k, _)| k.0 == pk.0).collect();
        let right: Vec<&(&(i64, i64), &Intersection)> =
            rest.iter().filter(|(k, _)| k.1 == pk.1).collect();

        'search: for (bk, below_pt) in &below {
            if !connects(pt, below_pt, true) {
                continue;
            }
            for (rk, right_pt) in &right {
                if !connects(pt, right_pt, false) {
                    continue;
                }
                if let Some(corner) = map.get(&(rk.0, bk.1)) {
                    if connects(corner, right_pt, true) && connects(corner, below_pt, false) {
                        cells.push(BBox::new(pt.x, pt.y, corner.x, corner.y));
                        break 'search;
                    }
                }
            }
        }
    }
    cells
}

/// Groups cells sharing at least one corner; single-cell groups are dropped.
fn cells_to_tables(cells: Vec<BBox>) -> Vec<Vec<BBox>> {
    let corners = |c: &BBox| {
        [
            (key(c.x0), key(c.top)),
            (key(c.x0), key(c.bottom)),
            (key(c.x1), key(c.top)),
            (key(c.x1), key(c.bottom)),
        ]
    };

    let mut remaining = cells;
    let mut tables: Vec<Vec<BBox>> = Vec::new();
    let mut current: Vec<BBox> = Vec::new();
    let mut current_corners: HashSet<(i64, i64)> = HashSet::new();

    while !remaining.is_empty() {
        let before = current.len();
        let mut i = 0;
        while i < remaining.len() {
            let cell_corners = corners(&remaining[i]);
            if current.is_empty() || cell_corners.iter().any(|c| current_corners.contains(c)) {
                let cell = remaining.remove(i);
                current_corners.extend(cell_corners);
                current.push(cell);
            } else {
                i += 1;
            }
        }
        if current.len() == before {
            tables.push(std::mem::take(&mut current));
            current_corners.clear();
        }
    }
    if !current.is_empty() {
        tables.push(current);
    }

    let sort_key = |t: &Vec<BBox>| {
        t.iter()
            .map(|c| (key(c.top), key(c.x0)))
            .min()
            .unwrap_or((0, 0))
    };
    tables.sort_by_key(|t| sort_key(t));
    tables.retain(|t| t.len() > 1);
    tables
}

fn extract_table(page: &PageLayout, cells: &[BBox]) -> Table {
    let mut xs: Vec<i64> = cells.iter().map(|c| key(c.x0)).collect();
    xs.sort_unstable();
    xs.dedup();

    let mut by_top: BTreeMap<i64, BTreeMap<i64, BBox>> = BTreeMap::new();
    for c in cells {
        by_top.entry(key(c.top)).or_default().insert(key(c.x0), *c);
    }

    let rows: Vec<Vec<Option<String>>> = by_top
        .values()
        .map(|row| {
            xs.iter()
                .map(|x| row.get(x).map(|cell| cell_text(page, cell)))
                .collect::<Vec<_>>()
        })
        .collect();

    let bbox = BBox::new(
        cells.iter().map(|c| c.x0).fold(f64::INFINITY, f64::min),
        cells.iter().map(|c| c.top).fold(f64::INFINITY, f64::min),
        cells.iter().map(|c| c.x1).fold(f64::NEG_INFINITY, f64::max),
        cells.iter().map(|c| c.bottom).fold(f64::NEG_INFINITY, f64::max),
    );

    Table { bbox, rows }
}

fn cell_text(page: &PageLayout, cell: &BBox) -> String {
    let mut sub = PageLayout::new(page.number, page.width, page.height);
    sub.bbox = *cell;
    sub.chars = page
        .chars
        .iter()
        .filter(|c| cell.contains_point((c.x0 + c.x1) / 2.0, (c.top + c.bottom) / 2.0))
        .cloned()
        .collect();
    sub.extract_text()
}

// ============ Anchor-based recovery ============

/// A table normalized for consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableRecord {
    /// A two-column table read as key/value pairs.
    KeyValue(KeyValueRecord),
    /// Any other table; `headers` is set when the first row was promoted.
    Grid {
        headers: Option<Vec<String>>,
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyValueRecord {
    pub entries: Vec<(String, String)>,
}

impl KeyValueRecord {
    /// Inserts `key`, replacing the value of an earlier equal key.
    pub fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Looks up a key ignoring case and whitespace layout.
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = fold_key(key);
        self.entries
            .iter()
            .find(|(k, _)| fold_key(k) == wanted)
            .map(|(_, v)| v.as_str())
    }
}

fn fold_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes a raw table: separator rows are dropped, two-column tables
/// become key/value records, and wider tables get their header promoted.
pub fn normalize_table(table: &Table) -> TableRecord {
    let rows: Vec<&Vec<Option<String>>> = table
        .rows
        .iter()
        .filter(|r| !is_separator(r.first().and_then(|c| c.as_deref())))
        .collect();

    let columns = rows.first().map_or(0, |r| r.len());
    let trim = |c: &Option<String>| c.as_deref().unwrap_or("").trim().to_string();

    if columns == 2 {
        let mut record = KeyValueRecord::default();
        for row in &rows {
            let key = trim(&row[0]);
            let value = trim(&row[1]);
            match (key.is_empty(), value.is_empty()) {
                (true, true) => continue,
                (true, false) => record.entries.push((key, value)),
                _ => record.insert(key, value),
            }
        }
        return TableRecord::KeyValue(record);
    }

    let promote =
        rows.len() > 1 && columns > 2 && rows.first().is_some_and(|r| r.iter().all(Option::is_some));
    let (headers, body) = if promote {
        (Some(rows[0].iter().map(trim).collect::<Vec<_>>()), &rows[1..])
    } else {
        (None, &rows[..])
    };

    TableRecord::Grid {
        headers,
        rows: body
            .iter()
            .map(|r| r.iter().map(trim).collect::<Vec<_>>())
            .collect(),
    }
}

fn is_separator(cell: Option<&str>) -> bool {
    let cell = cell.unwrap_or("").trim();
    cell.len() >= 3 && cell.chars().all(|c| c == '-')
}

fn normalize_token(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// Bottom of the heading on `page`: first by the token sequence against
/// the page words, then by the anchor regex against grouped lines.
fn heading_bottom(page: &PageLayout, anchor: &Regex, tokens: &[String]) -> Option<f64> {
    let mut words: Vec<Word> = page.words();
    words.sort_by(|a, b| {
        (a.top / 3.0)
            .round()
            .total_cmp(&(b.top / 3.0).round())
            .then(a.x0.total_cmp(&b.x0))
    });

    let wanted: Vec<String> = tokens
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| !t.is_empty())
        .collect();
    let normalized: Vec<(String, &Word)> = words
        .iter()
        .map(|w| (normalize_token(&w.text), w))
        .filter(|(t, _)| !t.is_empty())
        .collect();

    if !wanted.is_empty() && normalized.len() >= wanted.len() {
        for window in normalized.windows(wanted.len()) {
            if window.iter().zip(&wanted).all(|((t, _), w)| t == w) {
                return window
                    .iter()
                    .map(|(_, w)| w.bottom)
                    .reduce(f64::max);
            }
        }
    }

    let mut lines: BTreeMap<i64, Vec<&Word>> = BTreeMap::new();
    for w in &words {
        lines.entry((w.top / 3.0).round() as i64).or_default().push(w);
    }
    for line in lines.values() {
        let text = line
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if anchor.is_match(&text) {
            return line.iter().map(|w| w.bottom).reduce(f64::max);
        }
    }

    None
}

/// Recovers the first table below the anchor heading.
///
/// Pages are tried in order; a page qualifies when its text matches the
/// anchor. The region from just below the heading to the page bottom is
/// searched with ruled lines first and word alignment second.
pub fn recover_table(
    doc: &NormalizedDocument,
    anchor: &Regex,
    tokens: &[String],
) -> Result<TableRecord, ExtractError> {
    for page in &doc.raw_pages {
        if !anchor.is_match(&page.extract_text()) {
            continue;
        }

        let top = match heading_bottom(page, anchor, tokens) {
            Some(bottom) => bottom + 4.0,
            None => 0.0,
        };
        let region = page.crop(BBox::new(0.0, top, page.width, page.height));

        let mut tables = find_tables(
            &region,
            &TableSettings::lines().with_intersection_tolerance(5.0),
        );
        if tables.is_empty() {
            tables = find_tables(&region, &TableSettings::text());
        }

        match tables.first() {
            Some(table) => {
                debug!(page = page.number, rows = table.rows.len(), "recovered anchor table");
                return Ok(normalize_table(table));
            }
            None => debug!(page = page.number, "anchor page has no table below heading"),
        }
    }

    Err(ExtractError::AnchorNotFound(anchor.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::layout::fixtures::{build_form_pdf, build_pdf, grid, text};
    use crate::layout::{normalize, Char, PdfLayout};

    fn page_from(items: Vec<crate::layout::fixtures::Item>) -> PageLayout {
        let pdf = build_pdf(&[items]);
        PdfLayout::from_bytes(&pdf).unwrap().pages.remove(0)
    }

    fn cells(t: &Table) -> Vec<Vec<String>> {
        t.rows
            .iter()
            .map(|r| r.iter().map(|c| c.clone().unwrap_or_default()).collect())
            .collect()
    }

    #[test]
    fn test_lines_strategy_reads_ruled_grid() {
        let page = page_from(grid(
            50,
            100,
            &[120, 200],
            20,
            &[&["Curso", "Primero"], &["Semestre", "Segundo"]],
        ));
        let tables = find_tables(&page, &TableSettings::lines());
        assert_eq!(tables.len(), 1);
        assert_eq!(
            cells(&tables[0]),
            vec![vec!["Curso", "Primero"], vec!["Semestre", "Segundo"]]
        );
    }

    #[test]
    fn test_two_separate_grids_are_two_tables_in_reading_order() {
        let mut items = grid(50, 400, &[100, 100], 20, &[&["b1", "b2"], &["b3", "b4"]]);
        items.extend(grid(50, 100, &[100, 100], 20, &[&["a1", "a2"], &["a3", "a4"]]));
        let tables = find_tables(&page_from(items), &TableSettings::lines());
        assert_eq!(tables.len(), 2);
        assert_eq!(cells(&tables[0])[0], vec!["a1", "a2"]);
        assert_eq!(cells(&tables[1])[0], vec!["b1", "b2"]);
    }

    #[test]
    fn test_single_cell_is_not_a_table() {
        let page = page_from(grid(50, 100, &[100], 20, &[&["solo"]]));
        assert!(find_tables(&page, &TableSettings::lines()).is_empty());
    }

    #[test]
    fn test_text_strategy_finds_aligned_columns() {
        let mut items = Vec::new();
        for (i, (k, v)) in [("Curso", "Primero"), ("Semestre", "Segundo"), ("Idioma", "Castellano")]
            .iter()
            .enumerate()
        {
            let y = 100 + 20 * i as i64;
            items.push(text(50, y, 9, k));
            items.push(text(200, y, 9, v));
        }
        let tables = find_tables(&page_from(items), &TableSettings::text());
        assert_eq!(tables.len(), 1);
        assert_eq!(
            cells(&tables[0]),
            vec![
                vec!["Curso", "Primero"],
                vec!["", ""],
                vec!["Semestre", "Segundo"],
                vec!["", ""],
                vec!["Idioma", "Castellano"],
            ]
        );
        let TableRecord::KeyValue(kv) = normalize_table(&tables[0]) else {
            panic!("expected key/value record");
        };
        assert_eq!(kv.get("Semestre"), Some("Segundo"));
        assert_eq!(kv.entries.len(), 3);
    }

    #[test]
    fn test_multiline_cell_text_keeps_newline() {
        let mut items = grid(
            50,
            100,
            &[150, 150],
            30,
            &[&["", "10 - ETSISI"], &["Curso", "Primero"]],
        );
        items.push(text(53, 112, 9, "Centro responsable de la"));
        items.push(text(53, 124, 9, "titulación"));
        let tables = find_tables(&page_from(items), &TableSettings::lines());
        assert_eq!(cells(&tables[0])[0][0], "Centro responsable de la\ntitulación");
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
    fn test_two_columns_become_key_value_with_trimmed_values() {
        let t = table(&[
            &[Some(" Curso "), Some(" Primero ")],
            &[Some("---"), Some("")],
            &[Some(""), Some("")],
            &[Some("Centro responsable de la\ntitulación"), Some("10 - ETSISI")],
            &[Some("Curso"), Some("Segundo")],
        ]);
        let TableRecord::KeyValue(kv) = normalize_table(&t) else {
            panic!("expected key/value record");
        };
        assert_eq!(kv.entries.len(), 2);
        assert_eq!(kv.get("Curso"), Some("Segundo"));
        assert_eq!(kv.get("Centro responsable de la titulación"), Some("10 - ETSISI"));
    }

    #[test]
    fn test_row_with_only_a_value_is_kept() {
        let t = table(&[
            &[Some("Curso"), Some("Primero")],
            &[Some(""), Some("continuación")],
            &[None, None],
        ]);
        let TableRecord::KeyValue(kv) = normalize_table(&t) else {
            panic!("expected key/value record");
        };
        assert_eq!(
            kv.entries,
            vec![
                ("Curso".to_string(), "Primero".to_string()),
                (String::new(), "continuación".to_string()),
            ]
        );
    }

    #[test]
    fn test_wide_table_promotes_header() {
        let t = table(&[
            &[Some("Nombre"), Some("Tipo"), Some("Observaciones")],
            &[Some("Libro"), Some("Bibliografía"), None],
        ]);
        assert_eq!(
            normalize_table(&t),
            TableRecord::Grid {
                headers: Some(vec!["Nombre".into(), "Tipo".into(), "Observaciones".into()]),
                rows: vec![vec!["Libro".into(), "Bibliografía".into(), "".into()]],
            }
        );
    }

    #[test]
    fn test_header_not_promoted_when_first_row_has_missing_cell() {
        let t = table(&[
            &[Some("a"), None, Some("c")],
            &[Some("d"), Some("e"), Some("f")],
        ]);
        let TableRecord::Grid { headers, rows } = normalize_table(&t) else {
            panic!("expected grid");
        };
        assert!(headers.is_none());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_recover_table_below_anchor() {
        let mut page = vec![
            text(50, 40, 9, "Guía de aprendizaje"),
            text(50, 90, 11, "1.1. Datos de la asignatura"),
        ];
        page.extend(grid(
            50,
            110,
            &[160, 250],
            20,
            &[
                &["Nombre de la asignatura", "105000006 - Sistemas Operativos"],
                &["No de créditos", "6 ECTS"],
            ],
        ));
        let pdf = build_pdf(&[vec![text(50, 300, 12, "Portada")], page]);
        let doc = normalize(PdfLayout::from_bytes(&pdf).unwrap(), &ExtractionConfig::default());
        let anchor = Regex::new(r"1\.1\.\s*Datos\s+de\s+la\s+asignatura").unwrap();
        let tokens: Vec<String> = ["1.1.", "Datos", "de", "la", "asignatura"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let TableRecord::KeyValue(kv) = recover_table(&doc, &anchor, &tokens).unwrap() else {
            panic!("expected key/value record");
        };
        assert_eq!(kv.get("No de créditos"), Some("6 ECTS"));
        assert_eq!(
            kv.get("Nombre de la asignatura"),
            Some("105000006 - Sistemas Operativos")
        );
    }

    #[test]
    fn test_recover_table_drawn_inside_form_xobject() {
        let mut page = vec![text(50, 90, 11, "1.1. Datos de la asignatura")];
        page.extend(grid(
            50,
            110,
            &[160, 250],
            20,
            &[&["Curso", "Segundo curso"], &["Semestre", "Tercer semestre"]],
        ));
        let pdf = build_form_pdf(&[page], [1, 0, 0, 1, 0, 0]);
        let doc = normalize(PdfLayout::from_bytes(&pdf).unwrap(), &ExtractionConfig::default());
        let anchor = Regex::new(r"1\.1\.\s*Datos\s+de\s+la\s+asignatura").unwrap();
        let tokens: Vec<String> = ["1.1.", "Datos", "de", "la", "asignatura"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let TableRecord::KeyValue(kv) = recover_table(&doc, &anchor, &tokens).unwrap() else {
            panic!("expected key/value record");
        };
        assert_eq!(kv.get("Curso"), Some("Segundo curso"));
        assert_eq!(kv.get("Semestre"), Some("Tercer semestre"));
    }

    #[test]
    fn test_recover_table_without_anchor_fails() {
        let pdf = build_pdf(&[vec![text(50, 300, 12, "Sin datos")]]);
        let doc = normalize(PdfLayout::from_bytes(&pdf).unwrap(), &ExtractionConfig::default());
        let anchor = Regex::new(r"1\.1\.\s*Datos").unwrap();
        let err = recover_table(&doc, &anchor, &[]).unwrap_err();
        assert!(matches!(err, ExtractError::AnchorNotFound(_)));
    }

    #[test]
    fn test_heading_bottom_by_tokens() {
        let mut page = PageLayout::new(1, 595.0, 842.0);
        for (i, t) in "1.1. Datos de la asignatura".chars().enumerate() {
            page.chars.push(Char {
                text: t.to_string(),
                x0: 50.0 + 5.0 * i as f64,
                x1: 55.0 + 5.0 * i as f64,
                top: 90.0,
                bottom: 101.0,
                size: 11.0,
            });
        }
        let anchor = Regex::new("nothing").unwrap();
        let tokens: Vec<String> = vec!["1.1.".into(), "Datos".into(), "de".into(), "la".into(), "asignatura".into()];
        assert_eq!(heading_bottom(&page, &anchor, &tokens), Some(101.0));
    }
}
