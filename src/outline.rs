//! Syllabus outline extraction and structuring.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(\.\d+)*\.\s+.+").unwrap());
static NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\.\s*(.+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNode {
    pub number: String,
    pub title: String,
    #[serde(default)]
    pub subtopics: Vec<TopicNode>,
}

/// Returns the flat syllabus lines that follow `heading`, or `None` when
/// the heading is absent.
///
/// Lines before the first numbered item are kept. The list ends at the
/// first unnumbered line after it began, or when a top-level number jumps
/// by more than one.
pub fn extract_syllabus_lines(text: &str, heading: &Regex) -> Option<Vec<String>> {
    let m = heading.find(text)?;

    let mut lines = Vec::new();
    let mut previous_top: Option<u64> = None;

    for line in text[m.end()..].lines().map(str::trim).filter(|l| !l.is_empty()) {
        match ITEM_RE.captures(line) {
            Some(caps) => {
                let top: u64 = caps[1].parse().unwrap_or(u64::MAX);
                if let Some(prev) = previous_top {
                    if top > prev.saturating_add(1) {
                        break;
                    }
                }
                previous_top = Some(top);
                lines.push(line.to_string());
            }
            None if previous_top.is_some() => break,
            None => lines.push(line.to_string()),
        }
    }

    Some(lines)
}

struct ArenaNode {
    number: String,
    title: String,
    children: Vec<usize>,
}

/// Builds the topic tree. Roots are the single-component numbers; a
/// deeper node whose parent number was never seen is dropped along with
/// anything nested under it.
pub fn structure_outline<S: AsRef<str>>(lines: &[S]) -> Vec<TopicNode> {
    let mut arena: Vec<ArenaNode> = Vec::new();
    let mut by_number: HashMap<String, usize> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for line in lines {
        let Some(caps) = NODE_RE.captures(line.as_ref().trim()) else {
            continue;
        };
        let number = caps[1].to_string();
        let title = caps[2].trim().to_string();

        let parent = match number.rsplit_once('.') {
            None => None,
            Some((prefix, _)) => match by_number.get(prefix) {
                Some(&p) => Some(p),
                None => {
                    debug!(number = %number, "dropping outline node without parent");
                    continue;
                }
            },
        };

        let idx = arena.len();
        arena.push(ArenaNode {
            number: number.clone(),
            title,
            children: Vec::new(),
        });
        by_number.insert(number, idx);

        match parent {
            Some(p) => arena[p].children.push(idx),
            None => roots.push(idx),
        }
    }

    roots.iter().map(|&i| build(&arena, i)).collect()
}

fn build(arena: &[ArenaNode], idx: usize) -> TopicNode {
    let node = &arena[idx];
    TopicNode {
        number: node.number.clone(),
        title: node.title.clone(),
        subtopics: node.children.iter().map(|&c| build(arena, c)).collect(),
    }
}

/// Walks the tree depth-first, yielding `(depth, node)` with roots at depth 1.
pub fn flatten(nodes: &[TopicNode]) -> Vec<(usize, &TopicNode)> {
    fn walk<'a>(nodes: &'a [TopicNode], depth: usize, out: &mut Vec<(usize, &'a TopicNode)>) {
        for n in nodes {
            out.push((depth, n));
            walk(&n.subtopics, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(nodes, 1, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading() -> Regex {
        Regex::new(r"\b\d+\.\d+\.\s*Temario\s+de\s+la\s+asignatura\b").unwrap()
    }

    #[test]
    fn test_missing_heading_is_none() {
        assert!(extract_syllabus_lines("1. Procesos", &heading()).is_none());
    }

    #[test]
    fn test_stops_on_top_level_jump() {
        let text = "3.2. Temario de la asignatura\n1. Uno\n1.1. Uno a\n2. Dos\n3. Tres\n7. Evaluación";
        let lines = extract_syllabus_lines(text, &heading()).unwrap();
        assert_eq!(lines, vec!["1. Uno", "1.1. Uno a", "2. Dos", "3. Tres"]);
    }

    #[test]
    fn test_keeps_preamble_and_stops_on_unnumbered_line() {
        let text = "3.2. Temario de la asignatura\n\nTemas:\n1. Uno\n2. Dos\nCronograma orientativo\n3. Tres";
        let lines = extract_syllabus_lines(text, &heading()).unwrap();
        assert_eq!(lines, vec!["Temas:", "1. Uno", "2. Dos"]);
    }

    #[test]
    fn test_nesting_follows_number_prefix() {
        let tree = structure_outline(&[
            "1. Introducción",
            "1.1. Historia",
            "1.1.1. Orígenes",
            "1.2. Conceptos",
            "2. Procesos",
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].subtopics.len(), 2);
        assert_eq!(tree[0].subtopics[0].subtopics[0].number, "1.1.1");
        assert_eq!(tree[0].subtopics[0].subtopics[0].title, "Orígenes");
        assert_eq!(tree[1].title, "Procesos");
    }

    #[test]
    fn test_orphan_and_its_children_are_dropped() {
        let tree = structure_outline(&["1. Uno", "2.3. Huérfano", "2.3.1. Nieto", "3. Tres"]);
        let numbers: Vec<&str> = tree.iter().map(|n| n.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "3"]);
        assert!(tree.iter().all(|n| n.subtopics.is_empty()));
    }

    #[test]
    fn test_preamble_lines_are_ignored_by_structurer() {
        let tree = structure_outline(&["Temas:", "1. Uno"]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_flatten_reports_depth() {
        let tree = structure_outline(&["1. Uno", "1.1. Uno a", "2. Dos"]);
        let flat: Vec<(usize, &str)> = flatten(&tree)
            .into_iter()
            .map(|(d, n)| (d, n.number.as_str()))
            .collect();
        assert_eq!(flat, vec![(1, "1"), (2, "1.1"), (1, "2")]);
    }
}
