//! Ranked search over a containment tree.
//!
//! A query scores a node in two ways and keeps the better one:
//! - as a hexadecimal byte offset (`0x1f` or `1f`), any node whose range
//!   holds the offset scores at least 0.5, tighter ranges scoring higher;
//! - as a name, by character overlap with the raw or display name, plus
//!   `query_len / name_len` when the name contains the query outright
//!   (capped at 1.0).

use crate::tree::TreeNode;
use serde::Serialize;

/// Size of the range at which an offset hit decays to the 0.5 floor.
const OFFSET_SCALE: f64 = 1_000_000.0;
const OFFSET_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Nodes must score strictly above this to be reported.
    pub min_score: f64,
    /// Lowest-scoring matches beyond this count are dropped.
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            max_results: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch<'a> {
    pub score: f64,
    pub node: &'a TreeNode,
    /// Display names from the outermost ancestor down to the parent.
    pub ancestor_names: Vec<String>,
}

/// Search with the default threshold and result cap.
pub fn search<'a>(tree: &'a TreeNode, query: &str) -> Vec<SearchMatch<'a>> {
    search_with(tree, query, &SearchOptions::default())
}

pub fn search_with<'a>(
    tree: &'a TreeNode,
    query: &str,
    options: &SearchOptions,
) -> Vec<SearchMatch<'a>> {
    let query = query.trim();
    if query.is_empty() || options.max_results == 0 {
        return Vec::new();
    }
    let query = Query::new(query);
    let mut results = Vec::new();
    let mut ancestors = Vec::new();
    for child in &tree.children {
        visit(child, &query, options, &mut ancestors, &mut results);
    }
    results
}

struct Query {
    lowered: Vec<char>,
    text: String,
    offset: Option<u64>,
}

impl Query {
    fn new(raw: &str) -> Self {
        let text = raw.to_lowercase();
        Self {
            lowered: text.chars().collect(),
            offset: parse_offset(raw),
            text,
        }
    }
}

fn parse_offset(raw: &str) -> Option<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u64::from_str_radix(digits, 16).ok()
}

fn visit<'a>(
    node: &'a TreeNode,
    query: &Query,
    options: &SearchOptions,
    ancestors: &mut Vec<String>,
    results: &mut Vec<SearchMatch<'a>>,
) {
    let score = score_node(node, query);
    if score > options.min_score {
        insert_ranked(
            results,
            SearchMatch {
                score,
                node,
                ancestor_names: ancestors.clone(),
            },
            options.max_results,
        );
    }

    if node.children.is_empty() {
        return;
    }
    ancestors.push(node.display_name.clone());
    for child in &node.children {
        visit(child, query, options, ancestors, results);
    }
    ancestors.pop();
}

/// Insert before the first strictly lower score, so ties keep discovery
/// order, then drop the tail past `cap`.
fn insert_ranked<'a>(results: &mut Vec<SearchMatch<'a>>, found: SearchMatch<'a>, cap: usize) {
    let at = results
        .iter()
        .position(|m| m.score < found.score)
        .unwrap_or(results.len());
    if at >= cap {
        return;
    }
    results.insert(at, found);
    results.truncate(cap);
}

fn score_node(node: &TreeNode, query: &Query) -> f64 {
    let by_offset = query
        .offset
        .filter(|&offset| node.range.contains_offset(offset))
        .map(|_| (1.0 - f64::from(node.range.len()) / OFFSET_SCALE).max(OFFSET_FLOOR))
        .unwrap_or(0.0);
    let by_name = name_score(&node.raw_name, query).max(name_score(&node.display_name, query));
    by_offset.max(by_name)
}

fn name_score(name: &str, query: &Query) -> f64 {
    if name.is_empty() {
        return 0.0;
    }
    let name = name.to_lowercase();
    let name_len = name.chars().count();
    let query_len = query.lowered.len();

    let present = query.lowered.iter().filter(|c| name.contains(**c)).count();
    let mut score = present as f64 / name_len.max(query_len) as f64;
    if name.contains(query.text.as_str()) {
        score += query_len as f64 / name_len as f64;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{Item, Range};

    fn item(name: &str, start: u32, end: u32) -> Item {
        Item::new(name, Range::new(start, end))
    }

    fn names<'a>(matches: &[SearchMatch<'a>]) -> Vec<&'a str> {
        matches.iter().map(|m| m.node.raw_name.as_str()).collect()
    }

    #[test]
    fn hex_offset_hits_only_containing_node() {
        let tree = TreeNode::build(&[item("alpha", 0, 5), item("beta", 5, 20)]);
        let matches = search(&tree, "0x10");
        assert_eq!(names(&matches), vec!["beta"]);
        assert!(matches[0].score >= 0.5);
    }

    #[test]
    fn offset_without_prefix_prefers_tighter_range() {
        let tree = TreeNode::build(&[
            item("section", 0, 400_000),
            item("entry", 16, 32),
        ]);
        let matches = search(&tree, "1f");
        assert_eq!(names(&matches), vec!["entry", "section"]);
        assert!(matches[1].score >= 0.5);
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn offset_floor_applies_to_huge_ranges() {
        let tree = TreeNode::build(&[item("blob", 0, 3_000_000)]);
        let matches = search(&tree, "0x10");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.5);
    }

    #[test]
    fn exact_name_outranks_partial_overlap() {
        let tree = TreeNode::build(&[
            item("main_window", 0, 10),
            item("main", 10, 20),
            item("mango", 20, 30),
        ]);
        let matches = search(&tree, "main");
        assert_eq!(names(&matches), vec!["main", "main_window", "mango"]);
        assert_eq!(matches[0].score, 1.0);
        // 4/11 overlap plus 4/11 for containing "main".
        assert!((matches[1].score - 8.0 / 11.0).abs() < 1e-9);
        assert!((matches[2].score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn containment_boost_is_capped() {
        let tree = TreeNode::build(&[item("mainloop", 0, 10)]);
        let matches = search(&tree, "main");
        assert_eq!(matches[0].score, 1.0);
    }

    #[test]
    fn display_name_counts_and_case_is_ignored() {
        let mut renamed = item("func 3", 0, 10);
        renamed.display_name = "$Render".into();
        let tree = TreeNode::build(&[renamed]);
        let matches = search(&tree, "render");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score > 0.8);
    }

    #[test]
    fn carries_ancestor_display_names_without_root() {
        let mut func = item("func 0", 12, 20);
        func.display_name = "$start".into();
        let tree = TreeNode::build(&[
            item("module", 0, 20),
            item("funcs", 10, 20),
            func,
        ]);
        let matches = search(&tree, "$start");
        assert_eq!(matches[0].node.display_name, "$start");
        assert_eq!(matches[0].ancestor_names, vec!["module", "funcs"]);
    }

    #[test]
    fn ties_keep_discovery_order_and_cap_drops_tail() {
        let items: Vec<Item> = (0..5).map(|i| item("node", i * 10, i * 10 + 10)).collect();
        let tree = TreeNode::build(&items);
        let options = SearchOptions {
            max_results: 3,
            ..SearchOptions::default()
        };
        let matches = search_with(&tree, "node", &options);
        let indices: Vec<usize> = matches.iter().filter_map(|m| m.node.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn empty_query_and_root_never_match() {
        let tree = TreeNode::build(&[item("alpha", 0, 5)]);
        assert!(search(&tree, "").is_empty());
        assert!(search(&tree, "   ").is_empty());
        assert!(search(&TreeNode::build(&[]), "0").is_empty());
    }

    #[test]
    fn weak_overlap_is_below_threshold() {
        let tree = TreeNode::build(&[item("globals", 0, 10)]);
        assert!(search(&tree, "xyz").is_empty());
    }
}
