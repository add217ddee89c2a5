//! Containment tree over an artifact's flat item list.
//!
//! Items arrive ordered so that an item never precedes an item containing
//! it. A single stack pass then rebuilds the nesting: pop open ancestors
//! until one contains the item, attach it there, and open it as an ancestor
//! if it is non-empty.
//!
//! Input that breaks the ordering rule is not rejected; it produces a tree
//! that may attach items too high (at worst under the root). Callers that
//! need to reject such input can run [`check_order`] first.

use crate::analysis::types::{Item, Range};
use serde::Serialize;

/// One node of the containment tree. `index` is the item's position in the
/// input, or `None` for the synthetic root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub raw_name: String,
    pub display_name: String,
    pub range: Range,
    pub index: Option<usize>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn root(range: Range) -> Self {
        Self {
            raw_name: String::new(),
            display_name: String::new(),
            range,
            index: None,
            children: Vec::new(),
        }
    }

    fn leaf(index: usize, item: &Item) -> Self {
        Self {
            raw_name: item.raw_name.clone(),
            display_name: item.display_name.clone(),
            range: item.range,
            index: Some(index),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.index.is_none()
    }

    /// Build the tree for `items`. The root spans `[0, max item end]`, so it
    /// contains every item even when the last one ends early; `[0, 0]` when
    /// there are no items.
    pub fn build(items: &[Item]) -> TreeNode {
        let end = items.iter().map(|item| item.range.end).max().unwrap_or(0);
        let root = TreeNode::root(Range::new(0, end));

        // Open ancestors, root first. Nodes are attached to their parent when
        // they are popped, which keeps siblings in input order.
        let mut stack: Vec<TreeNode> = vec![root];
        for (index, item) in items.iter().enumerate() {
            while stack.len() > 1 && !stack[stack.len() - 1].range.contains_range(&item.range) {
                close_top(&mut stack);
            }
            let node = TreeNode::leaf(index, item);
            if item.range.is_empty() {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            } else {
                stack.push(node);
            }
        }
        while stack.len() > 1 {
            close_top(&mut stack);
        }
        stack.pop().unwrap_or_else(|| TreeNode::root(Range::new(0, end)))
    }

    /// Pre-order traversal, root included.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    /// Number of nodes below the root.
    pub fn descendant_count(&self) -> usize {
        self.iter().count() - 1
    }

    /// Deepest node whose range contains `offset`.
    pub fn node_at_offset(&self, offset: u64) -> Option<&TreeNode> {
        if !self.range.contains_offset(offset) {
            return None;
        }
        let mut node = self;
        while let Some(child) = node
            .children
            .iter()
            .find(|child| child.range.contains_offset(offset))
        {
            node = child;
        }
        Some(node)
    }

    /// Nodes from the root down to the node for item `index`, inclusive.
    pub fn path_to(&self, index: usize) -> Option<Vec<&TreeNode>> {
        if self.index == Some(index) {
            return Some(vec![self]);
        }
        for child in &self.children {
            if let Some(mut path) = child.path_to(index) {
                path.insert(0, self);
                return Some(path);
            }
        }
        None
    }
}

fn close_top(stack: &mut Vec<TreeNode>) {
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}

/// Pre-order iterator over a tree.
pub struct PreOrder<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Index of the first item that strictly contains an earlier non-empty item,
/// which breaks the ancestor-before-descendant rule.
pub fn check_order(items: &[Item]) -> Result<(), usize> {
    for (index, item) in items.iter().enumerate() {
        let violates = items[..index].iter().any(|prev| {
            !prev.range.is_empty()
                && prev.range != item.range
                && item.range.contains_range(&prev.range)
        });
        if violates {
            return Err(index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, start: u32, end: u32) -> Item {
        Item::new(name, Range::new(start, end))
    }

    fn pre_order_indices(tree: &TreeNode) -> Vec<usize> {
        tree.iter().filter_map(|n| n.index).collect()
    }

    fn assert_contained(node: &TreeNode) {
        for child in &node.children {
            assert!(
                node.range.contains_range(&child.range),
                "{:?} not inside {:?}",
                child.range,
                node.range
            );
            assert_contained(child);
        }
    }

    #[test]
    fn empty_items_give_bare_root() {
        let tree = TreeNode::build(&[]);
        assert!(tree.is_root());
        assert!(tree.children.is_empty());
        assert_eq!(tree.range, Range::new(0, 0));
    }

    #[test]
    fn nests_sections_and_entries() {
        let items = vec![
            item("module", 0, 100),
            item("types", 8, 30),
            item("type 0", 10, 20),
            item("type 1", 20, 30),
            item("funcs", 40, 100),
            item("func 0", 42, 70),
            item("func 1", 70, 100),
        ];
        let tree = TreeNode::build(&items);

        assert_eq!(tree.range, Range::new(0, 100));
        assert_eq!(tree.children.len(), 1);
        let module = &tree.children[0];
        let names: Vec<&str> = module.children.iter().map(|n| n.raw_name.as_str()).collect();
        assert_eq!(names, vec!["types", "funcs"]);
        assert_eq!(module.children[0].children.len(), 2);
        assert_eq!(module.children[1].children.len(), 2);

        assert_contained(&tree);
        assert_eq!(pre_order_indices(&tree), (0..items.len()).collect::<Vec<_>>());
        assert_eq!(tree.descendant_count(), items.len());
    }

    #[test]
    fn root_covers_module_wider_than_last_item() {
        // A trailing custom section widens the module past its last entry.
        let items = vec![
            item("module", 0, 50),
            item("funcs", 10, 20),
            item("func 0", 12, 20),
        ];
        let tree = TreeNode::build(&items);

        assert_eq!(tree.range, Range::new(0, 50));
        assert_contained(&tree);
        assert_eq!(tree.node_at_offset(40).map(|n| n.raw_name.as_str()), Some("module"));
        assert_eq!(pre_order_indices(&tree), vec![0, 1, 2]);
    }

    #[test]
    fn empty_ranges_are_leaves() {
        let items = vec![
            item("module", 0, 10),
            item("start", 4, 4),
            item("func 0", 4, 8),
        ];
        let tree = TreeNode::build(&items);
        let module = &tree.children[0];
        assert_eq!(module.children.len(), 2);
        assert!(module.children[0].children.is_empty());
        assert_eq!(pre_order_indices(&tree), vec![0, 1, 2]);
    }

    #[test]
    fn identical_ranges_nest_in_input_order() {
        let items = vec![item("funcs", 0, 10), item("func 0", 0, 10)];
        let tree = TreeNode::build(&items);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children[0].raw_name, "func 0");
    }

    #[test]
    fn disjoint_items_are_siblings() {
        let items = vec![item("a", 0, 5), item("b", 5, 20)];
        let tree = TreeNode::build(&items);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.range, Range::new(0, 20));
    }

    #[test]
    fn misordered_input_does_not_panic() {
        let items = vec![item("child", 2, 4), item("parent", 0, 10), item("x", 12, 14)];
        let tree = TreeNode::build(&items);
        assert_eq!(tree.descendant_count(), 3);
        assert_eq!(check_order(&items), Err(1));
    }

    #[test]
    fn check_order_accepts_well_ordered_input() {
        let items = vec![
            item("module", 0, 100),
            item("types", 8, 30),
            item("type 0", 10, 20),
            item("funcs", 40, 100),
        ];
        assert_eq!(check_order(&items), Ok(()));
    }

    #[test]
    fn node_at_offset_finds_deepest() {
        let items = vec![
            item("module", 0, 100),
            item("funcs", 40, 100),
            item("func 0", 42, 70),
        ];
        let tree = TreeNode::build(&items);
        assert_eq!(tree.node_at_offset(50).unwrap().raw_name, "func 0");
        assert_eq!(tree.node_at_offset(41).unwrap().raw_name, "funcs");
        assert_eq!(tree.node_at_offset(5).unwrap().raw_name, "module");
        assert!(tree.node_at_offset(100).is_none());

        let path: Vec<&str> = tree
            .path_to(2)
            .unwrap()
            .iter()
            .map(|n| n.raw_name.as_str())
            .collect();
        assert_eq!(path, vec!["", "module", "funcs", "func 0"]);
    }
}
