//! AVL tree
//!
//! Height-annotated binary search tree keyed by record key. Nodes are never
//! removed (deletes become tombstones), so only inserts rebalance.

use std::cmp::Ordering;

use crate::record::Record;

type Link = Option<Box<Node>>;

struct Node {
    record: Record,
    /// Height of the subtree rooted here; a leaf has height 1
    height: i32,
    left: Link,
    right: Link,
}

impl Node {
    fn new(record: Record) -> Self {
        Self {
            record,
            height: 1,
            left: None,
            right: None,
        }
    }

    /// left height − right height
    fn balance_factor(&self) -> i32 {
        height(&self.left) - height(&self.right)
    }

    fn update_height(&mut self) {
        self.height = height(&self.left).max(height(&self.right)) + 1;
    }
}

fn height(link: &Link) -> i32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// Sorted, self-balancing tree of records
#[derive(Default)]
pub struct AvlTree {
    root: Link,
    len: usize,
}

impl AvlTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, tombstones included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the root subtree (0 when empty)
    pub fn height(&self) -> i32 {
        height(&self.root)
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(node.record.key.as_str()) {
                Ordering::Equal => return Some(&node.record),
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
            };
        }
        None
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Record> {
        let mut current = self.root.as_deref_mut();
        while let Some(node) = current {
            current = match key.cmp(node.record.key.as_str()) {
                Ordering::Equal => return Some(&mut node.record),
                Ordering::Less => node.left.as_deref_mut(),
                Ordering::Greater => node.right.as_deref_mut(),
            };
        }
        None
    }

    /// Insert a record, replacing any record with the same key
    pub fn insert(&mut self, record: Record) {
        let key = record.key.clone();
        let mut added = false;
        let root = self.root.take();
        self.root = Some(insert_node(root, &key, record, &mut added));
        if added {
            self.len += 1;
        }
    }

    /// Records in ascending key order
    pub fn records(&self) -> Vec<Record> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<&Node> = Vec::new();
        let mut current = self.root.as_deref();
        loop {
            while let Some(node) = current {
                stack.push(node);
                current = node.left.as_deref();
            }
            match stack.pop() {
                Some(node) => {
                    out.push(node.record.clone());
                    current = node.right.as_deref();
                }
                None => break,
            }
        }
        out
    }

    /// Consume the tree, yielding records in ascending key order
    pub fn into_records(self) -> Vec<Record> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<Box<Node>> = Vec::new();
        let mut current = self.root;
        loop {
            while let Some(mut node) = current {
                current = node.left.take();
                stack.push(node);
            }
            match stack.pop() {
                Some(node) => {
                    let node = *node;
                    current = node.right;
                    out.push(node.record);
                }
                None => break,
            }
        }
        out
    }

    /// Every balance factor is in {-1, 0, 1}, every stored height is exact
    /// and keys are strictly ascending in order
    pub fn is_balanced(&self) -> bool {
        check_subtree(&self.root, None, None).is_some()
    }
}

fn insert_node(link: Link, key: &str, record: Record, added: &mut bool) -> Box<Node> {
    let mut node = match link {
        Some(node) => node,
        None => {
            *added = true;
            return Box::new(Node::new(record));
        }
    };

    match key.cmp(node.record.key.as_str()) {
        Ordering::Equal => {
            node.record = record;
            return node;
        }
        Ordering::Less => {
            node.left = Some(insert_node(node.left.take(), key, record, added));
            if node.balance_factor() == 2 {
                let left_heavy_outside = node
                    .left
                    .as_ref()
                    .map_or(true, |left| key < left.record.key.as_str());
                return if left_heavy_outside {
                    rotate_right(node)
                } else {
                    rotate_left_right(node)
                };
            }
        }
        Ordering::Greater => {
            node.right = Some(insert_node(node.right.take(), key, record, added));
            if node.balance_factor() == -2 {
                let right_heavy_outside = node
                    .right
                    .as_ref()
                    .map_or(true, |right| key > right.record.key.as_str());
                return if right_heavy_outside {
                    rotate_left(node)
                } else {
                    rotate_right_left(node)
                };
            }
        }
    }

    node.update_height();
    node
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = match node.right.take() {
        Some(pivot) => pivot,
        None => return node,
    };
    node.right = pivot.left.take();
    node.update_height();
    pivot.left = Some(node);
    pivot.update_height();
    pivot
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = match node.left.take() {
        Some(pivot) => pivot,
        None => return node,
    };
    node.left = pivot.right.take();
    node.update_height();
    pivot.right = Some(node);
    pivot.update_height();
    pivot
}

fn rotate_left_right(mut node: Box<Node>) -> Box<Node> {
    node.left = node.left.take().map(rotate_left);
    rotate_right(node)
}

fn rotate_right_left(mut node: Box<Node>) -> Box<Node> {
    node.right = node.right.take().map(rotate_right);
    rotate_left(node)
}

/// Returns the subtree height when the subtree is a valid AVL tree
fn check_subtree(link: &Link, lower: Option<&str>, upper: Option<&str>) -> Option<i32> {
    let node = match link {
        Some(node) => node,
        None => return Some(0),
    };
    let key = node.record.key.as_str();
    if lower.is_some_and(|low| key <= low) || upper.is_some_and(|high| key >= high) {
        return None;
    }

    let left = check_subtree(&node.left, lower, Some(key))?;
    let right = check_subtree(&node.right, Some(key), upper)?;
    if (left - right).abs() > 1 || node.height != left.max(right) + 1 {
        return None;
    }
    Some(node.height)
}
