use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use stasis_types::HostId;

use crate::error::{HostError, HostResult};

/// A single node in the host tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNode {
    pub id: HostId,
    pub tag: String,
    pub parent: Option<HostId>,
    pub children: Vec<HostId>,
}

/// Arena of host nodes rooted at a document node.
///
/// Node ids are allocated sequentially and never reused, so an id recorded in
/// a serialized table still names the same node after the tree is cloned or
/// persisted and reloaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTree {
    nodes: BTreeMap<HostId, HostNode>,
    next_id: u32,
}

impl HostTree {
    /// Tag of the document node.
    pub const DOCUMENT_TAG: &'static str = "#document";

    /// Create a tree holding only the document node.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            HostId::DOCUMENT,
            HostNode {
                id: HostId::DOCUMENT,
                tag: Self::DOCUMENT_TAG.to_string(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self { nodes, next_id: 1 }
    }

    pub fn document(&self) -> HostId {
        HostId::DOCUMENT
    }

    /// Number of nodes, including the document node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the document node is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: HostId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: HostId) -> Option<&HostNode> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: HostId) -> Option<HostId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: HostId) -> &[HostId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Create a new, unattached element node.
    pub fn create_element(&mut self, tag: impl Into<String>) -> HostId {
        let id = HostId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            HostNode {
                id,
                tag: tag.into(),
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// `child` must be unattached, and must not be `parent` or one of its
    /// ancestors.
    pub fn append_child(&mut self, parent: HostId, child: HostId) -> HostResult<()> {
        if child == HostId::DOCUMENT {
            return Err(HostError::DocumentNode);
        }
        if !self.contains(parent) {
            return Err(HostError::NodeNotFound(parent));
        }
        let existing_parent = self
            .nodes
            .get(&child)
            .ok_or(HostError::NodeNotFound(child))?
            .parent;
        if let Some(existing) = existing_parent {
            return Err(HostError::AlreadyAttached {
                child,
                parent: existing,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(HostError::CycleDetected { parent, child });
        }

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        Ok(())
    }

    /// Remove `id` and its whole subtree from the tree.
    ///
    /// Returns the removed ids in document order, starting with `id`.
    pub fn remove(&mut self, id: HostId) -> HostResult<Vec<HostId>> {
        if id == HostId::DOCUMENT {
            return Err(HostError::DocumentNode);
        }
        if !self.contains(id) {
            return Err(HostError::NodeNotFound(id));
        }

        let removed = self.descendants(id);
        if let Some(parent) = self.parent(id) {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|c| *c != id);
            }
        }
        for node in &removed {
            self.nodes.remove(node);
        }
        debug!(root = %id, count = removed.len(), "removed host subtree");
        Ok(removed)
    }

    /// Check the invariants the mutation methods maintain.
    ///
    /// A tree built through this API always passes. A tree loaded from
    /// outside may not, and traversal assumes it does: every parent link
    /// must be mirrored by exactly one child entry, ids must be below the
    /// allocation counter, and parent chains must end at a parentless node.
    pub fn validate(&self) -> HostResult<()> {
        let invalid = |node: HostId, reason: String| HostError::InvalidTree { node, reason };

        let document = self
            .nodes
            .get(&HostId::DOCUMENT)
            .ok_or_else(|| invalid(HostId::DOCUMENT, "missing document node".into()))?;
        if document.parent.is_some() {
            return Err(invalid(HostId::DOCUMENT, "document node has a parent".into()));
        }

        let mut listed = HashSet::new();
        for (key, node) in &self.nodes {
            if node.id != *key {
                return Err(invalid(*key, format!("stored under the key of {}", node.id)));
            }
            if key.raw() >= self.next_id {
                return Err(invalid(*key, format!("id is not below next_id {}", self.next_id)));
            }
            for child in &node.children {
                if !listed.insert(*child) {
                    return Err(invalid(*child, "listed as a child more than once".into()));
                }
                let back = self.nodes.get(child).and_then(|c| c.parent);
                if back != Some(*key) {
                    return Err(invalid(*child, format!("listed under {key} but its parent is {back:?}")));
                }
            }
            if let Some(parent) = node.parent {
                let mirrored = self
                    .nodes
                    .get(&parent)
                    .is_some_and(|p| p.children.contains(key));
                if !mirrored {
                    return Err(invalid(*key, format!("parent {parent} does not list it as a child")));
                }
            }
        }

        // Links are now mirrored, so the only possible cycle is a parent
        // chain that loops back on itself.
        let mut rooted: HashSet<HostId> = HashSet::new();
        for start in self.nodes.keys() {
            let mut chain = Vec::new();
            let mut on_chain = HashSet::new();
            let mut current = Some(*start);
            while let Some(id) = current {
                if rooted.contains(&id) {
                    break;
                }
                if !on_chain.insert(id) {
                    return Err(invalid(id, "parent chain forms a cycle".into()));
                }
                chain.push(id);
                current = self.parent(id);
            }
            rooted.extend(chain);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    /// `root` and every node beneath it, in document (pre-)order.
    ///
    /// Returns an empty vec if `root` is not in the tree.
    pub fn descendants(&self, root: HostId) -> Vec<HostId> {
        if !self.contains(root) {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            result.push(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        result
    }

    /// Whether `id` is reachable from the document node.
    pub fn is_connected(&self, id: HostId) -> bool {
        self.is_ancestor_or_self(HostId::DOCUMENT, id)
    }

    fn is_ancestor_or_self(&self, ancestor: HostId, node: HostId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }
}

impl Default for HostTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// document > body > (header, main > (article), footer)
    fn sample() -> (HostTree, [HostId; 5]) {
        let mut tree = HostTree::new();
        let body = tree.create_element("body");
        let header = tree.create_element("header");
        let main = tree.create_element("main");
        let article = tree.create_element("article");
        let footer = tree.create_element("footer");
        tree.append_child(HostId::DOCUMENT, body).unwrap();
        tree.append_child(body, header).unwrap();
        tree.append_child(body, main).unwrap();
        tree.append_child(main, article).unwrap();
        tree.append_child(body, footer).unwrap();
        (tree, [body, header, main, article, footer])
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn new_tree_has_document() {
        let tree = HostTree::new();
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_empty());
        assert_eq!(tree.get(tree.document()).unwrap().tag, "#document");
    }

    #[test]
    fn ids_are_sequential_and_stable() {
        let (tree, [body, header, ..]) = sample();
        assert_eq!(body, HostId::new(1));
        assert_eq!(header, HostId::new(2));
        let cloned = tree.clone();
        assert_eq!(cloned.get(body).unwrap().tag, "body");
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    #[test]
    fn descendants_in_document_order() {
        let (tree, [body, header, main, article, footer]) = sample();
        assert_eq!(
            tree.descendants(HostId::DOCUMENT),
            vec![HostId::DOCUMENT, body, header, main, article, footer]
        );
        assert_eq!(tree.descendants(main), vec![main, article]);
        assert!(tree.descendants(HostId::new(99)).is_empty());
    }

    #[test]
    fn connectivity() {
        let (mut tree, [_, _, _, article, _]) = sample();
        let loose = tree.create_element("span");
        assert!(tree.is_connected(article));
        assert!(!tree.is_connected(loose));
    }

    // -----------------------------------------------------------------------
    // Append validation
    // -----------------------------------------------------------------------

    #[test]
    fn append_rejects_reparenting() {
        let (mut tree, [body, header, main, ..]) = sample();
        assert_eq!(
            tree.append_child(main, header),
            Err(HostError::AlreadyAttached {
                child: header,
                parent: body
            })
        );
    }

    #[test]
    fn append_rejects_cycles() {
        let mut tree = HostTree::new();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        tree.append_child(a, b).unwrap();
        assert_eq!(
            tree.append_child(b, a),
            Err(HostError::CycleDetected { parent: b, child: a })
        );
        assert_eq!(
            tree.append_child(a, a),
            Err(HostError::CycleDetected { parent: a, child: a })
        );
    }

    #[test]
    fn append_rejects_unknown_and_document() {
        let mut tree = HostTree::new();
        let a = tree.create_element("a");
        let ghost = HostId::new(42);
        assert_eq!(tree.append_child(ghost, a), Err(HostError::NodeNotFound(ghost)));
        assert_eq!(tree.append_child(a, ghost), Err(HostError::NodeNotFound(ghost)));
        assert_eq!(
            tree.append_child(a, HostId::DOCUMENT),
            Err(HostError::DocumentNode)
        );
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    #[test]
    fn remove_subtree() {
        let (mut tree, [body, header, main, article, footer]) = sample();
        let removed = tree.remove(main).unwrap();
        assert_eq!(removed, vec![main, article]);
        assert!(!tree.contains(main));
        assert!(!tree.contains(article));
        assert_eq!(tree.children(body), &[header, footer]);
    }

    #[test]
    fn remove_document_is_rejected() {
        let mut tree = HostTree::new();
        assert_eq!(tree.remove(HostId::DOCUMENT), Err(HostError::DocumentNode));
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let (mut tree, [.., footer]) = sample();
        tree.remove(footer).unwrap();
        let next = tree.create_element("aside");
        assert!(next > footer);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize `tree`, let `edit` rewrite the JSON, and load it back.
    fn tampered(tree: &HostTree, edit: impl FnOnce(&mut serde_json::Value)) -> HostTree {
        let mut json = serde_json::to_value(tree).unwrap();
        edit(&mut json);
        serde_json::from_value(json).unwrap()
    }

    fn invalid_node(tree: &HostTree) -> HostId {
        match tree.validate() {
            Err(HostError::InvalidTree { node, .. }) => node,
            other => panic!("expected InvalidTree, got {other:?}"),
        }
    }

    #[test]
    fn built_trees_validate() {
        let (mut tree, [_, _, main, ..]) = sample();
        tree.validate().unwrap();
        tree.create_element("loose");
        tree.remove(main).unwrap();
        tree.validate().unwrap();
        HostTree::new().validate().unwrap();
    }

    #[test]
    fn validate_rejects_self_child() {
        let (tree, [body, ..]) = sample();
        let bad = tampered(&tree, |json| {
            json["nodes"]["1"]["children"] = serde_json::json!([1]);
        });
        assert_eq!(invalid_node(&bad), body);
    }

    #[test]
    fn validate_rejects_mirrored_cycle() {
        let mut tree = HostTree::new();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        let bad = tampered(&tree, |json| {
            json["nodes"]["1"]["parent"] = serde_json::json!(2);
            json["nodes"]["1"]["children"] = serde_json::json!([2]);
            json["nodes"]["2"]["parent"] = serde_json::json!(1);
            json["nodes"]["2"]["children"] = serde_json::json!([1]);
        });
        assert!([a, b].contains(&invalid_node(&bad)));
    }

    #[test]
    fn validate_rejects_broken_links() {
        let (tree, [body, header, ..]) = sample();

        let orphaned = tampered(&tree, |json| {
            json["nodes"]["1"]["children"] = serde_json::json!([]);
        });
        assert_eq!(invalid_node(&orphaned), header);

        let duplicated = tampered(&tree, |json| {
            json["nodes"]["1"]["children"] = serde_json::json!([2, 2, 3, 5]);
        });
        assert_eq!(invalid_node(&duplicated), header);

        let dangling = tampered(&tree, |json| {
            json["nodes"]["1"]["children"] = serde_json::json!([2, 3, 5, 42]);
        });
        assert_eq!(invalid_node(&dangling), HostId::new(42));

        let rooted = tampered(&tree, |json| {
            json["nodes"]["0"]["parent"] = serde_json::json!(1);
        });
        assert_eq!(invalid_node(&rooted), HostId::DOCUMENT);

        let stale = tampered(&tree, |json| {
            json["next_id"] = serde_json::json!(3);
        });
        assert!(matches!(stale.validate(), Err(HostError::InvalidTree { node, .. }) if node.raw() >= 3));

        let misfiled = tampered(&tree, |json| {
            json["nodes"]["1"]["id"] = serde_json::json!(9);
        });
        assert_eq!(invalid_node(&misfiled), body);
    }

    #[test]
    fn serde_preserves_structure() {
        let (tree, [body, ..]) = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let parsed: HostTree = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(parsed.descendants(body), tree.descendants(body));
    }
}
