//! In-memory [`Document`]: a tree of elements with fixed-height rows.
//!
//! Each element lays out as one row of `row_height` followed by its
//! children, so geometry is predictable: a container's scroll height is the
//! sum of its children's heights and every scrolling container shares the
//! same viewport height. Top-level containers are fixed; fragments can only
//! be placed inside them.

use std::collections::{BTreeSet, HashMap};

use super::{Document, Position};
use crate::config::Layout;
use crate::error::DomError;

/// One element and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: String,
    html: String,
    /// What the user typed into the element's editable region. Rendered
    /// markup lives in `html`; new markup starts with an empty region.
    editable: String,
    classes: BTreeSet<String>,
    children: Vec<Node>,
}

impl Node {
    fn new(id: &str, html: &str) -> Self {
        Self {
            id: id.to_owned(),
            html: html.to_owned(),
            editable: String::new(),
            classes: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    fn height(&self, row: f64) -> f64 {
        row + self.children.iter().map(|c| c.height(row)).sum::<f64>()
    }

    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    roots: Vec<Node>,
    scroll: HashMap<String, f64>,
    focused: Option<String>,
    viewport_height: f64,
    row_height: f64,
}

impl MemoryDocument {
    /// An empty document with no containers.
    pub fn new(viewport_height: f64, row_height: f64) -> Self {
        Self {
            roots: Vec::new(),
            scroll: HashMap::new(),
            focused: None,
            viewport_height,
            row_height,
        }
    }

    /// A document with every top-level container named by `layout`. The
    /// dialog and gray screen start hidden.
    pub fn with_layout(layout: &Layout, viewport_height: f64, row_height: f64) -> Self {
        let mut doc = Self::new(viewport_height, row_height);
        for id in layout.root_containers() {
            doc.add_root(id);
        }
        for hidden in [&layout.dialog, &layout.gray_screen] {
            if let Some(node) = doc.find_mut(hidden) {
                node.classes.insert("hide".to_owned());
            }
        }
        doc
    }

    /// Add a top-level container. No-op when it already exists.
    pub fn add_root(&mut self, id: &str) {
        if !self.contains(id) {
            self.roots.push(Node::new(id, ""));
        }
    }

    pub fn inner_html(&self, id: &str) -> Option<&str> {
        self.find(id).map(|n| n.html.as_str())
    }

    pub fn classes(&self, id: &str) -> Vec<String> {
        self.find(id)
            .map(|n| n.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Simulate typing: replace the editable content of `scope`. The
    /// rendered markup and children are untouched.
    pub fn type_into(&mut self, scope: &str, text: &str) -> Result<(), DomError> {
        let node = self
            .find_mut(scope)
            .ok_or_else(|| DomError::NotFound(scope.to_owned()))?;
        node.editable = text.to_owned();
        Ok(())
    }

    /// Every element id below `container`, in document order.
    pub fn ids_in(&self, container: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.find(container) {
            for child in &node.children {
                child.collect_ids(&mut out);
            }
        }
        out
    }

    /// Id of the parent element, `None` for top-level containers.
    pub fn parent_of(&self, id: &str) -> Option<String> {
        let path = self.path_of(id)?;
        if path.len() < 2 {
            return None;
        }
        Some(self.node_at(&path[..path.len() - 1]).id.clone())
    }

    /// Indented text rendering of one container, for terminal display.
    pub fn outline(&self, container: &str) -> String {
        fn walk(node: &Node, depth: usize, out: &mut String) {
            let classes = if node.classes.is_empty() {
                String::new()
            } else {
                let joined: Vec<&str> = node.classes.iter().map(String::as_str).collect();
                format!(" [{}]", joined.join(" "))
            };
            let mut html: String = node.html.chars().take(60).collect();
            if node.html.chars().count() > 60 {
                html.push('…');
            }
            out.push_str(&format!("{}{}{}: {}\n", "  ".repeat(depth), node.id, classes, html));
            for child in &node.children {
                walk(child, depth + 1, out);
            }
        }
        let mut out = String::new();
        if let Some(node) = self.find(container) {
            walk(node, 0, &mut out);
        }
        out
    }

    // -- tree plumbing --

    fn path_of(&self, id: &str) -> Option<Vec<usize>> {
        fn search(nodes: &[Node], id: &str, path: &mut Vec<usize>) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                if node.id == id || search(&node.children, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        search(&self.roots, id, &mut path).then_some(path)
    }

    fn node_at(&self, path: &[usize]) -> &Node {
        let mut node = &self.roots[path[0]];
        for &i in &path[1..] {
            node = &node.children[i];
        }
        node
    }

    fn node_at_mut(&mut self, path: &[usize]) -> &mut Node {
        let mut node = &mut self.roots[path[0]];
        for &i in &path[1..] {
            node = &mut node.children[i];
        }
        node
    }

    fn siblings_mut(&mut self, parent: &[usize]) -> &mut Vec<Node> {
        if parent.is_empty() {
            &mut self.roots
        } else {
            &mut self.node_at_mut(parent).children
        }
    }

    fn find(&self, id: &str) -> Option<&Node> {
        self.path_of(id).map(|p| self.node_at(&p))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Node> {
        let path = self.path_of(id)?;
        Some(self.node_at_mut(&path))
    }

    fn place(&mut self, anchor: &str, position: Position, nodes: Vec<Node>) -> Result<(), DomError> {
        let path = self
            .path_of(anchor)
            .ok_or_else(|| DomError::NotFound(anchor.to_owned()))?;
        let last = path.len() - 1;
        let (parent, index) = match position {
            Position::BeforeBegin | Position::AfterEnd if last == 0 => {
                return Err(DomError::InvalidPlacement(anchor.to_owned()))
            }
            Position::BeforeBegin => (path[..last].to_vec(), path[last]),
            Position::AfterEnd => (path[..last].to_vec(), path[last] + 1),
            Position::AfterBegin => (path.clone(), 0),
            Position::BeforeEnd => {
                let len = self.node_at(&path).children.len();
                (path.clone(), len)
            }
        };
        let siblings = self.siblings_mut(&parent);
        for (offset, node) in nodes.into_iter().enumerate() {
            siblings.insert(index + offset, node);
        }
        Ok(())
    }

    fn clear_stale_focus(&mut self) {
        if let Some(id) = self.focused.clone() {
            if !self.contains(&id) {
                self.focused = None;
            }
        }
    }
}

impl Document for MemoryDocument {
    type Detached = Node;

    fn contains(&self, id: &str) -> bool {
        self.path_of(id).is_some()
    }

    fn insert_html(
        &mut self,
        anchor: &str,
        position: Position,
        id: &str,
        html: &str,
    ) -> Result<(), DomError> {
        if self.contains(id) {
            return Err(DomError::Duplicate(id.to_owned()));
        }
        self.place(anchor, position, vec![Node::new(id, html)])
    }

    fn replace_html(&mut self, id: &str, html: &str) -> Result<(), DomError> {
        let node = self
            .find_mut(id)
            .ok_or_else(|| DomError::NotFound(id.to_owned()))?;
        *node = Node::new(id, html);
        self.clear_stale_focus();
        Ok(())
    }

    fn set_inner_html(&mut self, id: &str, html: &str) -> Result<(), DomError> {
        let node = self
            .find_mut(id)
            .ok_or_else(|| DomError::NotFound(id.to_owned()))?;
        node.html = html.to_owned();
        node.editable.clear();
        node.children.clear();
        self.clear_stale_focus();
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(path) = self.path_of(id) else {
            return false;
        };
        let last = path.len() - 1;
        self.siblings_mut(&path[..last]).remove(path[last]);
        self.scroll.remove(id);
        self.clear_stale_focus();
        true
    }

    fn child_ids(&self, id: &str) -> Vec<String> {
        self.find(id)
            .map(|n| n.children.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }

    fn detach(&mut self, parent: &str, children: &[String]) -> Result<Vec<Node>, DomError> {
        let node = self
            .find_mut(parent)
            .ok_or_else(|| DomError::NotFound(parent.to_owned()))?;
        let (taken, kept): (Vec<Node>, Vec<Node>) = std::mem::take(&mut node.children)
            .into_iter()
            .partition(|c| children.contains(&c.id));
        node.children = kept;
        Ok(taken)
    }

    fn attach(&mut self, anchor: &str, position: Position, nodes: Vec<Node>) -> Result<(), DomError> {
        let mut incoming = Vec::new();
        for node in &nodes {
            node.collect_ids(&mut incoming);
        }
        if let Some(dup) = incoming.into_iter().find(|id| self.contains(id)) {
            return Err(DomError::Duplicate(dup));
        }
        self.place(anchor, position, nodes)
    }

    fn add_class(&mut self, id: &str, class: &str) -> Result<(), DomError> {
        let node = self
            .find_mut(id)
            .ok_or_else(|| DomError::NotFound(id.to_owned()))?;
        node.classes.insert(class.to_owned());
        Ok(())
    }

    fn remove_class(&mut self, id: &str, class: &str) -> Result<(), DomError> {
        let node = self
            .find_mut(id)
            .ok_or_else(|| DomError::NotFound(id.to_owned()))?;
        node.classes.remove(class);
        Ok(())
    }

    fn has_class(&self, id: &str, class: &str) -> bool {
        self.find(id).is_some_and(|n| n.classes.contains(class))
    }

    fn focus(&mut self, id: &str) -> Result<(), DomError> {
        if !self.contains(id) {
            return Err(DomError::NotFound(id.to_owned()));
        }
        self.focused = Some(id.to_owned());
        Ok(())
    }

    fn editable_content(&self, scope: &str) -> Option<String> {
        self.find(scope).map(|n| n.editable.clone())
    }

    fn scroll_top(&self, container: &str) -> f64 {
        self.scroll.get(container).copied().unwrap_or(0.0)
    }

    fn set_scroll_top(&mut self, container: &str, top: f64) {
        let max = (self.scroll_height(container) - self.client_height(container)).max(0.0);
        self.scroll.insert(container.to_owned(), top.clamp(0.0, max));
    }

    fn scroll_height(&self, container: &str) -> f64 {
        self.find(container)
            .map(|n| n.children.iter().map(|c| c.height(self.row_height)).sum())
            .unwrap_or(0.0)
    }

    fn client_height(&self, _container: &str) -> f64 {
        self.viewport_height
    }

    fn element_box(&self, container: &str, id: &str) -> Option<(f64, f64)> {
        fn locate(nodes: &[Node], id: &str, mut base: f64, row: f64) -> Option<(f64, f64)> {
            for node in nodes {
                let height = node.height(row);
                if node.id == id {
                    return Some((base, height));
                }
                if let Some(found) = locate(&node.children, id, base + row, row) {
                    return Some(found);
                }
                base += height;
            }
            None
        }
        let root = self.find(container)?;
        locate(&root.children, id, 0.0, self.row_height)
    }
}
