use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::PackageError;
use crate::package::PackageManifest;
use crate::version::VersionBounds;

/// Index of a node in its [`DependencyGraph`].
pub type NodeId = usize;

/// One package's aggregated requirement within a resolution run.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    package_id: String,
    /// Bound each parent imposes on this node.
    parents: BTreeMap<NodeId, VersionBounds>,
    children: BTreeSet<NodeId>,
    /// Restriction the resolver imposed on the node itself.
    additional: VersionBounds,
    actualized: Option<PackageManifest>,
}

impl DependencyNode {
    fn new(package_id: &str) -> Self {
        Self {
            package_id: package_id.to_string(),
            parents: BTreeMap::new(),
            children: BTreeSet::new(),
            additional: VersionBounds::UNBOUNDED,
            actualized: None,
        }
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn parents(&self) -> &BTreeMap<NodeId, VersionBounds> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn additional_bounds(&self) -> &VersionBounds {
        &self.additional
    }

    pub fn actualized(&self) -> Option<&PackageManifest> {
        self.actualized.as_ref()
    }

    pub fn is_actualized(&self) -> bool {
        self.actualized.is_some()
    }

    /// No requester is left.
    pub fn is_floating(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Arena of dependency nodes with edges stored as node indices in both
/// directions. Node 0 is a synthetic root whose children are the packages
/// requested by the caller.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, NodeId>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![DependencyNode::new("")],
            index: HashMap::new(),
        }
    }

    pub fn node(&self, node: NodeId) -> &DependencyNode {
        &self.nodes[node]
    }

    pub fn find(&self, package_id: &str) -> Option<NodeId> {
        self.index.get(package_id).copied()
    }

    /// The node for `package_id`, created unattached on first use.
    pub fn get_or_insert(&mut self, package_id: &str) -> NodeId {
        if let Some(&node) = self.index.get(package_id) {
            return node;
        }
        let node = self.nodes.len();
        self.nodes.push(DependencyNode::new(package_id));
        self.index.insert(package_id.to_string(), node);
        node
    }

    /// The node's effective bound: its own restriction combined with every
    /// parent's bound. Unbounded for a node without parents or restriction.
    pub fn bounds(&self, node: NodeId) -> Result<VersionBounds, PackageError> {
        let n = &self.nodes[node];
        n.parents
            .values()
            .try_fold(n.additional, |acc, bound| acc.combine(bound))
            .map_err(|e| e.for_package(&n.package_id))
    }

    /// Adds the edge `parent -> child`. Re-adding an existing edge
    /// intersects the new bound with the old one.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        bounds: &VersionBounds,
    ) -> Result<(), PackageError> {
        let merged = match self.nodes[child].parents.get(&parent) {
            Some(existing) => existing
                .combine(bounds)
                .map_err(|e| e.for_package(&self.nodes[child].package_id))?,
            None => *bounds,
        };
        self.nodes[child].parents.insert(parent, merged);
        self.nodes[parent].children.insert(child);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.remove(&child);
        self.nodes[child].parents.remove(&parent);
    }

    /// Narrows the node's own restriction. Fails, leaving the node untouched,
    /// when nothing would be left of it or of the bounds its parents impose.
    pub fn restrict(&mut self, node: NodeId, bounds: &VersionBounds) -> Result<(), PackageError> {
        let n = &self.nodes[node];
        let restricted = n
            .additional
            .combine(bounds)
            .map_err(|e| e.for_package(&n.package_id))?;
        n.parents
            .values()
            .try_fold(restricted, |acc, bound| acc.combine(bound))
            .map_err(|e| e.for_package(&n.package_id))?;
        self.nodes[node].additional = restricted;
        Ok(())
    }

    /// Assigns the resolved manifest. The manifest's version must lie inside
    /// the node's current bound.
    pub fn actualize(&mut self, node: NodeId, manifest: PackageManifest) -> Result<(), PackageError> {
        let bounds = self.bounds(node)?;
        if !bounds.contains(&manifest.version) {
            return Err(PackageError::InvalidActualization {
                id: manifest.id,
                version: manifest.version.to_string(),
                bounds: bounds.to_string(),
            });
        }
        self.nodes[node].actualized = Some(manifest);
        Ok(())
    }

    /// Forgets the node's manifest and detaches its children, so the next
    /// visit derives its dependency set again.
    ///
    /// Actualized children left without any parent are retired the same
    /// way, recursively, so no stale requirement survives through them.
    pub fn remove_actualization(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            self.nodes[current].actualized = None;
            let children = std::mem::take(&mut self.nodes[current].children);
            for child in children {
                let c = &mut self.nodes[child];
                c.parents.remove(&current);
                if c.parents.is_empty() && c.actualized.is_some() {
                    pending.push(child);
                }
            }
        }
    }

    /// Actualized nodes reachable from the root through actualized parents.
    pub fn resolved(&self) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.nodes[Self::ROOT].children.iter().copied().collect();
        while let Some(node) = stack.pop() {
            if !self.nodes[node].is_actualized() || !seen.insert(node) {
                continue;
            }
            stack.extend(self.nodes[node].children.iter().copied());
        }
        seen.into_iter().collect()
    }

    /// Transitive requesters of `node` following parent edges, root excluded.
    pub fn ancestors(&self, node: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.nodes[node].parents.keys().copied().collect();
        while let Some(current) = stack.pop() {
            if current == Self::ROOT || !seen.insert(current) {
                continue;
            }
            stack.extend(self.nodes[current].parents.keys().copied());
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionNumber;

    fn v(s: &str) -> VersionNumber {
        VersionNumber::parse(s).unwrap()
    }

    fn b(lower: &str, upper: &str) -> VersionBounds {
        VersionBounds::new(v(lower), v(upper)).unwrap()
    }

    #[test]
    fn test_node_without_parents_is_unbounded() {
        let mut graph = DependencyGraph::new();
        let c = graph.get_or_insert("C");
        assert!(graph.node(c).is_floating());
        assert_eq!(graph.bounds(c).unwrap(), VersionBounds::UNBOUNDED);
    }

    #[test]
    fn test_bounds_combine_all_parents() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let b_node = graph.get_or_insert("B");
        let c = graph.get_or_insert("C");

        graph.add_child(a, c, &b("1.0", "2.0")).unwrap();
        graph.add_child(b_node, c, &b("1.5", "3.0")).unwrap();

        assert_eq!(graph.bounds(c).unwrap(), b("1.5", "2.0"));
        assert_eq!(graph.node(c).parents().len(), 2);
        assert!(graph.node(a).children().contains(&c));
    }

    #[test]
    fn test_add_child_merges_existing_edge() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let c = graph.get_or_insert("C");

        graph.add_child(a, c, &VersionBounds::at_least(v("1.0"))).unwrap();
        graph.add_child(a, c, &VersionBounds::below(v("2.0"))).unwrap();

        assert_eq!(graph.node(c).parents()[&a], b("1.0", "2.0"));
    }

    #[test]
    fn test_add_child_disjoint_edge_names_child() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let c = graph.get_or_insert("C");

        graph.add_child(a, c, &VersionBounds::exact(v("1.0"))).unwrap();
        let err = graph
            .add_child(a, c, &VersionBounds::exact(v("2.0")))
            .unwrap_err();

        assert!(matches!(err, PackageError::UnsatisfiableBounds { ref id, .. } if id == "C"));
    }

    #[test]
    fn test_conflicting_parents_fail_on_bounds() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let b_node = graph.get_or_insert("B");
        let c = graph.get_or_insert("C");

        graph.add_child(a, c, &VersionBounds::exact(v("1.0"))).unwrap();
        graph.add_child(b_node, c, &VersionBounds::exact(v("2.0"))).unwrap();

        assert!(matches!(
            graph.bounds(c),
            Err(PackageError::UnsatisfiableBounds { ref id, .. }) if id == "C"
        ));
    }

    #[test]
    fn test_remove_child_is_bidirectional() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let c = graph.get_or_insert("C");
        graph.add_child(a, c, &VersionBounds::UNBOUNDED).unwrap();

        graph.remove_child(a, c);

        assert!(graph.node(a).children().is_empty());
        assert!(graph.node(c).is_floating());
    }

    #[test]
    fn test_actualize_checks_bounds() {
        let mut graph = DependencyGraph::new();
        let c = graph.get_or_insert("C");
        graph
            .add_child(DependencyGraph::ROOT, c, &b("1.0", "2.0"))
            .unwrap();

        let err = graph
            .actualize(c, PackageManifest::new("C", v("2.0")))
            .unwrap_err();
        assert!(matches!(err, PackageError::InvalidActualization { .. }));
        assert!(!graph.node(c).is_actualized());

        graph.actualize(c, PackageManifest::new("C", v("1.5"))).unwrap();
        assert_eq!(graph.node(c).actualized().unwrap().version, v("1.5"));
    }

    #[test]
    fn test_remove_actualization_detaches_children() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let b_node = graph.get_or_insert("B");
        let c = graph.get_or_insert("C");
        let d = graph.get_or_insert("D");
        graph.add_child(DependencyGraph::ROOT, a, &VersionBounds::UNBOUNDED).unwrap();
        graph.add_child(DependencyGraph::ROOT, b_node, &VersionBounds::UNBOUNDED).unwrap();
        graph.actualize(a, PackageManifest::new("A", v("1.0"))).unwrap();
        graph.actualize(b_node, PackageManifest::new("B", v("1.0"))).unwrap();
        // A -> C (only requester), A -> D and B -> D
        graph.add_child(a, c, &VersionBounds::UNBOUNDED).unwrap();
        graph.add_child(a, d, &VersionBounds::UNBOUNDED).unwrap();
        graph.add_child(b_node, d, &VersionBounds::UNBOUNDED).unwrap();
        graph.actualize(c, PackageManifest::new("C", v("1.0"))).unwrap();
        graph.actualize(d, PackageManifest::new("D", v("1.0"))).unwrap();

        graph.remove_actualization(a);

        assert!(!graph.node(a).is_actualized());
        assert!(graph.node(a).children().is_empty());
        // C lost its only requester and is retired with A
        assert!(graph.node(c).is_floating());
        assert!(!graph.node(c).is_actualized());
        // D is still wanted by B
        assert!(graph.node(d).is_actualized());
        assert_eq!(graph.node(d).parents().keys().copied().collect::<Vec<_>>(), vec![b_node]);
        // A itself keeps its requester
        assert!(!graph.node(a).is_floating());
    }

    #[test]
    fn test_restrict() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        graph.add_child(DependencyGraph::ROOT, a, &b("1.0", "3.0")).unwrap();

        graph.restrict(a, &VersionBounds::below(v("2.0"))).unwrap();
        assert_eq!(graph.bounds(a).unwrap(), b("1.0", "2.0"));
        assert_eq!(*graph.node(a).additional_bounds(), VersionBounds::below(v("2.0")));

        graph.restrict(a, &VersionBounds::at_least(v("1.0"))).unwrap();
        let err = graph.restrict(a, &VersionBounds::below(v("1.0"))).unwrap_err();
        assert!(matches!(err, PackageError::UnsatisfiableBounds { ref id, .. } if id == "A"));
    }

    #[test]
    fn test_restrict_checks_parent_bounds() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        graph
            .add_child(DependencyGraph::ROOT, a, &VersionBounds::exact(v("1.0")))
            .unwrap();

        let err = graph.restrict(a, &VersionBounds::below(v("1.0"))).unwrap_err();

        assert!(matches!(err, PackageError::UnsatisfiableBounds { ref id, .. } if id == "A"));
        assert!(graph.node(a).additional_bounds().is_unbounded());
        assert_eq!(graph.bounds(a).unwrap(), VersionBounds::exact(v("1.0")));
    }

    #[test]
    fn test_adjacent_parent_bounds_fail() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let b_node = graph.get_or_insert("B");
        let c = graph.get_or_insert("C");

        graph.add_child(a, c, &VersionBounds::below(v("1.5"))).unwrap();
        graph.add_child(b_node, c, &VersionBounds::at_least(v("1.5"))).unwrap();

        assert!(matches!(
            graph.bounds(c),
            Err(PackageError::UnsatisfiableBounds { ref id, .. }) if id == "C"
        ));
    }

    #[test]
    fn test_resolved_skips_unreachable_nodes() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let orphan = graph.get_or_insert("X");
        graph.add_child(DependencyGraph::ROOT, a, &VersionBounds::UNBOUNDED).unwrap();
        graph.actualize(a, PackageManifest::new("A", v("1.0"))).unwrap();
        graph.actualize(orphan, PackageManifest::new("X", v("1.0"))).unwrap();

        assert_eq!(graph.resolved(), vec![a]);
    }

    #[test]
    fn test_ancestors() {
        let mut graph = DependencyGraph::new();
        let a = graph.get_or_insert("A");
        let b_node = graph.get_or_insert("B");
        let c = graph.get_or_insert("C");
        graph.add_child(DependencyGraph::ROOT, a, &VersionBounds::UNBOUNDED).unwrap();
        graph.add_child(a, b_node, &VersionBounds::UNBOUNDED).unwrap();
        graph.add_child(b_node, c, &VersionBounds::UNBOUNDED).unwrap();

        assert_eq!(graph.ancestors(c), BTreeSet::from([a, b_node]));
        assert!(graph.ancestors(a).is_empty());
    }
}
