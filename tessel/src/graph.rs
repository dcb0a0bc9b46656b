//! Program graph, nodes in an arena referenced by [`NodeId`].
//!
//! Nodes are never physically removed, passes mark them as removed,
//! so ids stay stable for the whole compilation.

use crate::{
    ActivationFunc, DebugMask, Layout, Padding, Primitive, PrimitiveId, PrimitiveKind,
    TesselError, Topology,
};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Index of node in program arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

/// Node of program graph, primitive descriptor plus graph state
#[derive(Debug, Clone)]
pub struct Node {
    desc: Primitive,
    deps: Vec<NodeId>,
    users: Vec<NodeId>,
    output_layout: Option<Layout>,
    pub(crate) output_padding: Padding,
    pub(crate) fused_activation: Option<ActivationFunc>,
    pub(crate) can_be_optimized: bool,
    pub(crate) is_output: bool,
    pub(crate) reused_in_place: bool,
    pub(crate) removed: bool,
}

impl Node {
    fn new(desc: Primitive) -> Node {
        Node {
            output_padding: desc.output_padding,
            desc,
            deps: Vec::new(),
            users: Vec::new(),
            output_layout: None,
            fused_activation: None,
            can_be_optimized: false,
            is_output: false,
            reused_in_place: false,
            removed: false,
        }
    }

    /// Primitive id
    #[must_use]
    pub fn id(&self) -> &PrimitiveId {
        &self.desc.id
    }

    /// Primitive descriptor
    #[must_use]
    pub fn desc(&self) -> &Primitive {
        &self.desc
    }

    /// Kind of primitive
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        self.desc.kind()
    }

    /// Dependencies, primary inputs first, then weights and biases
    #[must_use]
    pub fn deps(&self) -> &[NodeId] {
        &self.deps
    }

    /// Distinct users
    #[must_use]
    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    /// Number of primary inputs
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.desc.inputs.len()
    }

    /// Padding of the output buffer
    #[must_use]
    pub fn output_padding(&self) -> Padding {
        self.output_padding
    }

    /// Activation fused into this node
    #[must_use]
    pub fn fused_activation(&self) -> Option<ActivationFunc> {
        self.fused_activation
    }

    /// Node runs no kernel, its output aliases another buffer
    #[must_use]
    pub fn can_be_optimized(&self) -> bool {
        self.can_be_optimized
    }

    /// Output of the program
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Output is written directly into the buffer of its user
    #[must_use]
    pub fn reused_in_place(&self) -> bool {
        self.reused_in_place
    }

    /// Removed by some pass
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Memoized output layout, if already computed
    #[must_use]
    pub fn cached_layout(&self) -> Option<Layout> {
        self.output_layout
    }
}

/// Graph of nodes built from topology, rewritten by passes
#[derive(Debug, Clone)]
pub struct Program {
    nodes: Vec<Node>,
    ids: BTreeMap<PrimitiveId, NodeId>,
    order: Vec<NodeId>,
    order_dirty: bool,
    debug: DebugMask,
}

impl Program {
    /// Build program graph from topology.
    /// Fails on duplicate ids, dangling dependencies and cycles.
    pub fn build(topology: &Topology, debug: DebugMask) -> Result<Program, TesselError> {
        let mut program = Program {
            nodes: Vec::with_capacity(topology.len()),
            ids: BTreeMap::new(),
            order: Vec::new(),
            order_dirty: true,
            debug,
        };
        for desc in topology.primitives() {
            if program.ids.contains_key(&desc.id) {
                return Err(TesselError::DuplicatePrimitive(desc.id.clone()));
            }
            program.push(desc.clone());
        }
        // Resolve all ids first, so construction order does not matter
        let mut edges = Vec::new();
        for (i, node) in program.nodes.iter().enumerate() {
            let mut deps = Vec::new();
            for dep in node.desc.dependencies() {
                let Some(&dep) = program.ids.get(&dep) else {
                    return Err(TesselError::DanglingDependency(dep));
                };
                deps.push(dep);
            }
            edges.push((NodeId(i as u32), deps));
        }
        for (user, deps) in edges {
            for dep in deps {
                program.link(user, dep);
            }
        }
        program.check_acyclic()?;
        if topology.outputs().is_empty() {
            for node in &mut program.nodes {
                node.is_output = node.users.is_empty();
            }
        } else {
            for output in topology.outputs() {
                let Some(&id) = program.ids.get(output) else {
                    return Err(TesselError::DanglingDependency(output.clone()));
                };
                program.nodes[id.index()].is_output = true;
            }
        }
        if program.debug.passes() {
            println!("Built program with {} nodes", program.nodes.len());
        }
        Ok(program)
    }

    /// Debug mask of this program
    #[must_use]
    pub const fn debug(&self) -> DebugMask {
        self.debug
    }

    fn push(&mut self, desc: Primitive) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.ids.insert(desc.id.clone(), id);
        self.nodes.push(Node::new(desc));
        self.order_dirty = true;
        id
    }

    /// Edge without cycle check
    fn link(&mut self, user: NodeId, dep: NodeId) {
        self.nodes[user.index()].deps.push(dep);
        let users = &mut self.nodes[dep.index()].users;
        if !users.contains(&user) {
            users.push(user);
        }
        self.order_dirty = true;
    }

    fn unlink_user(&mut self, user: NodeId, dep: NodeId) {
        if !self.nodes[user.index()].deps.contains(&dep) {
            self.nodes[dep.index()].users.retain(|&u| u != user);
        }
    }

    /// Color marking depth first search over dependencies
    fn check_acyclic(&self) -> Result<(), TesselError> {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if color[start] != WHITE {
                continue;
            }
            // (node, index of next dependency to visit)
            let mut stack = vec![(start, 0usize)];
            color[start] = GREY;
            while let Some((n, i)) = stack.last_mut() {
                let n = *n;
                if let Some(&dep) = self.nodes[n].deps.get(*i) {
                    *i += 1;
                    match color[dep.index()] {
                        WHITE => {
                            color[dep.index()] = GREY;
                            stack.push((dep.index(), 0));
                        }
                        GREY => return Err(TesselError::GraphCycle(self.nodes[n].desc.id.clone())),
                        _ => {}
                    }
                } else {
                    color[n] = BLACK;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Does from depend, directly or transitively, on to?
    fn depends_on(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut params = vec![from];
        while let Some(n) = params.pop() {
            if n == to {
                return true;
            }
            if !visited[n.index()] {
                visited[n.index()] = true;
                params.extend(self.nodes[n.index()].deps.iter().copied());
            }
        }
        false
    }

    /// Adds dependency to node, fails if it would close a cycle
    pub fn add_dependency(&mut self, node: NodeId, dep: NodeId) -> Result<(), TesselError> {
        if self.depends_on(dep, node) {
            return Err(TesselError::GraphCycle(self[node].desc.id.clone()));
        }
        self.link(node, dep);
        self.invalidate(node);
        Ok(())
    }

    /// Node with the same descriptor, or a new unconnected node.
    /// If the id is taken by a different primitive, the new node gets
    /// the first free id with a numeric suffix. Returns whether the node was created.
    pub fn get_or_create(&mut self, mut desc: Primitive) -> (NodeId, bool) {
        let base = desc.id.clone();
        let mut suffix = 0;
        while let Some(&id) = self.ids.get(&desc.id) {
            let node = &mut self.nodes[id.index()];
            if node.removed {
                *node = Node::new(desc);
                self.order_dirty = true;
                return (id, true);
            }
            if node.desc == desc {
                return (id, false);
            }
            suffix += 1;
            desc.id = PrimitiveId::from(format!("{base}_{suffix}"));
        }
        if suffix > 0 && self.debug.passes() {
            println!("Id {base} is taken, created {} instead", desc.id);
        }
        (self.push(desc), true)
    }

    /// Puts new node between consumer and its input at input_index.
    /// New node is connected to the old input only when it has no dependencies yet,
    /// so shared nodes are just pointed to by another consumer.
    pub fn add_intermediate(
        &mut self,
        new: NodeId,
        consumer: NodeId,
        input_index: usize,
    ) -> Result<(), TesselError> {
        let Some(&old) = self[consumer].deps.get(input_index) else {
            return Err(TesselError::shape_error(
                self[consumer].id(),
                format!("no dependency at index {input_index}"),
            ));
        };
        if self[new].deps.is_empty() {
            self.add_dependency(new, old)?;
        }
        self.replace_dependency(consumer, input_index, new)
    }

    /// Replaces dependency of node at given index
    pub fn replace_dependency(
        &mut self,
        node: NodeId,
        index: usize,
        new_dep: NodeId,
    ) -> Result<(), TesselError> {
        if self.depends_on(new_dep, node) {
            return Err(TesselError::GraphCycle(self[node].desc.id.clone()));
        }
        let Some(&old) = self[node].deps.get(index) else {
            return Err(TesselError::shape_error(self[node].id(), format!("no dependency at index {index}")));
        };
        self.nodes[node.index()].deps[index] = new_dep;
        self.unlink_user(node, old);
        let users = &mut self.nodes[new_dep.index()].users;
        if !users.contains(&node) {
            users.push(node);
        }
        self.order_dirty = true;
        self.invalidate(node);
        Ok(())
    }

    /// Removes node from the graph, its users read its first dependency instead
    pub fn bypass(&mut self, node: NodeId) -> Result<(), TesselError> {
        let Some(&input) = self[node].deps.first() else {
            return Err(TesselError::shape_error(self[node].id(), "node without input can not be bypassed"));
        };
        let users = self[node].users.clone();
        for user in users {
            for i in 0..self.nodes[user.index()].deps.len() {
                if self.nodes[user.index()].deps[i] == node {
                    self.replace_dependency(user, i, input)?;
                }
            }
        }
        if self[node].is_output {
            self.nodes[input.index()].is_output = true;
        }
        self.remove(node);
        Ok(())
    }

    /// Marks node removed and disconnects it from its dependencies
    pub fn remove(&mut self, node: NodeId) {
        let deps = std::mem::take(&mut self.nodes[node.index()].deps);
        for dep in deps {
            self.nodes[dep.index()].users.retain(|&u| u != node);
        }
        let n = &mut self.nodes[node.index()];
        n.users.clear();
        n.removed = true;
        n.is_output = false;
        n.output_layout = None;
        self.order_dirty = true;
    }

    /// Node with given primitive id
    #[must_use]
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.ids.get(&PrimitiveId::from(id)).copied().filter(|&n| !self[n].removed)
    }

    /// Node with given primitive id, fails on unknown ids
    pub fn get(&self, id: &str) -> Result<NodeId, TesselError> {
        self.find(id).ok_or_else(|| TesselError::DanglingDependency(id.into()))
    }

    /// Live nodes, in arena order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.removed)
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Number of live nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Is there no live node?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Output nodes
    #[must_use]
    pub fn outputs(&self) -> Vec<NodeId> {
        self.nodes().filter(|(_, n)| n.is_output).map(|(id, _)| id).collect()
    }

    /// Topological order, dependencies before users, removed nodes excluded.
    /// Recomputed only after the graph changed.
    pub fn processing_order(&mut self) -> Vec<NodeId> {
        if self.order_dirty {
            let mut visited = vec![false; self.nodes.len()];
            let mut order = Vec::with_capacity(self.nodes.len());
            for start in 0..self.nodes.len() {
                if visited[start] || self.nodes[start].removed {
                    continue;
                }
                visited[start] = true;
                let mut stack = vec![(start, 0usize)];
                while let Some((n, i)) = stack.last_mut() {
                    let n = *n;
                    if let Some(&dep) = self.nodes[n].deps.get(*i) {
                        *i += 1;
                        if !visited[dep.index()] {
                            visited[dep.index()] = true;
                            stack.push((dep.index(), 0));
                        }
                    } else {
                        order.push(NodeId(n as u32));
                        stack.pop();
                    }
                }
            }
            self.order = order;
            self.order_dirty = false;
        }
        self.order.clone()
    }

    /// Output layout of node, computed from dependencies and memoized
    pub fn output_layout(&mut self, node: NodeId) -> Result<Layout, TesselError> {
        if let Some(layout) = self[node].output_layout {
            return Ok(layout);
        }
        let mut stack = vec![node];
        while let Some(&n) = stack.last() {
            if self[n].output_layout.is_some() {
                stack.pop();
                continue;
            }
            let pending: Vec<NodeId> =
                self[n].deps.iter().copied().filter(|&d| self[d].output_layout.is_none()).collect();
            if pending.is_empty() {
                let deps: Vec<Layout> = self[n].deps.iter().filter_map(|&d| self[d].output_layout).collect();
                let node = &self.nodes[n.index()];
                let layout = node.desc.calc_output_layout(&deps)?.with_padding(node.output_padding);
                self.nodes[n.index()].output_layout = Some(layout);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        self[node]
            .output_layout
            .ok_or_else(|| TesselError::shape_error(self[node].id(), "output layout not computed"))
    }

    /// Finalized output layout, fails if it was not computed yet
    pub fn layout(&self, node: NodeId) -> Result<Layout, TesselError> {
        self[node]
            .output_layout
            .ok_or_else(|| TesselError::shape_error(self[node].id(), "output layout not computed"))
    }

    /// Layouts of all dependencies of node
    pub fn dependency_layouts(&mut self, node: NodeId) -> Result<Vec<Layout>, TesselError> {
        let deps = self[node].deps.clone();
        deps.into_iter().map(|d| self.output_layout(d)).collect()
    }

    /// Computes output layouts of all live nodes
    pub fn finalize_layouts(&mut self) -> Result<(), TesselError> {
        for node in self.processing_order() {
            self.output_layout(node)?;
        }
        Ok(())
    }

    /// Changes padding of node output
    pub fn set_output_padding(&mut self, node: NodeId, padding: Padding) {
        self.nodes[node.index()].output_padding = padding;
        self.invalidate(node);
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> &mut Node {
        &mut self.nodes[node.index()]
    }

    /// Clears memoized layout of node and of all its transitive users
    fn invalidate(&mut self, node: NodeId) {
        let n = &mut self.nodes[node.index()];
        n.output_layout = None;
        // Users without memo have no memoized users either
        let mut params = n.users.clone();
        while let Some(n) = params.pop() {
            let n = &mut self.nodes[n.index()];
            if n.output_layout.take().is_some() {
                params.extend(n.users.iter().copied());
            }
        }
    }

    /// Plot graph in dot format
    #[must_use]
    pub fn plot_dot_graph(&self) -> String {
        use std::fmt::Write;
        let mut res = String::from("strict digraph {\n  ordering=in\n  rank=source\n  rankdir=LR\n");
        let mut edges = String::new();
        // Writing into string can not fail
        for (id, node) in self.nodes() {
            let fillcolor = if node.is_output { "coral" } else { "aqua" };
            let shape = if node.kind().is_memory() { "box" } else { "oval" };
            let layout = node.output_layout.map_or_else(String::new, |l| l.to_string());
            let _ = writeln!(
                res,
                "  {id}[label=\"{}\\n{}\\n{layout}\", shape={shape}, fillcolor=\"{fillcolor}\", style=filled]",
                node.id(),
                node.kind(),
            );
            for dep in &node.deps {
                let _ = writeln!(edges, "  {dep} -> {id}");
            }
        }
        res.push_str(&edges);
        res.push('}');
        res
    }
}

impl std::ops::Index<NodeId> for Program {
    type Output = Node;
    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index.index()]
    }
}
