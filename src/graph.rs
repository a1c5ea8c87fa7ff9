//! Geometric graph substrate shared by the whole pipeline.
//!
//! Nodes and edges live in flat arenas: an insertion-ordered id table, a coordinate
//! vector, and an edge vector, tied together by a compressed-sparse-row adjacency
//! index. The index is rebuilt whenever the graph mutates, which only the enricher
//! and the perturbation utilities do; the pipeline itself treats graphs as frozen.

use crate::*;

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

/// Undirected geometric graph with `(lon, lat)` nodes and typed edge attributes.
#[derive(Clone, Debug, Default)]
pub struct Graph {
	index: IndexMap<NodeId, usize>,
	xy: Vec<(f64, f64)>,
	edges: Vec<(usize, usize)>,
	speed: HashMap<(usize, usize), f64>,
	extras: HashMap<(usize, usize), Vec<u8>>,
	off: Vec<usize>,
	adj: Vec<usize>,
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
	if a <= b { (a, b) } else { (b, a) }
}

impl Graph {
	pub fn new() -> Self {
		Default::default()
	}
	/// Build a graph from node and edge lists in one go.
	///
	/// Duplicate ids, edges referencing unknown nodes, self-loops and duplicate
	/// unordered pairs are all input contract violations and fail the whole call.
	pub fn from_parts(nodes: impl IntoIterator<Item = (NodeId, (f64, f64))>, edges: impl IntoIterator<Item = (NodeId, NodeId)>) -> Result<Self, String> {
		let mut g = Self::new();
		for (id, xy) in nodes {
			if !g.push_node(id, xy) {
				return Err(format!("Duplicate node id {}", id));
			}
		}
		for (p1, p2) in edges {
			g.push_edge(p1, p2)?;
		}
		g.rebuild();
		Ok(g)
	}
	fn push_node(&mut self, id: NodeId, xy: (f64, f64)) -> bool {
		if self.index.contains_key(&id) {
			return false;
		}
		self.index.insert(id, self.xy.len());
		self.xy.push(xy);
		true
	}
	fn push_edge(&mut self, p1: NodeId, p2: NodeId) -> Result<usize, String> {
		let s1 = *self.index.get(&p1).ok_or_else(|| format!("Nodes set missing {}", p1))?;
		let s2 = *self.index.get(&p2).ok_or_else(|| format!("Nodes set missing {}", p2))?;
		if s1 == s2 {
			return Err(format!("Self-loop on {}", p1));
		}
		if self.edges.iter().any(|&e| e == ordered(s1, s2)) {
			return Err(format!("Duplicate edge ({}, {})", p1, p2));
		}
		self.edges.push(ordered(s1, s2));
		Ok(self.edges.len() - 1)
	}
	fn rebuild(&mut self) {
		let n = self.xy.len();
		let mut deg = vec![0usize; n];
		for &(a, b) in &self.edges {
			deg[a] += 1;
			deg[b] += 1;
		}
		let mut off = Vec::with_capacity(n + 1);
		off.push(0);
		for d in &deg {
			off.push(off.last().unwrap() + d);
		}
		let mut adj = vec![0usize; off[n]];
		let mut fill = off.clone();
		for &(a, b) in &self.edges {
			adj[fill[a]] = b;
			fill[a] += 1;
			adj[fill[b]] = a;
			fill[b] += 1;
		}
		self.off = off;
		self.adj = adj;
	}

	fn slot(&self, id: NodeId) -> Option<usize> {
		self.index.get(&id).copied()
	}
	fn id_at(&self, slot: usize) -> NodeId {
		*self.index.get_index(slot).unwrap().0
	}
	fn adjacent(&self, slot: usize) -> &[usize] {
		&self.adj[self.off[slot]..self.off[slot + 1]]
	}

	pub fn node_count(&self) -> usize {
		self.index.len()
	}
	pub fn edge_count(&self) -> usize {
		self.edges.len()
	}
	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}
	pub fn has_node(&self, id: NodeId) -> bool {
		self.index.contains_key(&id)
	}
	/// All node ids, in insertion order.
	pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.index.keys().copied()
	}
	/// All edges as id pairs, in insertion order.
	pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
		self.edges.iter().map(move |&(a, b)| (self.id_at(a), self.id_at(b)))
	}
	pub fn node_xy(&self, id: NodeId) -> Option<(f64, f64)> {
		self.slot(id).map(|s| self.xy[s])
	}
	pub fn has_edge(&self, p1: NodeId, p2: NodeId) -> bool {
		match (self.slot(p1), self.slot(p2)) {
			(Some(s1), Some(s2)) => self.adjacent(s1).contains(&s2),
			_ => false,
		}
	}
	/// Neighbours of a node, in edge insertion order. Empty for unknown ids.
	pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		let range = self.slot(id).map(|s| self.off[s]..self.off[s + 1]).unwrap_or(0..0);
		self.adj[range].iter().map(move |&s| self.id_at(s))
	}

	pub fn speed(&self, p1: NodeId, p2: NodeId) -> Option<f64> {
		let key = ordered(self.slot(p1)?, self.slot(p2)?);
		self.speed.get(&key).copied()
	}
	/// Attach a speed to an edge. `false` if the edge does not exist.
	pub fn set_speed(&mut self, p1: NodeId, p2: NodeId, v: f64) -> bool {
		match (self.slot(p1), self.slot(p2)) {
			(Some(s1), Some(s2)) if self.edges.contains(&ordered(s1, s2)) => {
				self.speed.insert(ordered(s1, s2), v);
				true
			}
			_ => false,
		}
	}
	pub fn extra(&self, p1: NodeId, p2: NodeId) -> Option<&[u8]> {
		let key = ordered(self.slot(p1)?, self.slot(p2)?);
		self.extras.get(&key).map(Vec::as_slice)
	}
	/// Attach opaque bytes to an edge. `false` if the edge does not exist.
	pub fn set_extra(&mut self, p1: NodeId, p2: NodeId, v: Vec<u8>) -> bool {
		match (self.slot(p1), self.slot(p2)) {
			(Some(s1), Some(s2)) if self.edges.contains(&ordered(s1, s2)) => {
				self.extras.insert(ordered(s1, s2), v);
				true
			}
			_ => false,
		}
	}

	/// Adds a node; `false` if the id is already taken.
	pub fn add_node(&mut self, id: NodeId, xy: (f64, f64)) -> bool {
		let added = self.push_node(id, xy);
		if added {
			self.rebuild();
		}
		added
	}
	pub fn add_edge(&mut self, p1: NodeId, p2: NodeId) -> Result<(), String> {
		self.push_edge(p1, p2)?;
		self.rebuild();
		Ok(())
	}
	/// Removes an edge together with its attributes; `false` if absent.
	pub fn remove_edge(&mut self, p1: NodeId, p2: NodeId) -> bool {
		let key = match (self.slot(p1), self.slot(p2)) {
			(Some(s1), Some(s2)) => ordered(s1, s2),
			_ => return false,
		};
		let n = self.edges.len();
		self.edges.retain(|&e| e != key);
		if self.edges.len() == n {
			return false;
		}
		self.speed.remove(&key);
		self.extras.remove(&key);
		self.rebuild();
		true
	}
	/// Smallest id strictly greater than every id in the graph.
	pub fn next_node_id(&self) -> NodeId {
		self.index.keys().max().map_or(0, |m| m + 1)
	}

	/// Shortest path between two nodes with uniform edge weights, as node ids.
	pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
		let s = self.slot(from)?;
		let t = self.slot(to)?;
		if s == t {
			return Some(vec![from]);
		}
		let mut parent = vec![usize::MAX; self.xy.len()];
		parent[s] = s;
		let mut q = VecDeque::new();
		q.push_back(s);
		while let Some(u) = q.pop_front() {
			for &v in self.adjacent(u) {
				if parent[v] == usize::MAX {
					parent[v] = u;
					if v == t {
						let mut path = vec![t];
						let mut c = t;
						while c != s {
							c = parent[c];
							path.push(c);
						}
						path.reverse();
						return Some(path.into_iter().map(|s| self.id_at(s)).collect());
					}
					q.push_back(v);
				}
			}
		}
		None
	}

	/// Connected components as id lists, largest-first discovery order preserved.
	pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
		let n = self.xy.len();
		let mut seen = vec![false; n];
		let mut components = Vec::new();
		for s in 0..n {
			if seen[s] {
				continue;
			}
			let mut comp = Vec::new();
			let mut q = VecDeque::new();
			seen[s] = true;
			q.push_back(s);
			while let Some(u) = q.pop_front() {
				comp.push(self.id_at(u));
				for &v in self.adjacent(u) {
					if !seen[v] {
						seen[v] = true;
						q.push_back(v);
					}
				}
			}
			components.push(comp);
		}
		components
	}

	/// The induced subgraph of the largest connected component.
	pub fn largest_component(&self) -> Graph {
		let comp = self.connected_components().into_iter().max_by_key(Vec::len).unwrap_or_default();
		let keep: HashSet<NodeId> = comp.into_iter().collect();
		let mut g = Self::new();
		for (id, &s) in &self.index {
			if keep.contains(id) {
				g.push_node(*id, self.xy[s]);
			}
		}
		for &(a, b) in &self.edges {
			let (p1, p2) = (self.id_at(a), self.id_at(b));
			if keep.contains(&p1) && keep.contains(&p2) {
				let e = g.push_edge(p1, p2).unwrap();
				if let Some(&v) = self.speed.get(&(a, b)) {
					g.speed.insert(g.edges[e], v);
				}
				if let Some(v) = self.extras.get(&(a, b)) {
					g.extras.insert(g.edges[e], v.clone());
				}
			}
		}
		g.rebuild();
		g
	}

	/// Renames nodes through `mapping` (ids not in the mapping keep their name).
	pub fn relabel_nodes(&self, mapping: &HashMap<NodeId, NodeId>) -> Result<Graph, String> {
		let mut g = Self::new();
		for (id, &s) in &self.index {
			let id = *mapping.get(id).unwrap_or(id);
			if !g.push_node(id, self.xy[s]) {
				return Err(format!("Relabeling collides on {}", id));
			}
		}
		g.edges = self.edges.clone();
		g.speed = self.speed.clone();
		g.extras = self.extras.clone();
		g.rebuild();
		Ok(g)
	}
}

impl std::convert::TryFrom<data::RoadGraph> for Graph {
	type Error = String;
	fn try_from(rg: data::RoadGraph) -> Result<Self, Self::Error> {
		let mut g = Self::from_parts(
			rg.nodes.iter().map(|n| (n.id, (n.x, n.y))),
			rg.edges.iter().map(|e| (e.p1, e.p2)),
		)?;
		for e in &rg.edges {
			if let Some(v) = e.speed {
				g.set_speed(e.p1, e.p2, v);
			}
		}
		Ok(g)
	}
}

impl From<&Graph> for data::RoadGraph {
	fn from(g: &Graph) -> Self {
		Self {
			nodes: g.nodes().map(|id| {
				let (x, y) = g.node_xy(id).unwrap();
				data::GraphNode { id, x, y }
			}).collect(),
			edges: g.edges().map(|(p1, p2)| data::GraphEdge { p1, p2, speed: g.speed(p1, p2) }).collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryFrom;

	fn path_graph(n: NodeId) -> Graph {
		Graph::from_parts(
			(0..n).map(|i| (i, (i as f64, 0.0))),
			(0..n - 1).map(|i| (i, i + 1)),
		).unwrap()
	}

	#[test]
	fn construction_and_lookups() {
		let g = path_graph(4);
		assert_eq!(g.node_count(), 4);
		assert_eq!(g.edge_count(), 3);
		assert!(g.has_edge(1, 2) && g.has_edge(2, 1));
		assert!(!g.has_edge(0, 2));
		assert_eq!(g.node_xy(2), Some((2.0, 0.0)));
		assert_eq!(g.neighbors(1).collect::<Vec<_>>(), vec![0, 2]);
	}

	#[test]
	fn rejects_contract_violations() {
		assert!(Graph::from_parts(vec![(0, (0.0, 0.0)), (0, (1.0, 0.0))], vec![]).is_err());
		assert!(Graph::from_parts(vec![(0, (0.0, 0.0))], vec![(0, 1)]).is_err());
		assert!(Graph::from_parts(vec![(0, (0.0, 0.0))], vec![(0, 0)]).is_err());
		assert!(Graph::from_parts(vec![(0, (0.0, 0.0)), (1, (1.0, 0.0))], vec![(0, 1), (1, 0)]).is_err());
	}

	#[test]
	fn bfs_shortest_path() {
		// a 3x3 grid: ids r*3+c
		let g = Graph::from_parts(
			(0..9).map(|i| (i, ((i % 3) as f64, (i / 3) as f64))),
			(0..9).flat_map(|i| {
				let mut es = vec![];
				if i % 3 < 2 { es.push((i, i + 1)); }
				if i / 3 < 2 { es.push((i, i + 3)); }
				es
			}),
		).unwrap();
		let path = g.shortest_path(0, 8).unwrap();
		assert_eq!(path.len(), 5);
		assert_eq!(path[0], 0);
		assert_eq!(*path.last().unwrap(), 8);
		for w in path.windows(2) {
			assert!(g.has_edge(w[0], w[1]));
		}
		assert_eq!(g.shortest_path(4, 4), Some(vec![4]));
	}

	#[test]
	fn components_and_largest() {
		let g = Graph::from_parts(
			vec![(0, (0.0, 0.0)), (1, (1.0, 0.0)), (2, (2.0, 0.0)), (10, (5.0, 5.0)), (11, (6.0, 5.0))],
			vec![(0, 1), (1, 2), (10, 11)],
		).unwrap();
		assert_eq!(g.connected_components().len(), 2);
		assert!(g.shortest_path(0, 10).is_none());
		let big = g.largest_component();
		assert_eq!(big.node_count(), 3);
		assert!(big.has_edge(1, 2));
		assert!(!big.has_node(10));
	}

	#[test]
	fn relabeling() {
		let g = path_graph(3);
		let mapping = vec![(0, 100), (2, 102)].into_iter().collect();
		let g2 = g.relabel_nodes(&mapping).unwrap();
		assert!(g2.has_edge(100, 1) && g2.has_edge(1, 102));
		assert_eq!(g2.node_xy(102), Some((2.0, 0.0)));
		let clash = vec![(0, 1)].into_iter().collect();
		assert!(g.relabel_nodes(&clash).is_err());
	}

	#[test]
	fn mutation_and_side_tables() {
		let mut g = path_graph(3);
		assert!(g.set_speed(0, 1, 30.0));
		assert_eq!(g.speed(1, 0), Some(30.0));
		assert!(!g.set_speed(0, 2, 30.0));
		assert!(g.set_extra(1, 2, vec![1, 2, 3]));
		assert_eq!(g.extra(2, 1), Some(&[1u8, 2, 3][..]));
		// split edge (1, 2) at a new node
		let id = g.next_node_id();
		assert_eq!(id, 3);
		assert!(g.add_node(id, (1.5, 0.0)));
		assert!(g.remove_edge(1, 2));
		g.add_edge(1, id).unwrap();
		g.add_edge(id, 2).unwrap();
		assert_eq!(g.shortest_path(0, 2).unwrap(), vec![0, 1, 3, 2]);
		assert_eq!(g.extra(1, 2), None);
	}

	#[test]
	fn road_graph_round_trip() {
		let mut g = path_graph(3);
		g.set_speed(1, 2, 50.0);
		let rg = data::RoadGraph::from(&g);
		let g2 = Graph::try_from(rg.clone()).unwrap();
		assert_eq!(data::RoadGraph::from(&g2), rg);
		assert_eq!(g2.speed(1, 2), Some(50.0));
	}
}
