//! Graph perturbation utilities.
//!
//! Used to manufacture a degraded copy of a graph — shifted, jittered, simplified,
//! or densified — which is how the pipeline gets exercised when only one source
//! network is at hand. All functions leave their input untouched.

use crate::*;
use crate::graph::Graph;

use rand::prelude::*;

/// Rough degrees per metre, the conversion the original measurements use.
const DEG_PER_M: f64 = 0.0000089;

/// Shift every node by the given metre offsets.
pub fn translate_graph(g: &Graph, meters_x: f64, meters_y: f64) -> Graph {
	let moved: Vec<(NodeId, (f64, f64))> = g.nodes().map(|id| {
		let (x, y) = g.node_xy(id).unwrap();
		(id, (x + meters_x * DEG_PER_M, y + meters_y * DEG_PER_M))
	}).collect();
	rebuild_with_positions(g, &moved)
}

/// Jitter a ratio of the nodes by up to `noise` metres in each axis.
pub fn noise_graph(g: &Graph, noise: f64, noise_ratio: f64, seed: u64) -> Graph {
	let noise = noise * DEG_PER_M;
	let mut rng = StdRng::seed_from_u64(seed);
	let mut ids: Vec<NodeId> = g.nodes().collect();
	ids.shuffle(&mut rng);
	ids.truncate((ids.len() as f64 * noise_ratio) as usize);
	let moved: Vec<(NodeId, (f64, f64))> = ids.into_iter().map(|id| {
		let (x, y) = g.node_xy(id).unwrap();
		(id, (x + rng.gen_range(-noise..=noise), y + rng.gen_range(-noise..=noise)))
	}).collect();
	rebuild_with_positions(g, &moved)
}

fn rebuild_with_positions(g: &Graph, moved: &[(NodeId, (f64, f64))]) -> Graph {
	let overrides: std::collections::HashMap<NodeId, (f64, f64)> = moved.iter().copied().collect();
	let mut out = Graph::from_parts(
		g.nodes().map(|id| (id, overrides.get(&id).copied().unwrap_or_else(|| g.node_xy(id).unwrap()))),
		g.edges(),
	).unwrap();
	for (p1, p2) in g.edges() {
		if let Some(v) = g.speed(p1, p2) {
			out.set_speed(p1, p2, v);
		}
		if let Some(v) = g.extra(p1, p2) {
			out.set_extra(p1, p2, v.to_vec());
		}
	}
	out
}

/// Contract a ratio of the degree-2 nodes, joining their two neighbours directly.
pub fn random_simplify_edges(g: &Graph, simplify_ratio: f64, seed: u64) -> Graph {
	let mut rng = StdRng::seed_from_u64(seed);
	let mut candidates: Vec<NodeId> = g.nodes().filter(|&n| g.neighbors(n).count() == 2).collect();
	candidates.shuffle(&mut rng);
	let count = (g.edge_count() as f64 * simplify_ratio) as usize;
	let mut edges: Vec<(NodeId, NodeId)> = g.edges().collect();
	let mut removed = std::collections::HashSet::new();
	for n in candidates.into_iter().take(count) {
		let nb: Vec<NodeId> = edges.iter()
			.filter_map(|&(a, b)| if a == n { Some(b) } else if b == n { Some(a) } else { None })
			.collect();
		if nb.len() != 2 || nb[0] == nb[1] || edges.iter().any(|&e| e == (nb[0], nb[1]) || e == (nb[1], nb[0])) {
			continue;
		}
		edges.retain(|&(a, b)| a != n && b != n);
		edges.push((nb[0], nb[1]));
		removed.insert(n);
	}
	let mut out = Graph::from_parts(
		g.nodes().filter(|n| !removed.contains(n)).map(|id| (id, g.node_xy(id).unwrap())),
		edges,
	).unwrap();
	for (p1, p2) in out.edges().collect::<Vec<_>>() {
		if let Some(v) = g.speed(p1, p2) {
			out.set_speed(p1, p2, v);
		}
	}
	out
}

/// Split a ratio of the edges at a random interpolation point.
pub fn random_insert_edges(g: &Graph, insert_ratio: f64, seed: u64) -> Graph {
	let mut rng = StdRng::seed_from_u64(seed);
	let mut out = g.clone();
	let mut edges: Vec<(NodeId, NodeId)> = g.edges().collect();
	edges.shuffle(&mut rng);
	let count = (edges.len() as f64 * insert_ratio) as usize;
	for (p1, p2) in edges.into_iter().take(count) {
		let (x1, y1) = out.node_xy(p1).unwrap();
		let (x2, y2) = out.node_xy(p2).unwrap();
		let ratio = rng.gen::<f64>();
		let id = out.next_node_id();
		out.add_node(id, (x1 + ratio * (x2 - x1), y1 + ratio * (y2 - y1)));
		out.remove_edge(p1, p2);
		out.add_edge(p1, id).unwrap();
		out.add_edge(id, p2).unwrap();
	}
	out
}

/// Axis-aligned bounds of the node positions, `(min_x, min_y, max_x, max_y)`.
pub fn bounding_box(g: &Graph) -> Option<(f64, f64, f64, f64)> {
	let mut bb: Option<(f64, f64, f64, f64)> = None;
	for id in g.nodes() {
		let (x, y) = g.node_xy(id).unwrap();
		bb = Some(match bb {
			None => (x, y, x, y),
			Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
		});
	}
	bb
}

/// The bounding box shrunk inward by a factor on every side.
pub fn reduce_bounding_box(g: &Graph, factor: f64) -> Option<(f64, f64, f64, f64)> {
	bounding_box(g).map(|(x0, y0, x1, y1)| {
		let (w, h) = (x1 - x0, y1 - y0);
		(x0 + w * factor, y0 + h * factor, x1 - w * factor, y1 - h * factor)
	})
}

/// The subgraph of nodes inside the box, with the edges both of whose ends survive.
pub fn crop_graph(g: &Graph, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Graph {
	let inside = |id: NodeId| {
		let (x, y) = g.node_xy(id).unwrap();
		min_x <= x && x <= max_x && min_y <= y && y <= max_y
	};
	let mut out = Graph::from_parts(
		g.nodes().filter(|&id| inside(id)).map(|id| (id, g.node_xy(id).unwrap())),
		g.edges().filter(|&(p1, p2)| inside(p1) && inside(p2)),
	).unwrap();
	for (p1, p2) in out.edges().collect::<Vec<_>>() {
		if let Some(v) = g.speed(p1, p2) {
			out.set_speed(p1, p2, v);
		}
	}
	out
}
