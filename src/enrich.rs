//! Attribute propagation from graph B onto an enriched copy of graph A.
//!
//! Conflation tells where every B node lands on A; enrichment splits the chosen
//! A segments there (Steiner nodes) and copies each B edge's attribute onto the
//! A edges between the two landing points. Nothing here is fatal: an edge that
//! cannot be carried over is logged and skipped.

use crate::*;
use crate::graph::Graph;

use std::collections::HashMap;

/// Split whatever survives of `edge` at a new node carrying `(x, y)`.
///
/// The original segment may have been split before, so its current pieces are
/// recovered as the shortest path between its endpoints; the piece whose midpoint
/// is closest to the insertion point is the one cut in two.
fn insert_node_at_edge(g: &mut Graph, edge: (NodeId, NodeId), new_node: NodeId, x: f64, y: f64) -> Result<(), String> {
	if g.has_node(new_node) {
		return Ok(());
	}
	let path = g.shortest_path(edge.0, edge.1).ok_or_else(|| format!("No path between {} and {}", edge.0, edge.1))?;
	if path.len() < 2 {
		return Err(format!("Segment ({}, {}) has no surviving pieces", edge.0, edge.1));
	}
	let mut best = 0;
	let mut best_d = f64::INFINITY;
	for i in 0..path.len() - 1 {
		let (x1, y1) = g.node_xy(path[i]).unwrap();
		let (x2, y2) = g.node_xy(path[i + 1]).unwrap();
		let d = ((x1 + x2) / 2.0 - x).powi(2) + ((y1 + y2) / 2.0 - y).powi(2);
		if d < best_d {
			best_d = d;
			best = i;
		}
	}
	g.add_node(new_node, (x, y));
	g.remove_edge(path[best], path[best + 1]);
	g.add_edge(path[best], new_node)?;
	g.add_edge(new_node, path[best + 1])?;
	Ok(())
}

fn ensure_steiner(g: &mut Graph, steiner: &mut HashMap<NodeId, NodeId>, r: &ConflationResult) -> Result<NodeId, String> {
	if let Some(&id) = steiner.get(&r.point_b) {
		return Ok(id);
	}
	let id = g.next_node_id();
	insert_node_at_edge(g, r.segment_a_id, id, r.point_b_on_segment_a.0, r.point_b_on_segment_a.1)?;
	steiner.insert(r.point_b, id);
	Ok(id)
}

/// Carry an edge attribute of graph B onto an enriched copy of graph A.
///
/// `"speed"` reads and writes the typed speed table; any other key moves the
/// opaque extras bytes.
pub fn enrich(graph_a: &Graph, graph_b: &Graph, results: &[ConflationResult], attribute: &str) -> Graph {
	let mut enriched = graph_a.clone();
	let by_point: HashMap<NodeId, &ConflationResult> = results.iter().map(|r| (r.point_b, r)).collect();
	let mut steiner: HashMap<NodeId, NodeId> = HashMap::new();
	for (p1, p2) in graph_b.edges() {
		let (r1, r2) = match (by_point.get(&p1), by_point.get(&p2)) {
			(Some(r1), Some(r2)) => (*r1, *r2),
			_ => {
				log::warn!("Edge ({}, {}) is missing a conflation result", p1, p2);
				continue;
			}
		};
		let (s1, s2) = match (ensure_steiner(&mut enriched, &mut steiner, r1), ensure_steiner(&mut enriched, &mut steiner, r2)) {
			(Ok(s1), Ok(s2)) => (s1, s2),
			(Err(e), _) | (_, Err(e)) => {
				log::error!("{}", e);
				continue;
			}
		};
		let path = match enriched.shortest_path(s1, s2) {
			Some(p) => p,
			None => {
				log::error!("No path between {} and {}", s1, s2);
				continue;
			}
		};
		if attribute == "speed" {
			let v = match graph_b.speed(p1, p2) {
				Some(v) => v,
				None => {
					log::warn!("Edge ({}, {}) carries no speed", p1, p2);
					continue;
				}
			};
			for w in path.windows(2) {
				enriched.set_speed(w[0], w[1], v);
			}
		} else {
			let v = match graph_b.extra(p1, p2) {
				Some(v) => v.to_vec(),
				None => {
					log::warn!("Edge ({}, {}) carries no {}", p1, p2, attribute);
					continue;
				}
			};
			for w in path.windows(2) {
				enriched.set_extra(w[0], w[1], v.clone());
			}
		}
	}
	enriched
}
