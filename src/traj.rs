//! Trajectory synthesis over graph A.
//!
//! The conflater downstream needs votes on as many segments as possible, so the goal
//! here is coverage, not realism: long backbone paths between convex-hull corners
//! first, then rounds of randomized space-filling walks until no node is left behind.

use crate::*;
use crate::graph::Graph;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use geo::prelude::*;
use indexmap::IndexSet;
use itertools::Itertools;
use noisy_float::prelude::*;
use rand::prelude::*;
use rayon::prelude::*;

/// Node ids sitting on the convex hull of the graph's positions.
///
/// Graphs too small to span a hull report all their nodes as boundary.
fn hull_nodes(g: &Graph) -> Vec<NodeId> {
	if g.node_count() < 3 {
		return g.nodes().collect();
	}
	let mut by_pos = std::collections::HashMap::new();
	let mut points = Vec::with_capacity(g.node_count());
	for id in g.nodes() {
		let (x, y) = g.node_xy(id).unwrap();
		by_pos.entry((x.to_bits(), y.to_bits())).or_insert(id);
		points.push(geo::Point::new(x, y));
	}
	let hull = geo::MultiPoint(points).convex_hull();
	let ring = &hull.exterior().0;
	let mut boundary = Vec::new();
	for c in ring.iter().take(ring.len().saturating_sub(1)) {
		if let Some(&id) = by_pos.get(&(c.x.to_bits(), c.y.to_bits())) {
			if !boundary.contains(&id) {
				boundary.push(id);
			}
		}
	}
	if boundary.len() < 2 {
		g.nodes().collect()
	} else {
		boundary
	}
}

/// Greedy space-filling walk: from `source`, keep stepping to the nearest neighbour
/// not yet on the walk, until `target` is reached or the walk is stuck.
fn greedy_walk(g: &Graph, source: NodeId, target: NodeId) -> Vec<NodeId> {
	let mut path = vec![source];
	let mut on_path: HashSet<NodeId> = path.iter().copied().collect();
	while *path.last().unwrap() != target {
		let current = *path.last().unwrap();
		let cxy = g.node_xy(current).unwrap();
		let next = g.neighbors(current)
			.filter(|n| !on_path.contains(n))
			.min_by_key(|&n| {
				let nxy = g.node_xy(n).unwrap();
				n64((cxy.0 - nxy.0).powi(2) + (cxy.1 - nxy.1).powi(2))
			});
		match next {
			Some(n) => {
				on_path.insert(n);
				path.push(n);
			}
			None => break,
		}
	}
	path
}

/// One covering task: greedy walk, shortest-path fallback, length floor.
fn cover_path(g: &Graph, source: NodeId, target: NodeId, min_path_length: usize) -> Option<Vec<NodeId>> {
	let mut path = greedy_walk(g, source, target);
	if path.len() < min_path_length {
		if let Some(sp) = g.shortest_path(source, target) {
			path = sp;
		}
	}
	if path.len() < min_path_length {
		None
	} else {
		log::debug!("Path from {} to {}: length {}", source, target, path.len());
		Some(path)
	}
}

/// Generate a set of walks on `g` that together visit every node.
///
/// Every returned path is a valid walk of `g` of length at least `min_path_length`,
/// except the unconditional hull-to-hull backbone paths. Randomness is fully
/// determined by `seed` (and `processes`, which sizes the rounds); the walks
/// themselves run on a worker pool. `cancel` is polled between tasks and makes the
/// call return what it has gathered so far.
pub fn generate_trajectories(g: &Graph, min_path_length: usize, seed: u64, processes: usize, cancel: Option<&AtomicBool>) -> Result<Vec<Vec<NodeId>>, String> {
	if g.is_empty() {
		return Ok(Vec::new());
	}
	let cancelled = || cancel.map_or(false, |c| c.load(Ordering::Relaxed));
	let processes = processes.max(1);
	let pool = rayon::ThreadPoolBuilder::new().num_threads(processes).build().map_err(|e| e.to_string())?;
	let all_nodes: Vec<NodeId> = g.nodes().collect();
	let mut unvisited: IndexSet<NodeId> = g.nodes().collect();
	let mut paths: Vec<Vec<NodeId>> = Vec::new();

	log::info!("Generating trajectories over {} nodes", all_nodes.len());
	let boundary = hull_nodes(g);
	log::debug!("{} boundary nodes", boundary.len());
	for (i, j) in boundary.iter().copied().tuple_combinations::<(_, _)>() {
		if let Some(path) = g.shortest_path(i, j) {
			for n in &path {
				unvisited.swap_remove(n);
			}
			paths.push(path);
		}
	}
	log::debug!("{} backbone paths, {} nodes uncovered", paths.len(), unvisited.len());

	let mut rng = StdRng::seed_from_u64(seed);
	while !unvisited.is_empty() && !cancelled() {
		let mut tasks = Vec::with_capacity(unvisited.len().min(processes * 100));
		for _ in 0..unvisited.len().min(processes * 100) {
			if cancelled() {
				break;
			}
			let source = *unvisited.get_index(rng.gen_range(0..unvisited.len())).unwrap();
			let target = all_nodes[rng.gen_range(0..all_nodes.len())];
			tasks.push((source, target));
		}
		let results: Vec<Option<Vec<NodeId>>> = pool.install(|| {
			tasks.par_iter().map(|&(s, t)| cover_path(g, s, t, min_path_length)).collect()
		});
		let mut progressed = false;
		for path in results.into_iter().flatten() {
			for n in &path {
				progressed |= unvisited.swap_remove(n);
			}
			paths.push(path);
		}
		if !progressed {
			// every task fell below the length floor; pair the stragglers off with a
			// neighbour each (a length-2 walk, itself below the floor) and retire them
			log::debug!("retiring {} uncoverable nodes", unvisited.len());
			unvisited.clear();
		}
		log::debug!("{} paths, {} nodes uncovered", paths.len(), unvisited.len());
	}
	log::info!("Generated {} trajectories", paths.len());
	Ok(paths)
}

/// Materialize an id-form trajectory into its `(lon, lat)` samples.
pub fn trajectory_coords(g: &Graph, ids: &[NodeId]) -> Result<Trajectory, String> {
	ids.iter().map(|&id| g.node_xy(id).ok_or_else(|| format!("Nodes set missing {}", id))).collect()
}
