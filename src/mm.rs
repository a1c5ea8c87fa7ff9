//! HMM map matching of coordinate trajectories onto graph B.
//!
//! The matcher keeps a planar replica of B (equirectangular, metres) with an R-tree
//! over its segments. Every observation spawns candidate states, one per nearby
//! directed edge; emissions are Gaussian in the perpendicular distance, transitions
//! Gaussian in the gap between along-graph and great-circle travel. Nodes traversed
//! between two consecutive candidate edges act as non-emitting states: they consume
//! no observation, score against the observation chord at `obs_noise_ne`, and their
//! length share is dampened by `non_emitting_length_factor`.

use crate::*;
use crate::geom::{self, Metric};
use crate::graph::Graph;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use noisy_float::prelude::*;
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::*;

/// Tunables of the distance matcher. All distances are metres.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
#[serde(default)]
pub struct MatcherSettings {
	pub max_dist: f64,
	pub max_dist_init: f64,
	pub min_prob_norm: f64,
	pub non_emitting_length_factor: f64,
	pub obs_noise: f64,
	pub obs_noise_ne: f64,
	pub dist_noise: f64,
	pub non_emitting_states: bool,
	pub max_lattice_width: usize,
}

impl Default for MatcherSettings {
	fn default() -> Self {
		Self {
			max_dist: 100.0,
			max_dist_init: 25.0,
			min_prob_norm: 0.001,
			non_emitting_length_factor: 0.75,
			obs_noise: 50.0,
			obs_noise_ne: 75.0,
			dist_noise: 50.0,
			non_emitting_states: true,
			max_lattice_width: 5,
		}
	}
}

/// Unnormalized Gaussian log-density.
fn gaussian(d: f64, noise: f64) -> f64 {
	-(d * d) / (2.0 * noise * noise)
}

/// An undirected segment of the replica, indexable by the R-tree.
struct Seg {
	a: usize,
	b: usize,
	p1: [f64; 2],
	p2: [f64; 2],
}

impl RTreeObject for Seg {
	type Envelope = AABB<[f64; 2]>;
	fn envelope(&self) -> Self::Envelope {
		AABB::from_corners(self.p1, self.p2)
	}
}

impl PointDistance for Seg {
	fn distance_2(&self, point: &[f64; 2]) -> f64 {
		let (d, _, _) = geom::point_segment((point[0], point[1]), (self.p1[0], self.p1[1]), (self.p2[0], self.p2[1]));
		d * d
	}
}

/// One lattice state: a directed edge with the observation's projection onto it.
#[derive(Clone, Debug)]
struct State {
	edge: (usize, usize),
	t: f64,
	logp: f64,
	/// Predecessor index in the previous column.
	back: usize,
	/// Nodes appended to the output walk when this state follows its predecessor.
	walk: Vec<usize>,
}

/// How one candidate edge is reached from the previous one.
struct Rejoin {
	/// Travel on the two candidate edges themselves.
	direct: f64,
	/// Graph travel between them, covered by non-emitting states.
	between: f64,
	/// Nodes strictly between the two edges.
	inter: Vec<usize>,
	walk: Vec<usize>,
}

/// Map matcher over a fixed graph B.
pub struct Matcher {
	settings: MatcherSettings,
	metric: Metric,
	ids: Vec<NodeId>,
	xy: Vec<(f64, f64)>,
	adj: Vec<Vec<(usize, f64)>>,
	tree: RTree<Seg>,
}

impl Matcher {
	pub fn new(graph_b: &Graph) -> Self {
		Self::with_settings(graph_b, Default::default())
	}
	pub fn with_settings(graph_b: &Graph, settings: MatcherSettings) -> Self {
		let n = graph_b.node_count();
		let mut ids = Vec::with_capacity(n);
		let mut slot = HashMap::with_capacity(n);
		let mut lonlat = Vec::with_capacity(n);
		for id in graph_b.nodes() {
			slot.insert(id, ids.len());
			ids.push(id);
			lonlat.push(graph_b.node_xy(id).unwrap());
		}
		let reference = if lonlat.is_empty() {
			(0.0, 0.0)
		} else {
			let sum = lonlat.iter().fold((0.0, 0.0), |s, &(x, y)| (s.0 + x, s.1 + y));
			(sum.0 / lonlat.len() as f64, sum.1 / lonlat.len() as f64)
		};
		let metric = Metric::new(reference);
		let xy: Vec<(f64, f64)> = lonlat.into_iter().map(|p| metric.to_xy(p)).collect();
		let mut adj = vec![Vec::new(); n];
		let mut segs = Vec::with_capacity(graph_b.edge_count());
		for (p1, p2) in graph_b.edges() {
			let (a, b) = (slot[&p1], slot[&p2]);
			let len = geom::euclidean(xy[a], xy[b]);
			adj[a].push((b, len));
			adj[b].push((a, len));
			segs.push(Seg { a, b, p1: [xy[a].0, xy[a].1], p2: [xy[b].0, xy[b].1] });
		}
		log::debug!("replica: {} nodes, {} segments", n, segs.len());
		Self { settings, metric, ids, xy, adj, tree: RTree::bulk_load(segs) }
	}

	/// Candidate states for one observation: both orientations of every segment
	/// within `max_dist`, deterministically ordered closest-first.
	fn candidates(&self, pt: (f64, f64), max_dist: f64) -> Vec<((usize, usize), f64, f64)> {
		let mut out = Vec::new();
		for seg in self.tree.locate_within_distance([pt.0, pt.1], max_dist * max_dist) {
			let (d, t, _) = geom::point_segment(pt, (seg.p1[0], seg.p1[1]), (seg.p2[0], seg.p2[1]));
			if d <= max_dist {
				out.push(((seg.a, seg.b), t, d));
				out.push(((seg.b, seg.a), 1.0 - t, d));
			}
		}
		out.sort_by_key(|&(e, t, d)| (n64(d), e.0, e.1, n64(t)));
		out
	}

	/// Dijkstra between two replica nodes, bounded by `cutoff`.
	/// Returns the metre distance and the node path walked.
	fn pathfind(&self, from: usize, to: usize, cutoff: f64) -> Option<(f64, Vec<usize>)> {
		if from == to {
			return Some((0.0, vec![from]));
		}
		let mut dp: HashMap<usize, (f64, usize)> = HashMap::new();
		dp.insert(from, (0.0, from));
		let mut q = PriorityQueue::new();
		q.push(from, -n64(0.0));
		while let Some((u, _)) = q.pop() {
			if u == to {
				let mut path = vec![u];
				let mut v = u;
				while v != from {
					v = dp[&v].1;
					path.push(v);
				}
				path.reverse();
				return Some((dp[&u].0, path));
			}
			let du = dp[&u].0;
			for &(v, len) in &self.adj[u] {
				let dv = du + len;
				if dv <= cutoff && dp.get(&v).map_or(true, |&(old, _)| old > dv) {
					dp.insert(v, (dv, u));
					q.push(v, -n64(dv));
				}
			}
		}
		None
	}

	/// Along-graph travel from a projection on one directed edge to one on another.
	/// `None` when the second edge cannot be reached within `cutoff`.
	fn rejoin(&self, from: ((usize, usize), f64), to: ((usize, usize), f64), cutoff: f64) -> Option<Rejoin> {
		let ((a, b), t1) = from;
		let ((c, d), t2) = to;
		let len1 = geom::euclidean(self.xy[a], self.xy[b]);
		let len2 = geom::euclidean(self.xy[c], self.xy[d]);
		if (a, b) == (c, d) {
			return Some(Rejoin { direct: (t2 - t1).abs() * len1, between: 0.0, inter: Vec::new(), walk: Vec::new() });
		}
		let direct = (1.0 - t1) * len1 + t2 * len2;
		if b == c {
			return Some(Rejoin { direct, between: 0.0, inter: Vec::new(), walk: vec![d] });
		}
		if !self.settings.non_emitting_states {
			// without non-emitting states only single-hop rejoins are admissible
			let hop = self.adj[b].iter().find(|&&(v, _)| v == c).map(|&(_, len)| len)?;
			return Some(Rejoin { direct, between: hop, inter: Vec::new(), walk: vec![c, d] });
		}
		let (between, path) = self.pathfind(b, c, cutoff)?;
		let inter = path[1..path.len() - 1].to_vec();
		let mut walk = path[1..].to_vec();
		walk.push(d);
		Some(Rejoin { direct, between, inter, walk })
	}

	/// Sort a column best-first, cap it at the lattice width, drop states whose
	/// probability relative to the column's best falls under `min_prob_norm`.
	fn prune(&self, col: &mut Vec<State>) {
		if col.is_empty() {
			return;
		}
		col.sort_by_key(|st| -n64(st.logp));
		col.truncate(self.settings.max_lattice_width);
		let floor = col[0].logp + self.settings.min_prob_norm.ln();
		col.retain(|st| st.logp >= floor);
	}

	/// Most likely node path of graph B under the trajectory. Empty when the first
	/// observation finds no edge within `max_dist_init` or the lattice dies.
	pub fn match_trajectory(&self, trajectory: &[(f64, f64)]) -> Vec<NodeId> {
		let s = self.settings;
		if trajectory.is_empty() {
			return Vec::new();
		}
		let obs: Vec<(f64, f64)> = trajectory.iter().map(|&p| self.metric.to_xy(p)).collect();
		let mut col: Vec<State> = self.candidates(obs[0], s.max_dist_init).into_iter().map(|(edge, t, d)| State {
			edge,
			t,
			logp: gaussian(d, s.obs_noise),
			back: usize::MAX,
			walk: vec![edge.0, edge.1],
		}).collect();
		self.prune(&mut col);
		if col.is_empty() {
			return Vec::new();
		}
		let mut columns = vec![col];
		for i in 1..obs.len() {
			let gc = geom::haversine(trajectory[i - 1], trajectory[i]);
			let cutoff = gc + 10.0 * s.dist_noise;
			let prev = columns.last().unwrap();
			let mut col = Vec::new();
			for (edge, t, d) in self.candidates(obs[i], s.max_dist) {
				let e_lp = gaussian(d, s.obs_noise);
				let mut best: Option<State> = None;
				for (j, p) in prev.iter().enumerate() {
					let r = match self.rejoin((p.edge, p.t), (edge, t), cutoff) {
						Some(r) => r,
						None => continue,
					};
					let between = if s.non_emitting_states { r.between * s.non_emitting_length_factor } else { r.between };
					let mut lp = p.logp + e_lp + gaussian(r.direct + between - gc, s.dist_noise);
					for &w in &r.inter {
						lp += gaussian(geom::point_segment(self.xy[w], obs[i - 1], obs[i]).0, s.obs_noise_ne);
					}
					if best.as_ref().map_or(true, |b| lp > b.logp) {
						best = Some(State { edge, t, logp: lp, back: j, walk: r.walk });
					}
				}
				if let Some(st) = best {
					col.push(st);
				}
			}
			self.prune(&mut col);
			if col.is_empty() {
				log::debug!("lattice died at observation {}", i);
				return Vec::new();
			}
			columns.push(col);
		}
		// Viterbi back-trace; ties resolve to the first (closest-candidate) state
		let last = columns.len() - 1;
		let mut pick = vec![0usize; columns.len()];
		for (j, st) in columns[last].iter().enumerate() {
			if st.logp > columns[last][pick[last]].logp {
				pick[last] = j;
			}
		}
		for i in (1..columns.len()).rev() {
			pick[i - 1] = columns[i][pick[i]].back;
		}
		let mut walk: Vec<usize> = Vec::new();
		for (i, &j) in pick.iter().enumerate() {
			for &n in &columns[i][j].walk {
				if walk.last() != Some(&n) {
					walk.push(n);
				}
			}
		}
		walk.into_iter().map(|slot| self.ids[slot]).collect()
	}

	/// Match a batch, chunked by the thousand and fanned out over `processes`
	/// workers. Results come back in input order; a cancellation observed between
	/// trajectories truncates the affected workers' output.
	pub fn match_trajectories(&self, trajectories: &[Trajectory], trajectories_ids: &[TrajectoryIds], processes: usize, cancel: Option<&AtomicBool>) -> Result<Vec<Match>, String> {
		if trajectories.len() != trajectories_ids.len() {
			return Err(format!("{} trajectories but {} id lists", trajectories.len(), trajectories_ids.len()));
		}
		let processes = processes.max(1);
		let pool = rayon::ThreadPoolBuilder::new().num_threads(processes).build().map_err(|e| e.to_string())?;
		let pairs: Vec<(&Trajectory, &TrajectoryIds)> = trajectories.iter().zip(trajectories_ids).collect();
		let mut all = Vec::with_capacity(pairs.len());
		for chunk in pairs.chunks(1000) {
			let batch = (chunk.len() + processes - 1) / processes;
			let matched: Vec<Vec<Match>> = pool.install(|| {
				chunk.par_chunks(batch).map(|sub| {
					let mut out = Vec::with_capacity(sub.len());
					for &(trajectory, ids) in sub {
						if cancel.map_or(false, |c| c.load(Ordering::Relaxed)) {
							break;
						}
						out.push(Match {
							trace_a: (*ids).clone(),
							trace: (*trajectory).clone(),
							trace_b: self.match_trajectory(trajectory),
						});
					}
					out
				}).collect()
			});
			all.extend(matched.into_iter().flatten());
			log::debug!("matched {} of {} trajectories", all.len(), pairs.len());
		}
		Ok(all)
	}
}

/// One-shot batch matching against `graph_b`, with optional settings overrides.
pub fn match_trajectories(graph_b: &Graph, trajectories: &[Trajectory], trajectories_ids: &[TrajectoryIds], processes: usize, settings: Option<MatcherSettings>) -> Result<Vec<Match>, String> {
	Matcher::with_settings(graph_b, settings.unwrap_or_default()).match_trajectories(trajectories, trajectories_ids, processes, None)
}
