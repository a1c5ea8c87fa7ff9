//! Majority-vote conflation of map-matched trajectories.
//!
//! Every B node observed on a matched trajectory votes for the segment of the
//! A-trajectory it is closest to, direction included. The votes are tallied in
//! insertion order, so equal counts resolve to the first segment seen and a given
//! input always produces the same output.
//!
//! Distances here are measured on raw lon/lat treated as a plane, as the reference
//! system does; only the matcher works in a metric frame.

use crate::*;
use crate::geom;
use crate::graph::Graph;

use indexmap::IndexMap;
use noisy_float::prelude::*;

/// Voting conflater over a fixed pair of graphs.
pub struct Conflater<'a> {
	graph_a: &'a Graph,
	graph_b: &'a Graph,
	trace_b_min_length: usize,
	trim: usize,
}

impl<'a> Conflater<'a> {
	/// Defaults: matches under 50 B nodes are dropped, 5 nodes come off each end.
	pub fn new(graph_a: &'a Graph, graph_b: &'a Graph) -> Self {
		Self::with_limits(graph_a, graph_b, 50, 5)
	}
	pub fn with_limits(graph_a: &'a Graph, graph_b: &'a Graph, trace_b_min_length: usize, trim: usize) -> Self {
		Self { graph_a, graph_b, trace_b_min_length, trim }
	}

	/// Matches long enough to vote, lazily.
	fn filtered<'m>(&self, matches: &'m [Match]) -> impl Iterator<Item = &'m Match> {
		let min = self.trace_b_min_length;
		matches.iter().filter(move |m| m.trace_b.len() >= min)
	}

	/// The noisy endpoints of a matched trace, removed.
	fn trimmed<'m>(&self, trace_b: &'m [NodeId]) -> &'m [NodeId] {
		let lo = self.trim.min(trace_b.len());
		let hi = trace_b.len().saturating_sub(self.trim);
		if lo < hi {
			&trace_b[lo..hi]
		} else {
			&[]
		}
	}

	pub fn conflate(&self, matches: &[Match]) -> Result<Vec<ConflationResult>, String> {
		let mut votes: IndexMap<NodeId, IndexMap<(NodeId, NodeId), u64>> = IndexMap::new();
		let mut total = 0usize;
		for m in self.filtered(matches) {
			let trace_a: Vec<(NodeId, (f64, f64))> = m.trace_a.iter()
				.map(|&id| self.graph_a.node_xy(id).map(|xy| (id, xy)).ok_or_else(|| format!("Nodes set missing {}", id)))
				.collect::<Result<_, _>>()?;
			for &p in self.trimmed(&m.trace_b) {
				let pxy = match self.graph_b.node_xy(p) {
					Some(xy) => xy,
					None => {
						log::warn!("Matched node {} is not in graph B", p);
						continue;
					}
				};
				let ballot = trace_a.windows(2)
					.filter(|w| w[0].1 != w[1].1)
					.min_by_key(|w| n64(geom::point_segment(pxy, w[0].1, w[1].1).0));
				if let Some(w) = ballot {
					*votes.entry(p).or_default().entry((w[0].0, w[1].0)).or_insert(0) += 1;
					total += 1;
				}
			}
		}
		log::info!("Tallied {} votes over {} nodes", total, votes.len());

		let mut results = Vec::with_capacity(votes.len());
		for (p, tally) in votes {
			let mut winner = None;
			for (&segment, &n) in &tally {
				if winner.map_or(true, |(_, best)| n > best) {
					winner = Some((segment, n));
				}
			}
			let ((u, v), number_of_votes) = winner.unwrap();
			let a1 = self.graph_a.node_xy(u).unwrap();
			let a2 = self.graph_a.node_xy(v).unwrap();
			let pxy = self.graph_b.node_xy(p).unwrap();
			let (_, _, proj) = geom::point_segment(pxy, a1, a2);
			results.push(ConflationResult {
				segment_a_id: (u, v),
				segment_a_coords: (a1, a2),
				point_b: p,
				point_b_coords: pxy,
				point_b_on_segment_a: proj,
				number_of_votes,
			});
		}
		Ok(results)
	}
}

/// Conflate with the default end trimming.
pub fn conflate(graph_a: &Graph, graph_b: &Graph, matches: &[Match], trace_b_min_length: usize) -> Result<Vec<ConflationResult>, String> {
	Conflater::with_limits(graph_a, graph_b, trace_b_min_length, 5).conflate(matches)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn straight(n: NodeId, y: f64) -> Graph {
		Graph::from_parts(
			(0..n).map(|i| (i, (i as f64, y))),
			(0..n - 1).map(|i| (i, i + 1)),
		).unwrap()
	}

	fn full_match(g: &Graph, n: NodeId) -> Match {
		let ids: Vec<NodeId> = (0..n).collect();
		Match {
			trace_a: ids.clone(),
			trace: ids.iter().map(|&i| g.node_xy(i).unwrap()).collect(),
			trace_b: ids,
		}
	}

	#[test]
	fn identical_graphs_trimmed_to_nothing() {
		let a = straight(5, 0.0);
		let b = straight(5, 0.0);
		let results = Conflater::with_limits(&a, &b, 0, 5).conflate(&[full_match(&a, 5)]).unwrap();
		assert!(results.is_empty());
	}

	#[test]
	fn identical_graphs_project_onto_themselves() {
		let a = straight(5, 0.0);
		let b = straight(5, 0.0);
		let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&[full_match(&a, 5)]).unwrap();
		assert_eq!(results.len(), 5);
		for r in &results {
			assert_eq!(r.point_b_on_segment_a, r.point_b_coords);
			assert_eq!(r.number_of_votes, 1);
			assert!(a.has_edge(r.segment_a_id.0, r.segment_a_id.1));
		}
		let points: std::collections::HashSet<_> = results.iter().map(|r| r.point_b).collect();
		assert_eq!(points.len(), 5);
	}

	#[test]
	fn offset_copy_projects_back_onto_the_road() {
		let a = straight(5, 0.0);
		let b = straight(5, 0.5);
		let m = Match {
			trace_a: (0..5).collect(),
			trace: (0..5).map(|i| (i as f64, 0.0)).collect(),
			trace_b: (0..5).collect(),
		};
		let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&[m]).unwrap();
		assert_eq!(results.len(), 5);
		for r in &results {
			assert_eq!(r.point_b_on_segment_a.1, 0.0);
			assert_eq!(r.point_b_on_segment_a.0, r.point_b_coords.0);
			let ((x1, _), (x2, _)) = r.segment_a_coords;
			assert!(x1.min(x2) <= r.point_b_coords.0 && r.point_b_coords.0 <= x1.max(x2));
		}
	}

	#[test]
	fn equal_votes_resolve_to_the_first_ballot() {
		let a = straight(5, 0.0);
		let b = Graph::from_parts(vec![(50, (1.5, 0.5))], vec![]).unwrap();
		let one = Match { trace_a: vec![1, 2], trace: vec![(1.0, 0.0), (2.0, 0.0)], trace_b: vec![50] };
		let two = Match { trace_a: vec![2, 3], trace: vec![(2.0, 0.0), (3.0, 0.0)], trace_b: vec![50] };
		let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&[one, two]).unwrap();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].segment_a_id, (1, 2));
		assert_eq!(results[0].number_of_votes, 1);
	}

	#[test]
	fn short_traces_contribute_nothing() {
		let a = straight(60, 0.0);
		let b = straight(60, 0.0);
		let long = full_match(&a, 60);
		let mut short = full_match(&a, 60);
		short.trace_b.truncate(49);
		let with = conflate(&a, &b, &[long.clone(), short], 50).unwrap();
		let without = conflate(&a, &b, &[long], 50).unwrap();
		assert!(!with.is_empty());
		assert_eq!(with, without);
	}

	#[test]
	fn non_adjacent_matched_sequences_are_accepted() {
		let a = straight(5, 0.0);
		let b = Graph::from_parts(
			vec![(10, (0.5, 0.1)), (42, (3.5, 0.1)), (11, (1.5, 0.1))],
			vec![(10, 11)],
		).unwrap();
		let m = Match {
			trace_a: (0..5).collect(),
			trace: (0..5).map(|i| (i as f64, 0.0)).collect(),
			trace_b: vec![10, 42, 11],
		};
		let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&[m]).unwrap();
		assert_eq!(results.len(), 3);
	}

	#[test]
	fn unknown_b_nodes_are_skipped_not_fatal() {
		let a = straight(5, 0.0);
		let b = Graph::from_parts(vec![(7, (2.5, 0.2))], vec![]).unwrap();
		let m = Match {
			trace_a: (0..5).collect(),
			trace: (0..5).map(|i| (i as f64, 0.0)).collect(),
			trace_b: vec![7, 999],
		};
		let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&[m]).unwrap();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].point_b, 7);
	}

	#[test]
	fn unknown_a_nodes_fail_the_call() {
		let a = straight(3, 0.0);
		let b = straight(3, 0.0);
		let m = Match { trace_a: vec![0, 99], trace: vec![(0.0, 0.0), (99.0, 0.0)], trace_b: vec![0] };
		assert!(Conflater::with_limits(&a, &b, 0, 0).conflate(&[m]).is_err());
	}

	#[test]
	fn reversed_traversal_reverses_the_segments() {
		let a = straight(5, 0.0);
		// B nodes sit strictly inside one segment each, so the closest segment is unique
		let b = Graph::from_parts(
			(0..5).map(|i| (i, (i as f64 + 0.3, 0.25))),
			(0..4).map(|i| (i, i + 1)),
		).unwrap();
		let m = full_match(&a, 5);
		let mut rev = m.clone();
		rev.trace_a.reverse();
		rev.trace.reverse();
		let fwd = Conflater::with_limits(&a, &b, 0, 0).conflate(&[m]).unwrap();
		let bwd = Conflater::with_limits(&a, &b, 0, 0).conflate(&[rev]).unwrap();
		assert_eq!(fwd.len(), bwd.len());
		for f in &fwd {
			let r = bwd.iter().find(|r| r.point_b == f.point_b).unwrap();
			assert_eq!(r.segment_a_id, (f.segment_a_id.1, f.segment_a_id.0));
			assert_eq!(r.point_b_on_segment_a, f.point_b_on_segment_a);
			assert_eq!(r.number_of_votes, f.number_of_votes);
		}
	}

	#[test]
	fn conflation_is_idempotent() {
		let a = straight(8, 0.0);
		let b = straight(8, 0.1);
		let matches = vec![full_match(&a, 8)];
		let c = Conflater::with_limits(&a, &b, 0, 1);
		assert_eq!(c.conflate(&matches).unwrap(), c.conflate(&matches).unwrap());
	}

	#[test]
	fn appending_a_match_never_loses_votes() {
		let a = straight(8, 0.0);
		let b = straight(8, 0.1);
		let base = vec![full_match(&a, 8)];
		let mut more = base.clone();
		more.push(full_match(&a, 8));
		let before = Conflater::with_limits(&a, &b, 0, 1).conflate(&base).unwrap();
		let after = Conflater::with_limits(&a, &b, 0, 1).conflate(&more).unwrap();
		for r in &before {
			let r2 = after.iter().find(|x| x.point_b == r.point_b).unwrap();
			assert!(r2.number_of_votes >= r.number_of_votes);
		}
	}

	#[test]
	fn trimming_removes_exactly_the_ends() {
		let c = Conflater::with_limits;
		let a = straight(3, 0.0);
		let b = straight(3, 0.0);
		let k = c(&a, &b, 0, 5);
		assert!(k.trimmed(&[1; 10]).is_empty());
		assert_eq!(k.trimmed(&[1; 11]).len(), 1);
		let k0 = c(&a, &b, 0, 0);
		assert_eq!(k0.trimmed(&[1; 4]).len(), 4);
	}
}
