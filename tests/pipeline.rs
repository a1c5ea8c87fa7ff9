use std::collections::HashSet;

use map_conflation::*;

fn grid(w: NodeId, h: NodeId, step: f64) -> Graph {
	Graph::from_parts(
		(0..w * h).map(|i| (i, ((i % w) as f64 * step, (i / w) as f64 * step))),
		(0..w * h).flat_map(|i| {
			let mut es = vec![];
			if i % w < w - 1 {
				es.push((i, i + 1));
			}
			if i / w < h - 1 {
				es.push((i, i + w));
			}
			es
		}),
	)
	.unwrap()
}

fn run_pipeline(a: &Graph, b: &Graph) -> (Vec<Match>, Vec<ConflationResult>) {
	let trajectories_ids = generate_trajectories(a, 4, 42, 2, None).unwrap();
	assert!(!trajectories_ids.is_empty());
	let trajectories: Vec<Trajectory> = trajectories_ids.iter().map(|t| trajectory_coords(a, t).unwrap()).collect();
	let matched = match_trajectories(b, &trajectories, &trajectories_ids, 2, None).unwrap();
	assert_eq!(matched.len(), trajectories.len());
	let results = Conflater::with_limits(a, b, 0, 1).conflate(&matched).unwrap();
	(matched, results)
}

#[test]
fn identical_grids_conflate_onto_themselves() {
	let a = grid(6, 6, 1e-4);
	let b = grid(6, 6, 1e-4);
	let (matched, results) = run_pipeline(&a, &b);
	for m in &matched {
		for w in m.trace_b.windows(2) {
			assert!(b.has_edge(w[0], w[1]), "match leaves the graph at {} - {}", w[0], w[1]);
		}
	}
	assert!(!results.is_empty());
	let mut seen = HashSet::new();
	for r in &results {
		assert!(a.has_edge(r.segment_a_id.0, r.segment_a_id.1));
		assert!(b.has_node(r.point_b));
		assert!(seen.insert(r.point_b), "{} conflated twice", r.point_b);
		assert!(r.number_of_votes >= 1);
		let ((x1, y1), (x2, y2)) = r.segment_a_coords;
		let (px, py) = r.point_b_on_segment_a;
		assert!(x1.min(x2) - 1e-12 <= px && px <= x1.max(x2) + 1e-12);
		assert!(y1.min(y2) - 1e-12 <= py && py <= y1.max(y2) + 1e-12);
	}
}

#[test]
fn a_slightly_shifted_copy_projects_back() {
	let a = grid(6, 6, 1e-4);
	// a three-metre shift, well inside the observation noise
	let b = transform::translate_graph(&a, 3.0, 3.0);
	let (_, results) = run_pipeline(&a, &b);
	assert!(!results.is_empty());
	for r in &results {
		let d = ((r.point_b_coords.0 - r.point_b_on_segment_a.0).powi(2)
			+ (r.point_b_coords.1 - r.point_b_on_segment_a.1).powi(2))
			.sqrt();
		assert!(d < 1e-4, "{} projected {} degrees away", r.point_b, d);
	}
}

#[test]
fn conflation_feeds_enrichment() {
	// identical straight roads, conflated by hand-built matches, then enriched
	let a = grid(12, 1, 1.0);
	let mut b = grid(12, 1, 1.0);
	for (p1, p2) in b.edges().collect::<Vec<_>>() {
		b.set_speed(p1, p2, 5.0);
	}
	let ids: Vec<NodeId> = (0..12).collect();
	let matched = vec![Match {
		trace_a: ids.clone(),
		trace: ids.iter().map(|&i| a.node_xy(i).unwrap()).collect(),
		trace_b: ids,
	}];
	let results = Conflater::with_limits(&a, &b, 0, 0).conflate(&matched).unwrap();
	assert_eq!(results.len(), 12);
	let enriched = enrich(&a, &b, &results, "speed");
	// the first two steiner nodes flank the first B edge
	assert_eq!(enriched.node_xy(12), Some((0.0, 0.0)));
	assert_eq!(enriched.node_xy(13), Some((1.0, 0.0)));
	assert_eq!(enriched.speed(12, 13), Some(5.0));
	let carried = enriched.edges().filter(|&(u, v)| enriched.speed(u, v) == Some(5.0)).count();
	assert!(carried >= 11, "only {} edges carry the speed", carried);
}
