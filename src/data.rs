use crate::*;

use serde::*;

/// A node of the interchange graph format.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct GraphNode {
	pub id: NodeId,
	pub x: f64,
	pub y: f64,
}

/// An edge of the interchange graph format.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct GraphEdge {
	pub p1: NodeId,
	pub p2: NodeId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub speed: Option<f64>,
}

/// Serializable road graph, as read from and written to disk.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RoadGraph {
	pub nodes: Vec<GraphNode>,
	pub edges: Vec<GraphEdge>,
}

/// One map-matched trajectory: the node ids it follows on graph A, its coordinates,
/// and the node ids the matcher snapped it to on graph B.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Match {
	pub trace_a: TrajectoryIds,
	pub trace: Trajectory,
	pub trace_b: TrajectoryIds,
}

/// Where a single node of graph B landed on graph A.
///
/// `segment_a_id` is ordered: it encodes the direction the majority of trajectories
/// traversed the segment in.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ConflationResult {
	pub segment_a_id: (NodeId, NodeId),
	pub segment_a_coords: ((f64, f64), (f64, f64)),
	pub point_b: NodeId,
	pub point_b_coords: (f64, f64),
	pub point_b_on_segment_a: (f64, f64),
	pub number_of_votes: u64,
}
