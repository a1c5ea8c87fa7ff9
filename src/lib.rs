//! Conflation of pairs of road network graphs.
//!
//! Given two graphs that describe (more or less) the same street network, the pipeline
//! manufactures trajectories covering the first graph, map-matches them against the second,
//! and lets every matched node vote for the directed segment of the first graph it lies on.
//! The winning segments, together with the projected node positions, are what downstream
//! enrichment uses to carry edge attributes from one graph onto the other.

pub mod data;
pub mod geom;
pub mod graph;
pub mod traj;
pub mod mm;
pub mod conflate;
pub mod enrich;
pub mod transform;
pub mod gj;

/// Stable node identifier, shared by both graphs.
pub type NodeId = i64;

/// Ordered node ids of a trajectory.
pub type TrajectoryIds = Vec<NodeId>;
/// The same trajectory as `(lon, lat)` samples.
pub type Trajectory = Vec<(f64, f64)>;

pub use crate::conflate::{conflate, Conflater};
pub use crate::data::{ConflationResult, Match, RoadGraph};
pub use crate::enrich::enrich;
pub use crate::graph::Graph;
pub use crate::mm::{match_trajectories, Matcher, MatcherSettings};
pub use crate::traj::{generate_trajectories, trajectory_coords};
