//! GeoJSON ingestion and export.

use crate::*;
use crate::graph::Graph;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};

fn features(s: &str) -> Result<Vec<Feature>, String> {
	match s.parse::<GeoJson>().map_err(|e| e.to_string())? {
		GeoJson::FeatureCollection(fc) => Ok(fc.features),
		_ => Err("Expected a FeatureCollection".to_string()),
	}
}

fn property_i64(f: &Feature, key: &str) -> Result<NodeId, String> {
	f.properties.as_ref()
		.and_then(|p| p.get(key))
		.and_then(|v| v.as_i64())
		.ok_or_else(|| format!("Feature is missing integer property {:?}", key))
}

/// Build a graph from two FeatureCollections: Point features carrying an `id`
/// property, and LineString features carrying `u`, `v` and optionally `speed`.
pub fn graph_from_geojson(nodes_geojson: &str, edges_geojson: &str) -> Result<Graph, String> {
	let mut nodes = Vec::new();
	for f in features(nodes_geojson)? {
		let id = property_i64(&f, "id")?;
		match f.geometry.as_ref().map(|g| &g.value) {
			Some(Value::Point(p)) if p.len() >= 2 => nodes.push((id, (p[0], p[1]))),
			_ => return Err(format!("Node {} has no Point geometry", id)),
		}
	}
	let mut edges = Vec::new();
	let mut speeds = Vec::new();
	for f in features(edges_geojson)? {
		let u = property_i64(&f, "u")?;
		let v = property_i64(&f, "v")?;
		if let Some(s) = f.properties.as_ref().and_then(|p| p.get("speed")).and_then(|s| s.as_f64()) {
			speeds.push((u, v, s));
		}
		edges.push((u, v));
	}
	let mut g = Graph::from_parts(nodes, edges)?;
	for (u, v, s) in speeds {
		g.set_speed(u, v, s);
	}
	Ok(g)
}

/// Render a node path as a LineString, dropping ids the graph does not know.
pub fn path_to_geojson(g: &Graph, path: &[NodeId]) -> Geometry {
	Geometry::new(Value::LineString(
		path.iter().flat_map(|&id| g.node_xy(id).map(|(x, y)| vec![x, y])).collect(),
	))
}

/// Render conflation results as Point features at the projected coordinates.
pub fn results_to_geojson(results: &[ConflationResult]) -> GeoJson {
	let features = results.iter().map(|r| {
		let mut properties = serde_json::Map::new();
		properties.insert("point_b".to_string(), r.point_b.into());
		properties.insert("segment_u".to_string(), r.segment_a_id.0.into());
		properties.insert("segment_v".to_string(), r.segment_a_id.1.into());
		properties.insert("number_of_votes".to_string(), r.number_of_votes.into());
		Feature {
			bbox: None,
			geometry: Some(Geometry::new(Value::Point(vec![r.point_b_on_segment_a.0, r.point_b_on_segment_a.1]))),
			id: None,
			properties: Some(properties),
			foreign_members: None,
		}
	}).collect();
	GeoJson::FeatureCollection(FeatureCollection { bbox: None, features, foreign_members: None })
}

#[cfg(test)]
mod tests {
	use super::*;

	const NODES: &str = r#"{"type": "FeatureCollection", "features": [
		{"type": "Feature", "properties": {"id": 1}, "geometry": {"type": "Point", "coordinates": [4.35, 50.84]}},
		{"type": "Feature", "properties": {"id": 2}, "geometry": {"type": "Point", "coordinates": [4.36, 50.85]}}
	]}"#;
	const EDGES: &str = r#"{"type": "FeatureCollection", "features": [
		{"type": "Feature", "properties": {"u": 1, "v": 2, "speed": 30.0},
		 "geometry": {"type": "LineString", "coordinates": [[4.35, 50.84], [4.36, 50.85]]}}
	]}"#;

	#[test]
	fn parses_a_node_edge_pair_of_collections() {
		let g = graph_from_geojson(NODES, EDGES).unwrap();
		assert_eq!(g.node_count(), 2);
		assert!(g.has_edge(1, 2));
		assert_eq!(g.speed(1, 2), Some(30.0));
	}

	#[test]
	fn rejects_edges_against_unknown_nodes() {
		let broken = r#"{"type": "FeatureCollection", "features": [
			{"type": "Feature", "properties": {"u": 1, "v": 9}, "geometry": null}
		]}"#;
		assert!(graph_from_geojson(NODES, broken).is_err());
	}

	#[test]
	fn renders_paths_and_results() {
		let g = graph_from_geojson(NODES, EDGES).unwrap();
		match path_to_geojson(&g, &[1, 2, 7]).value {
			Value::LineString(coords) => assert_eq!(coords.len(), 2),
			_ => panic!("not a LineString"),
		}
		let results = vec![ConflationResult {
			segment_a_id: (1, 2),
			segment_a_coords: ((4.35, 50.84), (4.36, 50.85)),
			point_b: 9,
			point_b_coords: (4.355, 50.846),
			point_b_on_segment_a: (4.3551, 50.8451),
			number_of_votes: 3,
		}];
		match results_to_geojson(&results) {
			GeoJson::FeatureCollection(fc) => {
				assert_eq!(fc.features.len(), 1);
				let p = fc.features[0].properties.as_ref().unwrap();
				assert_eq!(p.get("number_of_votes").unwrap().as_u64(), Some(3));
			}
			_ => panic!("not a FeatureCollection"),
		}
	}
}
