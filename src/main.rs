use std::convert::TryInto;

use clap::{crate_version, App, Arg, SubCommand};

use map_conflation::*;

fn load_graph(path: &str) -> std::io::Result<Graph> {
	let rg: RoadGraph = serde_json::from_reader(&std::fs::File::open(path)?).expect("Graph invalid JSON");
	Ok(rg.try_into().expect("Graph violates its own structure"))
}

fn main() -> std::io::Result<()> {
	env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));
	let matches = App::new("Map Conflation")
							.version(crate_version!())
							.about("Reconcile two road networks and carry attributes across")
							.subcommand(SubCommand::with_name("conflate")
								.about("Match graph B onto graph A and emit per-node segment assignments")
								.arg(Arg::with_name("graph-a")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("Graph A JSON"))
								.arg(Arg::with_name("graph-b")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Graph B JSON"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(3)
										.help("Output JSON"))
								.arg(Arg::with_name("min-path-length")
										.long("min-path-length")
										.takes_value(true)
										.default_value("100")
										.help("Shortest trajectory worth keeping, in nodes"))
								.arg(Arg::with_name("trace-b-min-length")
										.long("trace-b-min-length")
										.takes_value(true)
										.default_value("50")
										.help("Shortest match allowed to vote, in nodes"))
								.arg(Arg::with_name("processes")
										.long("processes")
										.takes_value(true)
										.default_value("8")
										.help("Worker pool size"))
								.arg(Arg::with_name("seed")
										.long("seed")
										.takes_value(true)
										.default_value("0")
										.help("Trajectory generation seed"))
								.arg(Arg::with_name("settings")
										.long("settings")
										.takes_value(true)
										.help("Matcher settings YAML"))
							)
							.subcommand(SubCommand::with_name("enrich")
								.about("Carry an edge attribute of graph B onto graph A along conflation results")
								.arg(Arg::with_name("graph-a")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("Graph A JSON"))
								.arg(Arg::with_name("graph-b")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Graph B JSON"))
								.arg(Arg::with_name("results")
										.takes_value(true)
										.required(true)
										.index(3)
										.help("(Produced) conflation results JSON"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(4)
										.help("Enriched graph A JSON"))
								.arg(Arg::with_name("attribute")
										.long("attribute")
										.takes_value(true)
										.default_value("speed")
										.help("Edge attribute to carry over"))
							)
							.subcommand(SubCommand::with_name("geojson")
								.about("Convert conflation results into GeoJSON")
								.arg(Arg::with_name("results")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("(Produced) conflation results JSON"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Output GeoJSON"))
							)
							.get_matches();
	if let Some(matches) = matches.subcommand_matches("conflate") {
		log::info!("Loading...");
		let graph_a = load_graph(matches.value_of("graph-a").unwrap())?.largest_component();
		let graph_b = load_graph(matches.value_of("graph-b").unwrap())?.largest_component();
		let min_path_length: usize = matches.value_of("min-path-length").unwrap().parse().expect("Invalid minimum path length");
		let trace_b_min_length: usize = matches.value_of("trace-b-min-length").unwrap().parse().expect("Invalid minimum trace length");
		let processes: usize = matches.value_of("processes").unwrap().parse().expect("Invalid worker count");
		let seed: u64 = matches.value_of("seed").unwrap().parse().expect("Invalid seed");
		let settings: Option<MatcherSettings> = match matches.value_of("settings") {
			Some(path) => Some(serde_yaml::from_reader(&std::fs::File::open(path)?).expect("Settings invalid YAML")),
			None => None,
		};
		log::info!("Loaded graphs ({} and {} nodes)", graph_a.node_count(), graph_b.node_count());
		let trajectories_ids = generate_trajectories(&graph_a, min_path_length, seed, processes, None).unwrap();
		let trajectories: Vec<Trajectory> = trajectories_ids.iter()
			.map(|t| trajectory_coords(&graph_a, t).unwrap())
			.collect();
		log::info!("Generated {} trajectories", trajectories.len());
		let matched = match_trajectories(&graph_b, &trajectories, &trajectories_ids, processes, settings).unwrap();
		log::info!("Matched trajectories");
		let results = conflate(&graph_a, &graph_b, &matched, trace_b_min_length).unwrap();
		log::info!("Conflated {} nodes", results.len());
		serde_json::to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?, &results).unwrap();
	} else if let Some(matches) = matches.subcommand_matches("enrich") {
		log::info!("Loading...");
		let graph_a = load_graph(matches.value_of("graph-a").unwrap())?;
		let graph_b = load_graph(matches.value_of("graph-b").unwrap())?;
		let results: Vec<ConflationResult> = serde_json::from_reader(&std::fs::File::open(matches.value_of("results").unwrap())?).expect("Results invalid JSON");
		let attribute = matches.value_of("attribute").unwrap();
		let enriched = enrich(&graph_a, &graph_b, &results, attribute);
		log::info!("Enriched graph A");
		serde_json::to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?, &RoadGraph::from(&enriched)).unwrap();
	} else if let Some(matches) = matches.subcommand_matches("geojson") {
		let results: Vec<ConflationResult> = serde_json::from_reader(&std::fs::File::open(matches.value_of("results").unwrap())?).expect("Results invalid JSON");
		serde_json::to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?, &gj::results_to_geojson(&results)).unwrap();
	}
	Ok(())
}
