use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;
use routex_match::matching::{DEFAULT_BETA, DEFAULT_MAX_DISTANCE_DELTA, DEFAULT_SIGMA_Z};
use routex_match::reader::{self, FileFormat};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct LoadError(PathBuf, #[source] reader::Error);

#[derive(Parser)]
struct Cli {
    /// The path to the network file (optionally .gz or .bz2 compressed)
    network_file: PathBuf,

    /// The path to the trace file, one "lat lon" pair per line
    trace_file: PathBuf,

    /// Standard deviation of GPS noise, in meters
    #[arg(long, default_value_t = DEFAULT_SIGMA_Z)]
    sigma_z: f64,

    /// Expected route-vs-beeline mismatch between consecutive positions, in meters
    #[arg(long, default_value_t = DEFAULT_BETA)]
    beta: f64,

    /// Largest acceptable route-vs-beeline mismatch, in meters
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE_DELTA)]
    max_distance_delta: f64,

    /// Maximum distance between a position and its candidate nodes, in meters
    #[arg(long, default_value_t = routex_match::DEFAULT_SEARCH_RADIUS)]
    radius: f64,

    /// Maximum number of candidate nodes per position
    #[arg(long, default_value_t = routex_match::DEFAULT_MAX_CANDIDATES)]
    candidates: usize,

    /// Also output every candidate with its final score
    #[arg(long)]
    diagnostics: bool,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let g = load_graph(&cli.network_file)?;
    let trace = reader::read_trace_from_file(FileFormat::Unknown, &cli.trace_file)
        .map_err(|e| LoadError(cli.trace_file.clone(), e))?;
    log::info!("loaded {} nodes and {} positions", g.len(), trace.len());

    let tree = routex_match::KDTree::from_iter(g.iter().cloned()).ok_or("network has no nodes")?;
    let mut network = routex_match::GraphNetwork::new(
        &g,
        &tree,
        routex_match::CandidateOptions {
            search_radius: cli.radius,
            max_candidates: cli.candidates,
            ..Default::default()
        },
    )?;

    let options = routex_match::MatchOptions {
        sigma_z: cli.sigma_z,
        beta: cli.beta,
        max_distance_delta: cli.max_distance_delta,
        record_diagnostics: cli.diagnostics,
    };

    // Candidate lists are kept around for printing diagnostics
    let candidates = trace
        .iter()
        .map(|&p| routex_match::CandidateProvider::candidates(&network, p))
        .collect::<Vec<_>>();
    let matched = routex_match::match_trace(&mut network, &options, &candidates, &trace)?;

    if matched.broken_count() > 0 {
        log::warn!(
            "{} of {} positions could not be matched",
            matched.broken_count(),
            trace.len()
        );
    }

    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!("      \"properties\": {{");
    println!(
        "        \"timestamps\": {},",
        join(matched.points.iter().map(|p| p.cell.timestamp))
    );
    println!("        \"nodes\": {},", join(matched.locations().map(|n| n.id)));
    println!(
        "        \"breakage\": {}",
        join(matched.breakage.iter().map(|&b| b as u8))
    );
    println!("      }},");

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut nodes = matched.locations().peekable();
    while let Some(node) = nodes.next() {
        let suffix = if nodes.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", node.lon, node.lat, suffix);
    }

    println!("        ]");
    println!("      }}");

    if let Some(diagnostics) = &matched.diagnostics {
        for (t, states) in diagnostics.states.iter().enumerate() {
            for (s, state) in states.iter().enumerate() {
                let node = candidates[t][s].location;
                println!("    }}, {{");
                println!("      \"type\": \"Feature\",");
                println!("      \"properties\": {{");
                println!("        \"timestamp\": {},", t);
                println!("        \"node\": {},", node.id);
                println!("        \"distance\": {},", candidates[t][s].distance);
                println!("        \"score\": {},", state.score);
                println!("        \"pruned\": {},", state.pruned);
                println!("        \"chosen\": {}", state.chosen);
                println!("      }},");
                println!(
                    "      \"geometry\": {{\"type\": \"Point\", \"coordinates\": [{}, {}]}}",
                    node.lon, node.lat
                );
            }
        }
    }

    println!("    }}");
    println!("  ]");
    println!("}}");

    Ok(())
}

fn join<T: std::fmt::Display, I: Iterator<Item = T>>(items: I) -> String {
    let items = items.map(|i| i.to_string()).collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}

fn load_graph<P: AsRef<Path>>(path: P) -> Result<routex_match::Graph, LoadError> {
    let mut g = routex_match::Graph::default();
    match reader::add_graph_from_file(&mut g, FileFormat::Unknown, path.as_ref()) {
        Ok(()) => Ok(g),
        Err(e) => Err(LoadError(PathBuf::from(path.as_ref()), e)),
    }
}
