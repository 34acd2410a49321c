use anyhow::{Context, Result};
use clap::Parser;
use linedeviation::config::JobConfig;
use linedeviation::export;
use linedeviation::ingest::{self, CandidateSource, GeoJsonCandidateSource};
use linedeviation::job::DeviationJob;
use linedeviation::progress::{Dataset, Progress};
use linedeviation::store::{CollectionKind, FeatureStore, MemoryStore, load_lines};
use std::fs;
use std::path::PathBuf;
use std::thread;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Reference network (GeoJSON LineString / MultiLineString features)
    #[arg(long, env = "DEVIATION_REFERENCE")]
    reference: PathBuf,

    /// Candidate network the reference is compared against
    #[arg(long, env = "DEVIATION_CANDIDATE")]
    candidate: PathBuf,

    /// Optional JSON array of candidate relations, used for road name lookups
    #[arg(long, env = "DEVIATION_RELATIONS")]
    relations: Option<PathBuf>,

    /// Namespace of every collection this run produces
    #[arg(long, env = "DEVIATION_MAP_ID", default_value = "default")]
    map_id: String,

    /// RON job configuration; defaults apply to anything left out
    #[arg(long, env = "DEVIATION_CONFIG")]
    config: Option<PathBuf>,

    /// Directory receiving one GeoJSON file per collection
    #[arg(long, env = "DEVIATION_OUT_DIR", default_value = "deviation_output")]
    out_dir: PathBuf,

    /// Candidate categories to leave out (comma-separated), e.g. footway,cycleway
    #[arg(long, env = "DEVIATION_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Candidate attribute holding the category
    #[arg(long, default_value = ingest::DEFAULT_CATEGORY_KEY)]
    category_key: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => JobConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => JobConfig::default(),
    };
    let search_radius = config.matching.search_radius;
    let job = DeviationJob::new(&args.map_id, config)?;

    let reference = ingest::read_lines_file(Dataset::Reference, &args.reference)
        .with_context(|| format!("reading reference network {}", args.reference.display()))?;
    let region = ingest::query_region(&reference, search_radius).context("reference network has no extent")?;

    let source = GeoJsonCandidateSource::new(
        ingest::read_lines_file(Dataset::Candidate, &args.candidate)
            .with_context(|| format!("reading candidate network {}", args.candidate.display()))?,
        args.category_key.clone(),
    );
    let candidate = source.candidates(&region, &args.exclude)?;

    let relations = match &args.relations {
        Some(path) => ingest::read_relations_file(path)
            .with_context(|| format!("reading relations {}", path.display()))?,
        None => Vec::new(),
    };

    let mut store = MemoryStore::new();
    job.import(&mut store, reference, candidate, relations)?;

    let (progress, events) = Progress::channel();
    let printer = thread::spawn(move || {
        for event in events {
            println!("{event}");
        }
    });
    let outcome = job.run(&mut store, &progress);
    drop(progress);
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("progress printer panicked"))?;
    let summary = outcome?;

    fs::create_dir_all(&args.out_dir).with_context(|| format!("creating {}", args.out_dir.display()))?;
    let reference_segments = load_lines(&store, &job.name(CollectionKind::ReferenceHarmonized))?;
    let mut written = 0;
    for kind in CollectionKind::DERIVED {
        let name = job.name(kind);
        if !store.contains(&name)? {
            continue;
        }
        let stored = store.load(&name)?;
        if let Some(features) = export::stored_to_geojson(&stored, &reference_segments)? {
            let path = args.out_dir.join(format!("{name}.geojson"));
            export::write_geojson(&path, features)?;
            written += 1;
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("Wrote {} collections to {}", written, args.out_dir.display());
    Ok(())
}
