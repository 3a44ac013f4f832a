use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use whisperdb::parse::{parse_archive_spec, parse_point_spec};
use whisperdb::{Aggregation, Database, Mapping, OpenFlags};

#[derive(Parser)]
#[command(name = "whisperdb", version, about = "Fixed-size circular time-series database files")]
struct Cli {
    /// Storage backend used to access the database
    #[arg(long, global = true, value_enum, default_value_t = MappingArg::Mmap)]
    mapping: MappingArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new database
    Create {
        path: PathBuf,
        /// Archive specs, finest first, e.g. `1m:1440 1h:720`
        #[arg(required = true)]
        archives: Vec<String>,
        /// Aggregation used when rolling writes into coarser archives
        #[arg(long, value_enum, default_value_t = AggregationArg::Average)]
        aggregation: AggregationArg,
        /// Fraction of valid points required for an aggregate to be kept
        #[arg(long, default_value_t = 0.5)]
        xff: f32,
    },
    /// Insert samples
    Update {
        path: PathBuf,
        /// Point specs, e.g. `1316163338:4.2` (timestamp 0 means "now")
        #[arg(required = true)]
        points: Vec<String>,
    },
    /// Print the header, the archive table and the stored points
    Dump {
        path: PathBuf,
        #[arg(requires = "until")]
        from: Option<u32>,
        #[arg(requires = "from")]
        until: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MappingArg {
    File,
    Mmap,
}

impl From<MappingArg> for Mapping {
    fn from(arg: MappingArg) -> Mapping {
        match arg {
            MappingArg::File => Mapping::File,
            MappingArg::Mmap => Mapping::Mmap,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    Average,
    Sum,
    Last,
    Max,
    Min,
}

impl From<AggregationArg> for Aggregation {
    fn from(arg: AggregationArg) -> Aggregation {
        match arg {
            AggregationArg::Average => Aggregation::Average,
            AggregationArg::Sum => Aggregation::Sum,
            AggregationArg::Last => Aggregation::Last,
            AggregationArg::Max => Aggregation::Max,
            AggregationArg::Min => Aggregation::Min,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("whisperdb: {message}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mapping = cli.mapping.into();
    match cli.command {
        Command::Create {
            path,
            archives,
            aggregation,
            xff,
        } => {
            let mut specs = Vec::with_capacity(archives.len());
            for input in &archives {
                specs.push(
                    parse_archive_spec(input)
                        .ok_or_else(|| format!("invalid archive spec: {input}"))?,
                );
            }
            Database::create(&path, &specs, aggregation.into(), xff, mapping)
                .map_err(|e| e.to_string())
        }
        Command::Update { path, points } => {
            let mut inputs = Vec::with_capacity(points.len());
            for input in &points {
                inputs.push(
                    parse_point_spec(input).ok_or_else(|| format!("invalid point spec: {input}"))?,
                );
            }
            let mut db = Database::new();
            db.open(&path, mapping, OpenFlags::READ | OpenFlags::WRITE)
                .map_err(|e| e.to_string())?;
            db.update_many(&inputs).map_err(|e| e.to_string())?;
            db.close().map_err(|e| e.to_string())
        }
        Command::Dump { path, from, until } => {
            let mut db = Database::new();
            db.open(&path, mapping, OpenFlags::READ)
                .map_err(|e| e.to_string())?;
            dump(&mut db, from, until).map_err(|e| e.to_string())?;
            db.close().map_err(|e| e.to_string())
        }
    }
}

fn dump(db: &mut Database, from: Option<u32>, until: Option<u32>) -> whisperdb::Result<()> {
    let meta = *db.metadata();
    println!("Meta data:");
    println!("  aggregation = {}", meta.aggregation.to_wire());
    println!("  max_retention = {}", meta.max_retention);
    println!("  xff = {}", meta.x_files_factor);
    println!("  archives_count = {}", meta.archives_count);
    println!();

    let archives = db.archives().to_vec();
    for (index, archive) in archives.iter().enumerate() {
        println!("Archive #{index} info:");
        println!("  offset = {}", archive.offset);
        println!("  seconds_per_point = {}", archive.seconds_per_point);
        println!("  points = {}", archive.points);
        println!("  retention = {}", archive.retention());
        println!();

        let points = match (from, until) {
            (Some(from), Some(until)) => db.fetch_time_points(index, from, until)?,
            _ => db.load_points(index, 0, archive.points)?,
        };

        println!("Archive #{index} data:");
        for (slot, point) in points.iter().enumerate() {
            println!("{slot}: {}, {:.4}", point.timestamp, point.value);
        }
        println!();
    }
    Ok(())
}
