use std::path::PathBuf;
use std::process;

use clap::Parser;
use colored::*;

use awr_miner::analysis::{Analysis, AnalysisSettings};
use awr_miner::anomalies::OutlierMethod;
use awr_miner::awr::{find_reports, AwrParser};
use awr_miner::registry::TableRegistry;
use awr_miner::staticdata::DEFAULT_METRICS;
use awr_miner::table::TimeRange;
use awr_miner::writer::{write_tables, WriteMode};
use awr_miner::{debug_note, make_notes, Result};

///This tool extracts tables from Oracle AWR reports (HTML) into flat CSV files, one per report section,
///and looks for anomalous snapshots in the load profile of every database instance.
///For each anomaly it collects the top SQL, wait classes, foreground events and tablespace IO of that snapshot.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Args {
	///JSON file mapping table captions to [output file, header or null]. Built-in tables are used if not given
	#[clap(long)]
	tables: Option<PathBuf>,

	///Write mode for parsed tables: append or new
	#[clap(short, long, default_value="append")]
	mode: String,

	///Directory with AWR reports (*.html)
	#[clap(short, long, default_value="awr_reports")]
	input_dir: PathBuf,

	///Directory for parsed tables and the analysis
	#[clap(short, long, default_value="parsed")]
	output_dir: PathBuf,

	///Look for reports in subdirectories too
	#[clap(short, long)]
	recursive: bool,

	///Set to false to analyse already parsed tables without reading reports again
	#[clap(long, parse(try_from_str), default_value="true")]
	parse: bool,

	///Load profile metrics to look for anomalies in
	#[clap(long, multiple_values=true)]
	metrics: Vec<String>,

	///Outlier detection method: iqr or zscore
	#[clap(long, default_value="iqr")]
	method: OutlierMethod,

	///IQR multiplier (k) or z-score threshold, depending on the method
	#[clap(long)]
	sensitivity: Option<f64>,

	///Number of top SQL statements collected for every anomaly
	#[clap(short='n', long, default_value_t=10)]
	top_n: usize,

	///Analyse only snapshots starting at or after this time (YYYY-MM-DD HH:MM[:SS])
	#[clap(long, requires="end")]
	begin: Option<String>,

	///Analyse only snapshots starting at or before this time (YYYY-MM-DD HH:MM[:SS])
	#[clap(long, requires="begin")]
	end: Option<String>,

	///Where to write the JSON analysis. Default is <output-dir>/awr_report.json
	#[clap(long)]
	report: Option<PathBuf>,

	///Should I be quiet? This mode suppresses terminal output but still writes to log file
	#[clap(short, long)]
	quiet: bool,
}

fn extract(args: &Args) -> Result<()> {
	let registry = match &args.tables {
		Some(path) => TableRegistry::from_json_file(path)?,
		None => TableRegistry::builtin(),
	};
	let mode = WriteMode::from_str_lossy(&args.mode);

	let files = find_reports(&args.input_dir, args.recursive)?;
	if files.is_empty() {
		eprintln!("{} no *.html reports in {}", "Warning!".bright_yellow(), args.input_dir.display());
		return Ok(());
	}

	let parser = AwrParser::new(registry)?;
	let output = parser.parse(&files)?;

	println!("{}", "\n==== WRITING TABLES ===".bright_cyan());
	write_tables(&output, mode, &args.output_dir)?;
	Ok(())
}

fn analyse(args: &Args) -> Result<()> {
	let range = match (&args.begin, &args.end) {
		(Some(begin), Some(end)) => Some(TimeRange::parse(begin, end)?),
		_ => None,
	};
	let method = match args.sensitivity {
		Some(s) => args.method.with_sensitivity(s),
		None => args.method,
	};
	let settings = AnalysisSettings { method, top_n: args.top_n, range };

	let metrics: Vec<&str> = if args.metrics.is_empty() {
		DEFAULT_METRICS.to_vec()
	} else {
		args.metrics.iter().map(String::as_str).collect()
	};

	let analysis = Analysis::load(&args.output_dir, settings)?;
	let report = analysis.report(&metrics);

	let report_path = args.report.clone().unwrap_or_else(|| args.output_dir.join("awr_report.json"));
	report.write_json(&report_path)?;

	let logfile = report_path.with_extension("txt");
	make_notes!(&logfile, args.quiet, 1, "AWR-MINER {} analysis of {}\n", env!("CARGO_PKG_VERSION"), args.output_dir.display());
	report.print_summary(&logfile, args.quiet);
	println!("\n{} {}", "Analysis written to".bright_green(), report_path.display());
	Ok(())
}

fn main() {
	let args = Args::parse();
	println!("{}{}", "AWR-MINER v".bright_yellow(), env!("CARGO_PKG_VERSION").bright_yellow());
	debug_note!("{:?}", args);

	if args.parse {
		if let Err(e) = extract(&args) {
			eprintln!("\n{}: {}", "Error".bright_red(), e);
			process::exit(1);
		}
	}

	if let Err(e) = analyse(&args) {
		eprintln!("\n{}: {}", "Error".bright_red(), e);
		process::exit(1);
	}
}
