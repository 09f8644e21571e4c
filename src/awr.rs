use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime, Timelike};
use colored::Colorize;
use linked_hash_map::LinkedHashMap;
use scraper::{ElementRef, Html, Selector};
use walkdir::WalkDir;

use crate::error::{AwrError, Result};
use crate::registry::{normalize_caption, TableRegistry};
use crate::staticdata::*;

/// Destination file name -> CSV lines (header first).
pub type ParsedOutput = LinkedHashMap<String, Vec<String>>;

const SNAPSHOT_TIME_FORMAT: &str = "%d-%b-%y %H:%M:%S";

struct Selectors {
	table: Selector,
	tr: Selector,
	th: Selector,
	td: Selector,
	a: Selector,
}

fn selector(css: &str) -> Result<Selector> {
	Selector::parse(css).map_err(|_| AwrError::Selector(css.to_string()))
}

impl Selectors {
	fn new() -> Result<Self> {
		Ok(Selectors {
			table: selector("table")?,
			tr: selector("tr")?,
			th: selector("th")?,
			td: selector("td")?,
			a: selector("a")?,
		})
	}
}

/// State that lives for the whole run: output tables and hosts seen so far.
#[derive(Default)]
struct RunState {
	output: ParsedOutput,
	hosts: LinkedHashMap<String, String>,
}

impl RunState {
	fn finish(mut self) -> ParsedOutput {
		let mut host_lines: Vec<String> = Vec::new();
		if !self.hosts.is_empty() {
			host_lines.push(HOST_INFO_HEADER.to_string());
			host_lines.extend(self.hosts.into_iter().map(|(_, line)| line));
		}
		self.output.insert(HOST_INFO_FILE.to_string(), host_lines);
		self.output
	}
}

/// State of one report file: identity fields and the row prefix built from them.
#[derive(Default)]
struct ReportState {
	identity: Vec<String>,
	instance_passes: usize,
	base: Option<String>,
}

/// Extracts registered sections of AWR HTML reports into CSV lines.
pub struct AwrParser {
	registry: TableRegistry,
	selectors: Selectors,
}

impl AwrParser {
	pub fn new(registry: TableRegistry) -> Result<Self> {
		Ok(AwrParser { registry, selectors: Selectors::new()? })
	}

	/// Parses every file in order. The first failing file stops the run.
	pub fn parse(&self, files: &[PathBuf]) -> Result<ParsedOutput> {
		println!("{}", "\n==== PARSING AWR REPORTS ===".bright_cyan());
		let mut run = RunState::default();
		for (parsed, path) in files.iter().enumerate() {
			let html = fs::read_to_string(path).map_err(|e| AwrError::io(path, e))?;
			debug_note!("parsing {}", path.display());
			self.parse_document(&path.display().to_string(), &html, &mut run)?;
			print!("\rNumber of reports parsed: {}", parsed + 1);
			let _ = io::stdout().flush();
		}
		println!();
		Ok(run.finish())
	}

	/// Same as `parse`, for reports already held in memory as (name, html).
	pub fn parse_sources<'a>(&self, sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<ParsedOutput> {
		let mut run = RunState::default();
		for (name, html) in sources {
			self.parse_document(name, html, &mut run)?;
		}
		Ok(run.finish())
	}

	fn parse_document(&self, file: &str, html: &str, run: &mut RunState) -> Result<()> {
		let doc = Html::parse_document(html);
		let mut report = ReportState::default();

		for table in doc.select(&self.selectors.table) {
			let section = match table.value().attr("summary") {
				Some(summary) => normalize_caption(summary),
				None => continue,
			};
			if section.is_empty() {
				continue;
			}

			if section == INSTANCE_INFO_CAPTION {
				self.instance_info(table, &mut report);
			} else if section == SNAPSHOT_INFO_CAPTION {
				self.snapshot_info(file, table, &mut report)?;
			} else if section == HOST_INFO_CAPTION {
				self.host_info(table, run);
			} else if let Some(target) = self.registry.lookup(&section) {
				let lines = run.output.entry(target.destination.clone()).or_insert_with(Vec::new);
				for row in table.select(&self.selectors.tr) {
					if lines.is_empty() {
						let columns = match &target.header {
							Some(header) => header.clone(),
							None => row.select(&self.selectors.th).map(|th| self.cell_text(th)).collect::<Vec<_>>().join(","),
						};
						lines.push(format!("{}{}", system_info_header(), columns));
					}

					let cells: Vec<String> = row.select(&self.selectors.td).map(|td| self.cell_text(td)).collect();
					if cells.is_empty() {
						continue;
					}
					let base = report.base.as_ref().ok_or_else(|| AwrError::MissingBase {
						file: file.to_string(),
						section: section.clone(),
					})?;
					lines.push(format!("{}{}", base, cells.join(",")));
				}
			}
		}
		Ok(())
	}

	// The instance table comes twice per report: DB name/id/unique name/role
	// first, then instance name and number.
	fn instance_info(&self, table: ElementRef, report: &mut ReportState) {
		let cells = table.select(&self.selectors.td).map(|td| self.cell_text(td));
		if report.instance_passes % 2 == 0 {
			report.identity = cells.take(4).collect();
			report.base = None;
		} else {
			report.identity.truncate(4);
			report.identity.extend(cells.take(2));
		}
		report.instance_passes += 1;
	}

	// Begin and end snap rows, third column.
	fn snapshot_info(&self, file: &str, table: ElementRef, report: &mut ReportState) -> Result<()> {
		if report.identity.len() != IDENTITY_COLUMNS.len() {
			return Err(AwrError::MissingBase { file: file.to_string(), section: SNAPSHOT_INFO_CAPTION.to_string() });
		}

		let mut fields = report.identity.clone();
		let mut snaps = 0;
		for row in table.select(&self.selectors.tr).skip(1).take(2) {
			let snap = row
				.select(&self.selectors.td)
				.nth(2)
				.ok_or_else(|| AwrError::MalformedSnapshot { file: file.to_string() })?;
			let value = snap.text().collect::<String>();
			let value = value.trim();
			let st = NaiveDateTime::parse_from_str(value, SNAPSHOT_TIME_FORMAT).map_err(|source| {
				AwrError::SnapshotTime { file: file.to_string(), value: value.to_string(), source }
			})?;
			fields.extend(
				[st.year(), st.month() as i32, st.day() as i32, st.hour() as i32, st.minute() as i32, st.second() as i32]
					.iter()
					.map(|v| v.to_string()),
			);
			snaps += 1;
		}
		if snaps != 2 {
			return Err(AwrError::MalformedSnapshot { file: file.to_string() });
		}

		report.base = Some(format!("{},", fields.join(",")));
		Ok(())
	}

	fn host_info(&self, table: ElementRef, run: &mut RunState) {
		let cells: Vec<String> = table.select(&self.selectors.td).map(|td| self.cell_text(td)).collect();
		if let Some(host) = cells.first() {
			if !run.hosts.contains_key(host) {
				run.hosts.insert(host.clone(), cells.join(","));
			}
		}
	}

	/// Link text wins over the cell text (SQL Ids are rendered as links).
	/// The result never contains commas or colons.
	fn cell_text(&self, cell: ElementRef) -> String {
		let text = match cell.select(&self.selectors.a).last() {
			Some(link) => link.text().collect::<String>(),
			None => cell.text().collect::<String>(),
		};
		text.split_whitespace()
			.collect::<Vec<_>>()
			.join(" ")
			.replace("&#160;", "")
			.replace('\u{a0}', "")
			.replace([',', ':'], "")
	}
}

/// HTML reports under `dir`, sorted by path. Symlinked directories are not
/// entered, so a link cycle can't return the same report twice.
pub fn find_reports(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
	let mut walker = WalkDir::new(dir).follow_links(false);
	if !recursive {
		walker = walker.max_depth(1);
	}

	let mut reports: Vec<PathBuf> = Vec::new();
	for entry in walker {
		let entry = entry.map_err(|e| {
			let path = e.path().unwrap_or(dir).to_path_buf();
			AwrError::io(path, e.into())
		})?;
		let path = entry.path();
		// a link to a single report still counts
		if path.is_file() && path.extension().map_or(false, |ext| ext == "html") {
			reports.push(path.to_path_buf());
		}
	}
	reports.sort();
	debug_note!("{} reports found under {}", reports.len(), dir.display());
	Ok(reports)
}
