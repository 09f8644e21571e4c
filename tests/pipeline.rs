use std::fs;
use std::path::Path;

use awr_miner::analysis::{Analysis, AnalysisSettings};
use awr_miner::anomalies::OutlierMethod;
use awr_miner::awr::{find_reports, AwrParser};
use awr_miner::processors::{MetricProcessor, TableProcessor};
use awr_miner::registry::TableRegistry;
use awr_miner::staticdata::*;
use awr_miner::table::{parse_timestamp, RecordTable};
use awr_miner::writer::{write_tables, WriteMode};

const DB_TIME: [f64; 4] = [10.0, 12.0, 50.0, 11.0];
const HARD_PARSES: [f64; 4] = [1.0, 1.0, 9.0, 2.0];

fn table(caption: &str, header: &[&str], rows: &[Vec<String>]) -> String {
    let mut html = format!("<table summary=\"{caption}\">\n<tr>");
    for h in header {
        html.push_str(&format!("<th>{h}</th>"));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// One AWR report of instance `inst` covering snapshot `snap` (10 minutes each).
fn report(inst: u32, snap: usize) -> String {
    let begin = format!("15-Mar-24 10:{}0:00", snap);
    let end = format!("15-Mar-24 10:{}0:00", snap + 1);
    let spike = snap == 2;
    let sql_id = if spike { format!("spike{inst}") } else { format!("steady{inst}") };
    let sql_link = format!("<a href=\"#{sql_id}\">{sql_id}</a>");
    let cpu = if spike { "300" } else { "20" };

    let mut html = String::from("<html><body>\n");
    html += &table(INSTANCE_INFO_CAPTION, &["DB Name", "DB Id", "Unique Name", "Role"], &[cells(&["RAC", "4,242", "rac_site1", "PRIMARY"])]);
    html += &table(INSTANCE_INFO_CAPTION, &["Instance", "Inst Num"], &[vec![format!("rac{inst}"), inst.to_string()]]);
    html += &table(
        HOST_INFO_CAPTION,
        &["Host Name", "Platform", "CPUs", "Cores", "Sockets", "Memory (GB)"],
        &[vec![format!("node{inst}"), "Linux x86 64-bit".into(), "8".into(), "4".into(), "1".into(), "64".into()]],
    );
    html += &table(
        SNAPSHOT_INFO_CAPTION,
        &["", "Snap Id", "Snap Time", "Sessions"],
        &[vec!["Begin Snap:".into(), "1".into(), begin, "40".into()], vec!["End Snap:".into(), "2".into(), end, "41".into()]],
    );
    html += &table(
        "This table displays load profile",
        &["", "Per Second", "Per Transaction", "Per Exec", "Per Call"],
        &[
            vec!["DB Time(s):".into(), DB_TIME[snap].to_string(), "0.1".into(), "0.00".into(), "0.01".into()],
            vec!["Hard parses (SQL):".into(), HARD_PARSES[snap].to_string(), "0.0".into(), "".into(), "".into()],
        ],
    );
    html += &table(
        "This table displays foreground wait class statistics",
        &["Wait Class", "Waits", "Total Wait Time (sec)", "% DB time"],
        &[cells(&["DB CPU", "", cpu, "70"]), cells(&["User I/O", "1,000", "15", "20"])],
    );
    html += &table(
        "This table displays top 10 wait events by total wait time",
        &["Event", "Waits", "Total Wait Time (sec)", "Wait Class"],
        &[cells(&["db file sequential read", "1,000", "15", "User I/O"])],
    );
    html += &table(
        "This table displays top SQL by CPU time",
        &["CPU Time (s)", "Executions", "SQL Id", "SQL Text"],
        &[vec![cpu.into(), "5".into(), sql_link.clone(), "select * from orders".into()], vec!["1".into(), "9".into(), "<a href=\"#tiny\">tiny</a>".into(), "select 1 from dual".into()]],
    );
    html += &table(
        "This table displays top SQL by elapsed time",
        &["Elapsed Time (s)", "Executions", "SQL Id"],
        &[vec![cpu.into(), "5".into(), sql_link.clone()]],
    );
    html += &table(
        "This table displays top SQL by user I/O time",
        &["User I/O Time (s)", "Executions", "SQL Id"],
        &[vec!["3".into(), "5".into(), sql_link]],
    );
    html += &table(
        "This table displays tablespace IO statistics",
        &["Tablespace", "Reads", "Av Rds/s", "Writes", "Writes avg/s"],
        &[cells(&["SYSAUX", "10", "0", "5", "0"]), cells(&["USERS", "6,000", "10", "600", "1"])],
    );
    html.push_str("</body></html>\n");
    html
}

fn write_reports(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for inst in 1..=2 {
        let html: String = (0..4).map(|snap| report(inst, snap)).collect();
        fs::write(dir.join(format!("rac_{inst}.html")), html).unwrap();
    }
}

fn extract(reports: &Path, parsed: &Path, mode: WriteMode) {
    let files = find_reports(reports, false).unwrap();
    assert_eq!(files.len(), 2);
    let output = AwrParser::new(TableRegistry::builtin()).unwrap().parse(&files).unwrap();
    write_tables(&output, mode, parsed).unwrap();
}

#[test]
fn two_instances_from_html_to_anomaly_bundles() {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let parsed = dir.path().join("parsed");
    write_reports(&reports);
    extract(&reports, &parsed, WriteMode::New);

    // 2 instances x 4 snapshots x 2 load profile rows
    let load_profile = RecordTable::read_table(&parsed.join(LOAD_PROFILE_FILE)).unwrap();
    assert_eq!(load_profile.len(), 16);
    let parts = load_profile.split_by_instance().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[&1].len(), 8);
    assert_eq!(parts[&2].len(), 8);

    let hosts = fs::read_to_string(parsed.join(HOST_INFO_FILE)).unwrap();
    assert_eq!(hosts.lines().count(), 3);

    let analysis = Analysis::load(&parsed, AnalysisSettings::default()).unwrap();
    assert_eq!(analysis.instances(), 2);

    let spike = parse_timestamp("2024-03-15 10:20:00").unwrap();
    for inst in 1..=2 {
        let wide = analysis.aggregated(inst).unwrap();
        assert_eq!(wide.nrows(), 4);
        assert_eq!(wide.columns, vec!["DB Time(s)", "Hard parses (SQL)"]);
        assert_eq!(wide.column("DB Time(s)").unwrap().to_vec(), DB_TIME.to_vec());

        for metric in ["DB Time(s)", "Hard parses (SQL)"] {
            let peaks = analysis.anomalies(inst, metric).unwrap();
            assert_eq!(peaks.index, vec![spike], "instance {inst} metric {metric}");
        }

        let wait_classes = analysis.wait_classes().unwrap().aggregated(inst).unwrap();
        assert_eq!(wait_classes.nrows(), 4);
        assert_eq!(wait_classes.columns.len(), WAIT_CLASSES.len());
    }

    let report = analysis.report(&["DB Time(s)", "Hard parses (SQL)", "Logons"]);
    assert_eq!(report.instances.len(), 2);
    for inst in &report.instances {
        assert_eq!(inst.metrics.len(), 2);
        let bundle = &inst.metrics[0].bundles[0];
        assert_eq!(bundle.range.start, spike);
        assert_eq!(bundle.top_cpu.text_column(SQL_ID).unwrap()[0], format!("spike{}", inst.instance));
        assert_eq!(bundle.wait_class_pct.len(), 2);
        assert_eq!(bundle.foreground_events.len(), 1);
        assert_eq!(inst.most_used_tablespaces, vec!["USERS", "SYSAUX"]);
        assert_eq!(inst.sql_appearances[0].sql_id, format!("steady{}", inst.instance));
    }
    assert_eq!(report.databases.len(), 2);
    assert_eq!(report.hosts.len(), 2);

    let json_path = parsed.join("awr_report.json");
    report.write_json(&json_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["instances"][1]["metrics"][0]["peaks"]["rows"][0][0], 50.0);
}

#[test]
fn appending_a_second_run_keeps_one_header() {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let parsed = dir.path().join("parsed");
    write_reports(&reports);
    extract(&reports, &parsed, WriteMode::Append);
    extract(&reports, &parsed, WriteMode::Append);

    let content = fs::read_to_string(parsed.join(SQL_CPU_FILE)).unwrap();
    assert_eq!(content.lines().filter(|l| l.starts_with("DB_NAME,")).count(), 1);
    assert_eq!(RecordTable::read_table(&parsed.join(SQL_CPU_FILE)).unwrap().len(), 2 * 2 * 4 * 2);

    extract(&reports, &parsed, WriteMode::New);
    assert_eq!(RecordTable::read_table(&parsed.join(SQL_CPU_FILE)).unwrap().len(), 2 * 4 * 2);
}

#[test]
fn zscore_detector_finds_the_same_spike() {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let parsed = dir.path().join("parsed");
    write_reports(&reports);
    extract(&reports, &parsed, WriteMode::New);

    let settings = AnalysisSettings { method: "zscore".parse::<OutlierMethod>().unwrap(), ..AnalysisSettings::default() };
    let analysis = Analysis::load(&parsed, settings).unwrap();
    let lp = analysis.load_profile();
    assert_eq!(lp.name(), LOAD_PROFILE_FILE);
    let peaks = lp.find_peaks(Some("DB Time(s)"), &settings.method);
    assert_eq!(peaks.len(), 2);
    assert!(peaks.values().all(|p| p.as_ref().map(|p| p.nrows()) == Some(1)));
}
