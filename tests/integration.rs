use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn shuttle_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shuttle");
    path
}

fn run_shuttle(cwd: &Path, args: &[&str]) -> Output {
    let binary = shuttle_binary();
    Command::new(&binary)
        .current_dir(cwd)
        .args(args)
        .args(["--progress", "off"])
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shuttle binary at {:?}: {}", binary, e))
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "shuttle failed: stdout={}, stderr={}",
        stdout_of(output),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_rows(path: &Path, rows: usize) {
    let mut body = String::from("id,name,score\n");
    for i in 0..rows {
        body.push_str(&format!("{},name-{:04},{}\n", i, i, i * 7 % 100));
    }
    fs::write(path, body).unwrap();
}

fn chunk_files(dir: &Path) -> Vec<PathBuf> {
    let mut chunks: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("_chunk_"))
        })
        .collect();
    chunks.sort();
    chunks
}

fn data_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

fn merge_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a_truth.csv"), "id\n1\n2\n").unwrap();
    fs::write(tmp.path().join("B.csv"), "id\n3\n4\n5\n").unwrap();
    fs::write(tmp.path().join("ground_truth_TEST.csv"), "id\n6\n").unwrap();
    tmp
}

#[test]
fn test_split_by_rows() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("data.csv");
    write_rows(&input, 250);

    let output = run_shuttle(tmp.path(), &["split", "data.csv", "--rows", "100"]);
    assert_success(&output);
    assert!(stdout_of(&output).contains("chunks: 3"));

    let chunks = chunk_files(tmp.path());
    let names: Vec<String> = chunks
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["data_chunk_001.csv", "data_chunk_002.csv", "data_chunk_003.csv"]
    );
    let counts: Vec<usize> = chunks.iter().map(|c| data_lines(c).len()).collect();
    assert_eq!(counts, vec![100, 100, 50]);

    let first = fs::read_to_string(&chunks[0]).unwrap();
    assert!(first.starts_with("id,name,score\r\n"));
}

#[test]
fn test_split_by_size_preserves_rows() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("big.csv");
    write_rows(&input, 1000);
    let out_dir = tmp.path().join("chunks");

    let output = run_shuttle(
        tmp.path(),
        &[
            "split",
            "big.csv",
            "--size-mb",
            "0.005",
            "--output-dir",
            out_dir.to_str().unwrap(),
        ],
    );
    assert_success(&output);

    let chunks = chunk_files(&out_dir);
    assert!(chunks.len() > 1, "expected several chunks, got {:?}", chunks);

    let mut rows = Vec::new();
    for chunk in &chunks {
        rows.extend(data_lines(chunk));
    }
    assert_eq!(rows.len(), 1000);
    assert_eq!(rows[0].trim_end(), "0,name-0000,0");
    assert_eq!(rows[999].trim_end(), "999,name-0999,93");

    // No probe files are left behind.
    let leftovers: Vec<_> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "probe files left: {:?}", leftovers);
}

#[test]
fn test_split_missing_input_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run_shuttle(tmp.path(), &["split", "nope.csv", "--rows", "10"]);
    assert!(!output.status.success());
    assert!(chunk_files(tmp.path()).is_empty());
}

#[test]
fn test_split_requires_threshold() {
    let tmp = TempDir::new().unwrap();
    write_rows(&tmp.path().join("data.csv"), 5);
    let output = run_shuttle(tmp.path(), &["split", "data.csv"]);
    assert!(!output.status.success());
}

#[test]
fn test_estimate_prints_rows() {
    let tmp = TempDir::new().unwrap();
    write_rows(&tmp.path().join("data.csv"), 500);
    let output = run_shuttle(tmp.path(), &["estimate", "data.csv", "--size-mb", "1"]);
    assert_success(&output);
    assert!(stdout_of(&output).contains("rows per 1MB chunk"));
}

#[test]
fn test_merge_local_example() {
    let tmp = merge_tree();
    let root = tmp.path().to_str().unwrap();

    let output = run_shuttle(tmp.path(), &["merge", root]);
    assert_success(&output);
    assert!(stdout_of(&output).contains("ok"));

    assert_eq!(
        fs::read_to_string(tmp.path().join("merged_truth.csv")).unwrap(),
        "id\n1\n2\n6\n"
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("merged_other.csv")).unwrap(),
        "id\n3\n4\n5\n"
    );
}

#[test]
fn test_rerun_with_metadata_is_stable() {
    let tmp = merge_tree();
    let root = tmp.path().to_str().unwrap();
    let truth = tmp.path().join("merged_truth.csv");

    assert_success(&run_shuttle(tmp.path(), &["merge", root, "--metadata"]));
    let first = fs::read_to_string(&truth).unwrap();
    assert!(first.starts_with("id,source_file,source_path\n"));

    assert_success(&run_shuttle(tmp.path(), &["merge", root, "--metadata"]));
    let second = fs::read_to_string(&truth).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_merging_a_previous_output_keeps_columns() {
    let tmp = merge_tree();
    let root = tmp.path().to_str().unwrap();

    // Timestamped outputs are not this run's fixed names, so the next run
    // enumerates them as ordinary inputs.
    assert_success(&run_shuttle(
        tmp.path(),
        &["merge", root, "--metadata", "--timestamped"],
    ));
    let previous: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("merged_truth_"))
        .collect();
    assert_eq!(previous.len(), 1, "expected one timestamped output");
    let previous = &previous[0];

    assert_success(&run_shuttle(tmp.path(), &["merge", root, "--metadata"]));
    let merged = fs::read_to_string(tmp.path().join("merged_truth.csv")).unwrap();
    let mut lines = merged.lines();
    assert_eq!(lines.next(), Some("id,source_file,source_path"));

    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 6);
    assert!(
        rows.iter().all(|r| r.split(',').count() == 3),
        "column count drifted: {:?}",
        rows
    );
    let from_previous = rows
        .iter()
        .filter(|r| r.contains(previous.as_str()))
        .count();
    assert_eq!(from_previous, 3);
}

#[test]
fn test_merge_dry_run_json() {
    let tmp = merge_tree();
    let root = tmp.path().to_str().unwrap();

    let output = run_shuttle(tmp.path(), &["merge", root, "--dry-run", "--json"]);
    assert_success(&output);
    let report: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(report["total_files"], 3);
    assert_eq!(report["plans"][0]["files"].as_array().unwrap().len(), 2);
    assert!(!tmp.path().join("merged_truth.csv").exists());
}

#[test]
fn test_merge_all_failed_group_exits_2() {
    let tmp = merge_tree();
    fs::write(tmp.path().join("a_truth.csv"), "").unwrap();
    fs::write(tmp.path().join("ground_truth_TEST.csv"), "").unwrap();
    let root = tmp.path().to_str().unwrap();

    let output = run_shuttle(tmp.path(), &["merge", root]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout_of(&output).contains("partial failure"));
    assert!(!tmp.path().join("merged_truth.csv").exists());
    assert!(tmp.path().join("merged_other.csv").exists());
}

#[test]
fn test_merge_upload_to_needs_remote_scope() {
    let tmp = merge_tree();
    let root = tmp.path().to_str().unwrap();
    let output = run_shuttle(tmp.path(), &["merge", root, "--upload-to", "merged"]);
    assert!(!output.status.success());
}

#[test]
fn test_config_file_marker() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("run_gold.csv"), "id\n1\n").unwrap();
    fs::write(tmp.path().join("run_truth.csv"), "id\n2\n").unwrap();
    fs::write(
        tmp.path().join("shuttle.toml"),
        "[merge]\nmarker = \"gold\"\ninclude_globs = [\"*.csv\"]\n",
    )
    .unwrap();
    let root = tmp.path().to_str().unwrap();

    assert_success(&run_shuttle(tmp.path(), &["merge", root]));
    assert_eq!(
        fs::read_to_string(tmp.path().join("merged_truth.csv")).unwrap(),
        "id\n1\n"
    );
}
