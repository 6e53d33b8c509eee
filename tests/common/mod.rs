#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_sto") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "sto.exe" } else { "sto" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve sto binary path for integration test"),
    }
}

/// Extra process setup for one CLI invocation.
#[derive(Default)]
pub struct CaseEnv<'a> {
    pub cwd: Option<&'a Path>,
    /// Prepended to `PATH` so fake `kubectl`/`az` shadow real ones.
    pub path_prefix: Option<&'a Path>,
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with(case_name, args, &CaseEnv::default())
}

pub fn run_cli_case_with(case_name: &str, args: &[&str], env: &CaseEnv<'_>) -> CmdResult {
    let root = std::env::temp_dir().join("sto-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("STO_OUTPUT_FORMAT");
    for var in [
        "STO_CLUSTER_NAME",
        "CLUSTER_NAME",
        "STO_KUBECONFIG",
        "STO_RESOURCE_GROUP",
        "RESOURCE_GROUP",
        "STO_LOCATION",
        "LOCATION",
        "STO_REPORTS_OUTPUT_DIR",
        "STO_POLL_INTERVAL_SECONDS",
        "STO_REMEDIATION_ENABLED",
    ] {
        command.env_remove(var);
    }
    if let Some(cwd) = env.cwd {
        command.current_dir(cwd);
    }
    if let Some(prefix) = env.path_prefix {
        let inherited = std::env::var("PATH").unwrap_or_default();
        command.env("PATH", format!("{}:{inherited}", prefix.display()));
    }
    let output = command.output().expect("execute sto command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── fixtures ────────────────────

#[cfg(unix)]
pub fn write_executable(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create script dir");
    }
    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Bash suite whose entrypoint writes one result file per `(id, status)`.
#[cfg(unix)]
pub fn bash_suite(dir: &Path, cases: &[(&str, &str)], exit_code: i32) {
    let mut body = String::from("mkdir -p results\n");
    for (id, status) in cases {
        body.push_str(&format!(
            "cat > results/{id}.json <<'JSON'\n{{\"test_id\":\"{id}\",\"test_name\":\"{id} case\",\"category\":\"eviction\",\"status\":\"{status}\",\"duration_seconds\":1.5}}\nJSON\n"
        ));
    }
    body.push_str(&format!("exit {exit_code}\n"));
    write_executable(&dir.join("run-all-tests.sh"), &body);
}

/// Python suite with a fake venv whose `pytest` writes a json-report document.
#[cfg(unix)]
pub fn python_suite(dir: &Path, cases: &[(&str, &str)], exit_code: i32) {
    let bin = dir.join("venv").join("bin");
    fs::create_dir_all(&bin).expect("create venv");
    fs::write(bin.join("activate"), "").expect("write activate");

    let tests: Vec<String> = cases
        .iter()
        .map(|(name, outcome)| {
            format!(
                "{{\"nodeid\":\"categories/02-pdb/test_pdb.py::{name}\",\"outcome\":\"{outcome}\",\"call\":{{\"duration\":0.5,\"longrepr\":\"AssertionError: {name}\"}}}}"
            )
        })
        .collect();
    let body = format!(
        "cat > results.json <<'JSON'\n{{\"tests\":[{}]}}\nJSON\nexit {exit_code}\n",
        tests.join(",")
    );
    write_executable(&bin.join("pytest"), &body);
}

/// Fake `kubectl` answering the read calls a run makes against an empty cluster.
#[cfg(unix)]
pub fn fake_kubectl(bin_dir: &Path, context: Option<&str>) {
    let current_context = match context {
        Some(name) => format!("echo {name}"),
        None => "echo 'error: current-context is not set' >&2; exit 1".to_string(),
    };
    let body = format!(
        r#"while [ "$1" = "--kubeconfig" ]; do shift 2; done
case "$1 $2" in
  "config current-context") {current_context} ;;
  "get nodes") echo '{{"items":[{{"metadata":{{"name":"aks-spot-0","labels":{{"agentpool":"spot","kubernetes.azure.com/scalesetpriority":"spot"}}}},"status":{{"conditions":[{{"type":"Ready","status":"True"}}]}}}}]}}' ;;
  "get pods") echo '{{"items":[]}}' ;;
  "get events") echo '{{"items":[]}}' ;;
  *) echo "unsupported: $*" >&2; exit 1 ;;
esac"#
    );
    write_executable(&bin_dir.join("kubectl"), &body);
}

/// `sto.toml` pointing every path at `root`.
pub fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config = format!(
        r#"[cluster]
timeout_seconds = 30

[test_suites.terratest]
enabled = false

[test_suites.bash]
working_dir = "{bash}"
timeout_minutes = 1

[test_suites.python]
working_dir = "{python}"
timeout_minutes = 1

[remediation]
enabled = false

[monitoring.eviction_rate]
poll_interval_seconds = 1

[reports]
output_dir = "{reports}"

[logging]
jsonl_path = "{log}"

{extra}
"#,
        bash = root.join("bash").display(),
        python = root.join("python").display(),
        reports = root.join("reports").display(),
        log = root.join("reports").join("activity.jsonl").display(),
    );
    let path = root.join("sto.toml");
    fs::write(&path, config).expect("write config");
    path
}

/// The single `test-report-*.json` in `dir`.
pub fn find_json_report(dir: &Path) -> PathBuf {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read reports dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("test-report-") && n.ends_with(".json"))
        })
        .collect();
    assert_eq!(found.len(), 1, "expected one JSON report in {}", dir.display());
    found.remove(0)
}
