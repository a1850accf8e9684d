use std::process::{Command, Output};
use tempfile::TempDir;

fn run_dex(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dex"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run dex")
}

fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("stdout should be JSON")
}

const PAGES_CONFIG: &str = r#"
[[pages]]
path = "/agenda"
title = "Agenda"
page_number = 2

[[pages]]
path = "/intro"
title = "Intro"
page_number = 1

[[pages]]
path = "/backup"
page_number = 3
hidden = true
"#;

#[test]
fn pages_lists_config_pages_in_order() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    std::fs::write(&cfg, PAGES_CONFIG).expect("write config");

    let output = run_dex(&["pages", "--config", cfg.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    let body = parse_json(&output.stdout);
    assert_eq!(body["kind"], "pages");
    assert_eq!(body["total"], 2);
    assert_eq!(body["pages"][0]["path"], "/intro");
    assert_eq!(body["pages"][0]["next"], "/agenda");
    assert_eq!(body["pages"][1]["previous"], "/intro");
}

#[test]
fn pages_yaml_overrides_config_list() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    let list = dir.path().join("pages.yaml");
    std::fs::write(&cfg, PAGES_CONFIG).expect("write config");
    std::fs::write(&list, "- path: /only\n  pageNumber: 1\n").expect("write pages");

    let output = run_dex(&[
        "pages",
        "--config",
        cfg.to_str().unwrap(),
        "--pages",
        list.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(0));
    let body = parse_json(&output.stdout);
    assert_eq!(body["total"], 1);
    assert_eq!(body["pages"][0]["title"], "Page 1");
}

#[test]
fn invalid_config_exits_two_with_config_category() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    std::fs::write(&cfg, "[capture]\nscale = 0.0\n").expect("write config");

    let output = run_dex(&["pages", "--config", cfg.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["kind"], "error");
    assert_eq!(body["error"]["category"], "config");
}

#[test]
fn missing_node_exits_two_before_launching() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    std::fs::write(&cfg, "[browser]\nnode_command = \"definitely-not-node-dex\"\n")
        .expect("write config");

    let output = run_dex(&[
        "current",
        "--url",
        "http://127.0.0.1:9/",
        "--config",
        cfg.to_str().unwrap(),
        "--output-dir",
        dir.path().to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["error"]["category"], "config");
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("definitely-not-node-dex"), "got {message}");
}

#[test]
fn invalid_url_is_a_config_error() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    std::fs::write(&cfg, "").expect("write config");

    let output = run_dex(&["all", "--url", "not a url", "--config", cfg.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["error"]["category"], "config");
}

#[test]
fn pretty_errors_stay_json_when_piped() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("dex.toml");
    std::fs::write(&cfg, "[capture]\nquality = 3.0\n").expect("write config");

    let output = run_dex(&[
        "pages",
        "--config",
        cfg.to_str().unwrap(),
        "--format",
        "pretty",
    ]);

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["kind"], "error");
}
