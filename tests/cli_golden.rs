// Copyright 2026 Folio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use assert_cmd::Command;
use jsonschema::JSONSchema;
use predicates::prelude::*;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

const CATALOG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/catalog.jsonl");

fn folio_cmd_with_env(config_root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("folio"));
    cmd.env("XDG_CONFIG_HOME", config_root);
    cmd.env("HOME", config_root);
    cmd.env("APPDATA", config_root);
    cmd.env_remove("RUST_LOG");
    cmd
}

fn global_config_path(config_root: &Path) -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        config_root.join("Library").join("Application Support")
    } else {
        config_root.to_path_buf()
    };
    base.join("folio").join("folio.toml")
}

fn write_config(config_root: &Path, extra: &str) {
    let path = global_config_path(config_root);
    fs::create_dir_all(path.parent().expect("config parent")).expect("config dir");
    let text = format!("[oracle]\nbackend = \"disabled\"\n{extra}");
    fs::write(path, text).expect("write config");
}

fn load_schema() -> JSONSchema {
    let schema_text = include_str!("../schemas/response.schema.json");
    let schema_json: Value = serde_json::from_str(schema_text).expect("schema json");
    JSONSchema::options()
        .compile(&schema_json)
        .expect("compile schema")
}

fn run_json(cmd: &mut Command, cwd: &Path) -> Value {
    let output = cmd.current_dir(cwd).output().expect("run command");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("parse json")
}

fn assert_schema(schema: &JSONSchema, value: &Value) {
    if let Err(errors) = schema.validate(value) {
        let msgs: Vec<String> = errors.map(|e| e.to_string()).collect();
        panic!("schema validation failed:\n{}", msgs.join("\n"));
    }
}

fn result_ids(value: &Value) -> Vec<i64> {
    value
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array")
        .iter()
        .filter_map(|book| book.get("id"))
        .filter_map(|id| id.as_i64())
        .collect()
}

fn page_view(value: &Value) -> Value {
    json!({
        "count": value["count"],
        "ids": result_ids(value),
    })
}

/// Config redirected, store initialized, fixture catalog imported.
fn seeded_catalog(extra_config: &str) -> (TempDir, TempDir) {
    let config_temp = TempDir::new().expect("config tempdir");
    write_config(config_temp.path(), extra_config);
    let temp = TempDir::new().expect("tempdir");

    let mut cmd = folio_cmd_with_env(config_temp.path());
    cmd.args(["init", "."]);
    assert!(cmd.current_dir(temp.path()).output().unwrap().status.success());

    let mut cmd = folio_cmd_with_env(config_temp.path());
    cmd.args(["import", CATALOG]);
    assert!(cmd.current_dir(temp.path()).output().unwrap().status.success());

    (config_temp, temp)
}

#[test]
fn golden_cli_outputs() {
    let schema = load_schema();
    let config_temp = TempDir::new().expect("config tempdir");
    let config_root = config_temp.path();
    write_config(config_root, "");
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();

    // init
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["init", "."]);
    let output = cmd.current_dir(root).output().expect("init");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // import
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["import", CATALOG, "--json"]);
    let import_json = run_json(&mut cmd, root);
    assert_schema(&schema, &import_json);
    assert_eq!(import_json["stats"]["transferred"], json!(6));
    assert_eq!(import_json["stats"]["catalog"]["author_count"], json!(7));

    // books: default order is by downloads, unknown counts last
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--json"]);
    let books_json = run_json(&mut cmd, root);
    assert_schema(&schema, &books_json);
    assert_eq!(result_ids(&books_json), vec![1342, 76, 236, 158, 1404, 2610]);
    assert_eq!(books_json["filters"], json!({}));

    // topic spans subjects and bookshelves
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--topic", "children", "--json"]);
    let topic_json = run_json(&mut cmd, root);
    assert_schema(&schema, &topic_json);
    insta::assert_json_snapshot!(page_view(&topic_json), @r#"
    {
      "count": 2,
      "ids": [
        76,
        236
      ]
    }
    "#);

    // blank values are ignored, pages advertise the next skip
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args([
        "books",
        "--language",
        "EN",
        "--author",
        " ",
        "--skip",
        "1",
        "--limit",
        "2",
        "--json",
    ]);
    let paged_json = run_json(&mut cmd, root);
    assert_schema(&schema, &paged_json);
    assert_eq!(paged_json["filters"], json!({"language": ["en"]}));
    assert_eq!(page_view(&paged_json), json!({"count": 5, "ids": [76, 236]}));
    assert_eq!(paged_json["next_skip"], json!(3));

    // limit outside 1..=max_limit is rejected
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--limit", "0", "--json"]);
    let bad_limit = run_json(&mut cmd, root);
    assert_schema(&schema, &bad_limit);
    assert_eq!(bad_limit["ok"], json!(false));
    assert!(
        bad_limit["error"]["message"]
            .as_str()
            .expect("message")
            .contains("limit must be between 1 and 100")
    );

    // stats
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["stats", "--json"]);
    let stats_json = run_json(&mut cmd, root);
    assert_schema(&schema, &stats_json);
    assert_eq!(stats_json["stats"]["catalog"]["book_count"], json!(6));
    assert_eq!(stats_json["stats"]["catalog"]["language_count"], json!(2));
    assert!(stats_json["stats"]["catalog"]["imported_at"].is_string());

    // doctor reports the disabled backend without failing
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["doctor", "--json"]);
    let doctor_json = run_json(&mut cmd, root);
    assert_schema(&schema, &doctor_json);
    assert_eq!(doctor_json["diagnostics"]["integrity"], json!("ok"));
    assert_eq!(doctor_json["diagnostics"]["oracle"]["backend"], json!("disabled"));
    assert_eq!(doctor_json["diagnostics"]["oracle"]["connected"], json!(false));
}

#[test]
fn chat_shortcuts_do_not_need_the_model() {
    let schema = load_schema();
    let (config_temp, temp) = seeded_catalog("");
    let config_root = config_temp.path();
    let root = temp.path();

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "Most Downloaded book", "--json"]);
    let top = run_json(&mut cmd, root);
    assert_schema(&schema, &top);
    assert_eq!(top["query"]["strategy"], json!("intent"));
    insta::assert_json_snapshot!(top["filters"], @r#"
    {
      "limit": 1,
      "sort": "download_count:desc"
    }
    "#);
    assert_eq!(page_view(&top), json!({"count": 6, "ids": [1342]}));
    assert_eq!(top["summary"], json!("Found 1 books matching your query."));
    assert!(top.get("warnings").is_none());

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "List top 3 most downloaded French books", "--json"]);
    let french = run_json(&mut cmd, root);
    assert_schema(&schema, &french);
    assert_eq!(
        french["filters"],
        json!({"sort": "download_count:desc", "limit": 3})
    );
    assert_eq!(result_ids(&french), vec![1342, 76, 236]);

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "show me the latest 2", "--json"]);
    let latest = run_json(&mut cmd, root);
    assert_schema(&schema, &latest);
    assert_eq!(latest["filters"], json!({"sort": "latest", "limit": 2}));
    assert_eq!(result_ids(&latest), vec![2610, 1404]);
}

#[test]
fn chat_degrades_when_the_model_is_unavailable() {
    let schema = load_schema();
    let (config_temp, temp) = seeded_catalog("");
    let config_root = config_temp.path();
    let root = temp.path();

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "books by author Twain", "--json"]);
    let resp = run_json(&mut cmd, root);
    assert_schema(&schema, &resp);
    assert_eq!(resp["ok"], json!(true));
    assert_eq!(resp["query"]["strategy"], json!("generative"));
    assert_eq!(resp["filters"], json!({}));
    assert_eq!(resp["count"], json!(6));
    assert_eq!(resp["summary"], json!("Found 6 books matching your query."));
    let warnings = resp["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().expect("warning").contains("disabled"));
}

#[test]
fn chat_reject_policy_fails_on_empty_filter() {
    let schema = load_schema();
    let (config_temp, temp) = seeded_catalog("\n[chat]\nempty_filter = \"reject\"\n");
    let config_root = config_temp.path();
    let root = temp.path();

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "something to read", "--json"]);
    let resp = run_json(&mut cmd, root);
    assert_schema(&schema, &resp);
    assert_eq!(
        resp["error"]["message"],
        json!("couldn't parse any filters from the query")
    );

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "something to read"]);
    cmd.current_dir(root)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "error: couldn't parse any filters from the query",
        ));

    // shortcuts still resolve under the reject policy
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["chat", "top 2", "--json"]);
    let top = run_json(&mut cmd, root);
    assert_eq!(result_ids(&top), vec![1342, 76]);
}

#[test]
fn export_import_roundtrip() {
    let schema = load_schema();
    let (config_temp, temp) = seeded_catalog("");
    let config_root = config_temp.path();
    let root = temp.path();

    let export_path = root.join("export.jsonl");
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args([
        "export",
        "--out",
        export_path.to_string_lossy().as_ref(),
        "--json",
    ]);
    let export_json = run_json(&mut cmd, root);
    assert_schema(&schema, &export_json);
    assert_eq!(export_json["stats"]["transferred"], json!(6));

    let temp2 = TempDir::new().expect("tempdir");
    let root2 = temp2.path();
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["init", "."]);
    assert!(cmd.current_dir(root2).output().unwrap().status.success());

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["import", export_path.to_string_lossy().as_ref(), "--json"]);
    let import_json = run_json(&mut cmd, root2);
    assert_schema(&schema, &import_json);

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--json"]);
    let original = run_json(&mut cmd, root);
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--json"]);
    let copied = run_json(&mut cmd, root2);
    assert_eq!(original["results"], copied["results"]);
}

#[test]
fn commands_require_an_initialized_store() {
    let config_temp = TempDir::new().expect("config tempdir");
    write_config(config_temp.path(), "");
    let temp = TempDir::new().expect("tempdir");

    let mut cmd = folio_cmd_with_env(config_temp.path());
    cmd.args(["books"]);
    cmd.current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("store not found"));

    let mut cmd = folio_cmd_with_env(config_temp.path());
    cmd.args(["init", "."]);
    assert!(cmd.current_dir(temp.path()).output().unwrap().status.success());
    let mut cmd = folio_cmd_with_env(config_temp.path());
    cmd.args(["init", "."]);
    cmd.current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn books_rejects_skip_beyond_sql_range() {
    let schema = load_schema();
    let (config_temp, temp) = seeded_catalog("");
    let config_root = config_temp.path();
    let root = temp.path();

    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--skip", "18446744073709551615", "--json"]);
    let resp = run_json(&mut cmd, root);
    assert_schema(&schema, &resp);
    assert_eq!(resp["ok"], json!(false));
    assert!(
        resp["error"]["message"]
            .as_str()
            .expect("message")
            .starts_with("skip must be at most")
    );

    // the largest accepted skip yields an empty page, not the first one
    let mut cmd = folio_cmd_with_env(config_root);
    cmd.args(["books", "--skip", "9223372036854775807", "--json"]);
    let resp = run_json(&mut cmd, root);
    assert_schema(&schema, &resp);
    assert_eq!(page_view(&resp), json!({"count": 6, "ids": []}));
    assert!(resp.get("next_skip").is_none());
}
