#[path = "../src/test_support.rs"]
mod test_support;

use serde_json::Value;
use std::path::Path;
use std::process::Command;
use test_support::*;

fn run_json(args: &[&str]) -> anyhow::Result<(bool, Value)> {
    let bin = env!("CARGO_BIN_EXE_mrjar");
    let out = Command::new(bin).arg("--format").arg("json").args(args).output()?;
    let value = serde_json::from_slice(&out.stdout).map_err(|e| {
        anyhow::anyhow!(
            "unparsable output: {e}, status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        )
    })?;
    Ok((out.status.success(), value))
}

fn s(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn listed_names(jar: &Path) -> anyhow::Result<Vec<String>> {
    let (ok, listing) = run_json(&["list", &s(jar)])?;
    assert!(ok);
    Ok(listing
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|e| e["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default())
}

fn kinds(report: &Value) -> Vec<String> {
    report["diagnostics"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|d| d["kind"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn create_list_update_round_trip() -> anyhow::Result<()> {
    let dir = temp_dir("it-roundtrip");
    write_tree(&dir, &[("A", b"alpha"), ("B", b"beta"), ("dir/C", b"gamma")]);
    let jar = dir.join("out.jar");

    let (ok, outcome) = run_json(&[
        "create", &s(&jar), "-M", "-C", &s(&dir), "A", "-C", &s(&dir), "B", "-C", &s(&dir), "dir",
    ])?;
    assert!(ok, "{outcome}");
    assert_eq!(outcome["ok"], Value::Bool(true));
    assert_eq!(listed_names(&jar)?, vec!["A", "B", "dir/", "dir/C"]);

    let before = run_json(&["list", &s(&jar)])?.1;
    let (ok, _) = run_json(&["update", &s(&jar)])?;
    assert!(ok);
    let after = run_json(&["list", &s(&jar)])?.1;
    assert_eq!(before, after);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn concealed_public_class_is_only_a_warning() -> anyhow::Result<()> {
    let dir = temp_dir("it-concealed");
    let jar = dir.join("m.jar");
    write_jar(
        &jar,
        &[
            (
                "module-info.class",
                &ModuleInfoFile::new("m").exports("p").packages(&["p", "q"]).to_bytes(),
            ),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("META-INF/versions/10/q/B.class", &ClassFile::new("q/B").to_bytes()),
        ],
    );

    let (ok, report) = run_json(&["validate", &s(&jar)])?;
    assert!(ok);
    assert_eq!(report["valid"], Value::Bool(true));
    assert_eq!(kinds(&report), vec!["concealed_public_class"]);
    assert_eq!(report["diagnostics"][0]["severity"], "warning");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn new_public_class_in_exported_package_fails_validation() -> anyhow::Result<()> {
    let dir = temp_dir("it-exported");
    let jar = dir.join("m.jar");
    write_jar(
        &jar,
        &[
            (
                "module-info.class",
                &ModuleInfoFile::new("m").exports("p").packages(&["p"]).to_bytes(),
            ),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("META-INF/versions/10/p/B.class", &ClassFile::new("p/B").to_bytes()),
        ],
    );

    let (ok, report) = run_json(&["validate", &s(&jar)])?;
    assert!(!ok);
    assert_eq!(report["valid"], Value::Bool(false));
    assert_eq!(kinds(&report), vec!["unexpected_new_public_class"]);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn create_refuses_lower_class_version_in_release_group() -> anyhow::Result<()> {
    let dir = temp_dir("it-version");
    write_tree(
        &dir,
        &[
            ("base/X.class", &ClassFile::new("X").major(55).to_bytes()),
            ("v11/X.class", &ClassFile::new("X").major(53).field(ACC_PUBLIC, "f", "I").to_bytes()),
        ],
    );
    let jar = dir.join("mr.jar");

    let (ok, outcome) = run_json(&[
        "create",
        &s(&jar),
        "-C",
        &s(&dir.join("base")),
        "X.class",
        "--release",
        "11",
        "-C",
        &s(&dir.join("v11")),
        "X.class",
    ])?;
    assert!(!ok);
    assert_eq!(outcome["ok"], Value::Bool(false));
    assert!(kinds(&outcome).contains(&"incompatible_class_version".to_string()));
    assert!(!jar.exists());

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn release_groups_land_in_version_order() -> anyhow::Result<()> {
    let dir = temp_dir("it-order");
    let class = ClassFile::new("p/C").to_bytes();
    write_tree(&dir, &[("base/p/C.class", &class), ("v9/p/C.class", &class), ("v10/p/C.class", &class)]);
    let jar = dir.join("mr.jar");

    let (ok, outcome) = run_json(&[
        "create",
        &s(&jar),
        "-C",
        &s(&dir.join("base")),
        "p",
        "--release",
        "10",
        "-C",
        &s(&dir.join("v10")),
        "p",
        "--release",
        "9",
        "-C",
        &s(&dir.join("v9")),
        "p",
    ])?;
    assert!(ok, "{outcome}");
    let names = listed_names(&jar)?;
    let classes: Vec<&String> = names.iter().filter(|n| n.ends_with(".class")).collect();
    assert_eq!(
        classes,
        vec![
            "p/C.class",
            "META-INF/versions/9/p/C.class",
            "META-INF/versions/10/p/C.class"
        ]
    );
    assert!(names.contains(&"META-INF/MANIFEST.MF".to_string()));

    let (ok, report) = run_json(&["validate", &s(&jar)])?;
    assert!(ok);
    assert_eq!(
        kinds(&report),
        vec!["redundant_identical_entry", "redundant_identical_entry"]
    );

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn malformed_versioned_name_is_an_error() -> anyhow::Result<()> {
    let dir = temp_dir("it-malformed");
    let jar = dir.join("bad.jar");
    write_jar(&jar, &[("META-INF/versions/9C.class", &ClassFile::new("C").to_bytes())]);

    let out = Command::new(env!("CARGO_BIN_EXE_mrjar"))
        .args(["validate", &s(&jar)])
        .output()?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("META-INF/versions/9C.class"));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn describe_module_reports_json_text() -> anyhow::Result<()> {
    let dir = temp_dir("it-describe");
    let jar = dir.join("m.jar");
    write_jar(
        &jar,
        &[("module-info.class", &ModuleInfoFile::new("m").version("3").exports("p").to_bytes())],
    );

    let (ok, value) = run_json(&["describe-module", &s(&jar)])?;
    assert!(ok);
    let text = value["description"].as_str().unwrap_or_default();
    assert!(text.starts_with("m@3 jar:file://"));
    assert!(text.contains("\nexports p\n"));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
