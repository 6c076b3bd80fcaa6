#[test]
fn jobpipe_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("jobpipe");
    let out = std::process::Command::new(bin)
        .args(["version"])
        // Disable `.env` autoload so this contract stays hermetic.
        .env("JOBPIPE_ENV_FILE", "0")
        .output()
        .expect("run jobpipe version");

    assert!(out.status.success(), "jobpipe version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("version"));
    assert_eq!(v["name"].as_str(), Some("jobpipe"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn jobpipe_version_text_output() {
    let bin = assert_cmd::cargo::cargo_bin!("jobpipe");
    let out = std::process::Command::new(bin)
        .args(["version", "--output", "text"])
        .env("JOBPIPE_ENV_FILE", "0")
        .output()
        .expect("run jobpipe version --output text");

    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.starts_with("jobpipe "), "unexpected: {s}");
    assert!(serde_json::from_str::<serde_json::Value>(&s).is_err());
}
