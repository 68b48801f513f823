use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn fleet(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agent-fleet"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("AGENT_FLEET_CACHE_DIR", dir.join(".cache"))
        .env_remove("AGENT_FLEET_MANIFEST")
        .env_remove("AGENT_FLEET_LOG");
    cmd
}

fn write_identity(dir: &Path, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("identity.toml"), body).unwrap();
}

const FLEET: &str = r#"
stack_name = "acme"
provider = "hetzner"
region = "fsn1"
instance_type = "cx32"

[[agents]]
name = "agent-juno"
display_name = "Juno"
role = "eng"
identity_source = "./ids/eng"
volume_size = 30
"#;

#[test]
fn test_help_output() {
    let tmp = tempfile::tempdir().unwrap();
    fleet(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("sync"));
}

#[test]
fn test_version_command() {
    let tmp = tempfile::tempdir().unwrap();
    fleet(tmp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("agent-fleet "));
}

#[test]
fn test_version_ignores_broken_config() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(".agent-fleet.toml"), "[fetch]\ntimeout_secs = 0\n").unwrap();

    fleet(tmp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("agent-fleet "));
    fleet(tmp.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_secs"));
}

#[test]
fn test_validate_reports_every_issue() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("fleet.toml"),
        r#"
stack_name = "Not A Slug"
provider = "openstack"
region = "fsn1"
instance_type = "cx32"

[[agents]]
name = "agent-juno"
display_name = "Juno"
role = "eng"
identity_source = "./ids/eng"
volume_size = 0
"#,
    )
    .unwrap();

    fleet(tmp.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("✗ Manifest is invalid!"))
        .stderr(predicate::str::contains("stack_name"))
        .stderr(predicate::str::contains("provider"))
        .stderr(predicate::str::contains("volume_size"));
}

#[test]
fn test_validate_missing_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    fleet(tmp.path())
        .args(["--manifest", "deploy/fleet.toml", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_ok() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("fleet.toml"), FLEET).unwrap();
    fleet(tmp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Manifest is valid"))
        .stdout(predicate::str::contains("1 agent(s)"));
}

#[test]
fn test_resolve_local_identity() {
    let tmp = tempfile::tempdir().unwrap();
    write_identity(
        &tmp.path().join("ids/eng"),
        "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"\nskills = [\"rust\"]\nplugins = [\"slack\"]",
    );

    fleet(tmp.path())
        .args(["resolve", "./ids/eng"])
        .assert()
        .success()
        .stdout(predicate::str::contains("juno (Juno)"))
        .stdout(predicate::str::contains("role:             eng"))
        .stdout(predicate::str::contains("plugins:          slack"));
}

#[test]
fn test_resolve_rejects_pin_on_local_source() {
    let tmp = tempfile::tempdir().unwrap();
    fleet(tmp.path())
        .args(["resolve", "./ids/eng", "--version", "v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid identity source"));
}

#[test]
fn test_sync_dry_run_leaves_files_alone() {
    let tmp = tempfile::tempdir().unwrap();
    write_identity(
        &tmp.path().join("ids/eng"),
        "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"\ntemplate_vars = [\"TEAM\"]",
    );
    fs::write(tmp.path().join("fleet.toml"), FLEET).unwrap();

    fleet(tmp.path())
        .env_remove("HCLOUD_TOKEN")
        .args(["sync", "--dry-run", "--allow-incomplete", "--var", "TEAM=core"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-juno -> ./ids/eng (by source)"))
        .stdout(predicate::str::contains("HCLOUD_TOKEN"))
        .stdout(predicate::str::contains("Dry run: nothing written"));

    assert_eq!(fs::read_to_string(tmp.path().join("fleet.toml")).unwrap(), FLEET);
    assert!(!tmp.path().join("fleet.secrets.template").exists());
}

#[test]
fn test_sync_blocks_on_missing_secrets() {
    let tmp = tempfile::tempdir().unwrap();
    write_identity(
        &tmp.path().join("ids/eng"),
        "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"",
    );
    fs::write(tmp.path().join("fleet.toml"), FLEET).unwrap();

    fleet(tmp.path())
        .env_remove("HCLOUD_TOKEN")
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HCLOUD_TOKEN"));

    assert_eq!(fs::read_to_string(tmp.path().join("fleet.toml")).unwrap(), FLEET);
}

#[test]
fn test_add_appends_agent_and_writes_template() {
    let tmp = tempfile::tempdir().unwrap();
    write_identity(
        &tmp.path().join("ids/eng"),
        "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"",
    );
    write_identity(
        &tmp.path().join("ids/pm"),
        "name = \"pam\"\ndisplay_name = \"Pam\"\nrole = \"pm\"",
    );
    fs::write(tmp.path().join("fleet.toml"), FLEET).unwrap();

    fleet(tmp.path())
        .args(["add", "./ids/pm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added agent 'agent-pam'"));

    let manifest = fs::read_to_string(tmp.path().join("fleet.toml")).unwrap();
    assert!(manifest.contains("name = \"agent-pam\""));
    assert!(manifest.contains("identity_source = \"./ids/pm\""));
    assert!(tmp.path().join("fleet.secrets.template").exists());

    fleet(tmp.path())
        .args(["add", "./ids/pm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already runs identity"));
}

#[test]
fn test_secrets_lists_status() {
    let tmp = tempfile::tempdir().unwrap();
    write_identity(
        &tmp.path().join("ids/eng"),
        "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"\nrequired_secrets = [\"sentry_dsn\"]",
    );
    fs::write(tmp.path().join("fleet.toml"), FLEET).unwrap();
    fs::write(
        tmp.path().join(".env.fleet"),
        "ENG_SENTRY_DSN=https://sentry.example/1\n",
    )
    .unwrap();

    fleet(tmp.path())
        .arg("secrets")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-juno (eng):"))
        .stdout(predicate::str::is_match(r"ENG_SENTRY_DSN\s+sentry_dsn\s+✓ set").unwrap())
        .stdout(predicate::str::contains("secret(s) missing"));
}

#[test]
fn test_cache_list_empty_and_clean() {
    let tmp = tempfile::tempdir().unwrap();
    fleet(tmp.path())
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached identities"));

    fs::create_dir_all(tmp.path().join(".cache/stale-entry")).unwrap();
    fleet(tmp.path())
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 cached checkout(s)"));
    assert!(!tmp.path().join(".cache/stale-entry").exists());
}

#[test]
fn test_config_show_reflects_project_file() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join(".agent-fleet.toml"),
        "[fetch]\ntimeout_secs = 45\n\n[logging]\nformat = \"json\"\n",
    )
    .unwrap();

    fleet(tmp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout: 45s"))
        .stdout(predicate::str::contains("format: Json"));
}

#[test]
fn test_invalid_config_fails_fast() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join(".agent-fleet.toml"),
        "[fetch]\ntimeout_secs = 0\n",
    )
    .unwrap();

    fleet(tmp.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_secs"));
}
