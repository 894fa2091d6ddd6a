use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

// `kserver -V` should print the version
#[test]
fn server_cli_version() {
    Command::cargo_bin("kserver")
        .unwrap()
        .args(&["-V"])
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn server_rejects_unknown_engine() {
    Command::cargo_bin("kserver")
        .unwrap()
        .args(&["--engine", "sled"])
        .assert()
        .failure();
}

#[test]
fn server_rejects_unparsable_addr() {
    Command::cargo_bin("kserver")
        .unwrap()
        .args(&["--engine", "memory", "--addr", "localhost"])
        .assert()
        .failure()
        .stderr(contains("could not parse"));
}

#[test]
fn bad_config_directive_is_fatal() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let path = temp_dir.path().join("kserver.conf");
    fs::write(&path, "# settings\nredis-ip 127.0.0.1\nredis-port seventy\n").unwrap();

    Command::cargo_bin("kserver")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("FATAL CONFIG FILE ERROR"))
        .stderr(contains("at line 3"))
        .stderr(contains("redis-port seventy"));
}

#[test]
fn unknown_config_directive_is_fatal() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let path = temp_dir.path().join("kserver.conf");
    fs::write(&path, "listen-everywhere yes\n").unwrap();

    Command::cargo_bin("kserver")
        .unwrap()
        .args(&["-c"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("Bad directive"));
}

#[test]
fn missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    Command::cargo_bin("kserver")
        .unwrap()
        .arg("--config")
        .arg(temp_dir.path().join("absent.conf"))
        .assert()
        .failure();
}
