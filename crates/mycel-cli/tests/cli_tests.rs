// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Exit-code contract of the front-end binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn mycel() -> Command {
    Command::cargo_bin("mycel").unwrap()
}

#[test]
fn help_prints_the_interface() {
    mycel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--nodes"))
        .stdout(predicate::str::contains("--no-self-observation"));
}

#[test]
fn unknown_flags_exit_2() {
    mycel().arg("--bogus").assert().code(2);
}

#[test]
fn zero_node_capacity_exits_2() {
    mycel().args(["--nodes", "0"]).assert().code(2);
}

#[test]
fn immediate_eof_terminates_cleanly_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("graph.state");
    mycel()
        .args([
            "--state",
            state.to_str().unwrap(),
            "--seed",
            "1",
            "--tick-ms",
            "0",
        ])
        .write_stdin("")
        .assert()
        .code(0);
    assert!(state.exists(), "final snapshot missing");
}

#[test]
fn locked_state_file_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("graph.state");
    let lock = dir.path().join("graph.state.lock");
    std::fs::write(&lock, "held").unwrap();
    mycel()
        .args([
            "--state",
            state.to_str().unwrap(),
            "--seed",
            "1",
            "--tick-ms",
            "0",
        ])
        .write_stdin("")
        .assert()
        .code(3);
}

#[test]
fn short_input_run_processes_and_exits_0() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("graph.state");
    let assert = mycel()
        .args([
            "--state",
            state.to_str().unwrap(),
            "--seed",
            "7",
            "--tick-ms",
            "0",
            "--no-self-observation",
        ])
        .write_stdin("abcabcabc")
        .assert()
        .code(0);
    // With self-observation off the run drains its input, emits some
    // action bytes, and terminates on EOF.
    let output = assert.get_output();
    assert!(!output.stdout.is_empty());
}
