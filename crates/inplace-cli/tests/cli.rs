//! Runs the `inplace` binary end to end.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use inplace_test_support::fixtures::{entries, scratch_dir, tools_available, write_file};

type TestResult<T> = Result<T>;

/// Run the binary inside `dir` with aliases isolated under `dir/config`.
fn inplace(dir: &Path, args: &[&str]) -> TestResult<Output> {
    let config_home = dir.join("config");
    Ok(Command::new(env!("CARGO_BIN_EXE_inplace"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", &config_home)
        .env_remove("RUST_LOG")
        .output()?)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_files_exit_with_usage() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;

    let output = inplace(dir.path(), &[])?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("No files to process given."));

    let output = inplace(dir.path(), &["sort"])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn parse_errors_exit_64() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;
    let output = inplace(dir.path(), &["--no-such-flag", "sort", "a"])?;
    assert_eq!(output.status.code(), Some(64));
    Ok(())
}

#[test]
fn help_and_version_succeed() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;
    let output = inplace(dir.path(), &["--help"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--backup-suffix"));

    let output = inplace(dir.path(), &["--version"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn invalid_template_is_a_configuration_error() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;
    write_file(dir.path(), "a.txt", b"abc")?;

    let output = inplace(dir.path(), &["-e", "cat %x", "a.txt"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid placeholder specification (%x)"));
    assert_eq!(fs::read(dir.path().join("a.txt"))?, b"abc");
    Ok(())
}

#[test]
fn unterminated_execute_args_fail() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;
    let output = inplace(dir.path(), &["-E", "tr", "a", "A"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("-E must end with --"));
    Ok(())
}

#[test]
fn chained_filters_and_backup() -> TestResult<()> {
    if !tools_available(&["tr"]) {
        return Ok(());
    }
    let dir = scratch_dir("inplace-cli-")?;
    write_file(dir.path(), "ab.txt", b"ab")?;

    let output = inplace(
        dir.path(),
        &["-s", "-b", ".bak", "-e", "tr a A", "-E", "tr", "b", "B", "--", "ab.txt"],
    )?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(fs::read(dir.path().join("ab.txt"))?, b"AB");
    assert_eq!(fs::read(dir.path().join("ab.txt.bak"))?, b"ab");
    assert_eq!(
        entries(dir.path())?,
        vec!["ab.txt".to_string(), "ab.txt.bak".to_string()]
    );
    Ok(())
}

#[test]
fn skipped_files_are_reported_and_run_continues() -> TestResult<()> {
    if !tools_available(&["tr"]) {
        return Ok(());
    }
    let dir = scratch_dir("inplace-cli-")?;
    write_file(dir.path(), "b.txt", b"abc")?;

    let output = inplace(dir.path(), &["tr a-z A-Z", "missing.txt", "b.txt"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("missing.txt: skipped: file not found"));
    assert_eq!(fs::read(dir.path().join("b.txt"))?, b"ABC");
    Ok(())
}

#[test]
fn aliases_expand_from_config_file() -> TestResult<()> {
    if !tools_available(&["tr"]) {
        return Ok(());
    }
    let dir = scratch_dir("inplace-cli-")?;
    let config_dir = dir.path().join("config").join("inplace");
    fs::create_dir_all(&config_dir)?;
    write_file(&config_dir, "config", b"# aliases\nupcase = tr a-z A-Z\n")?;
    write_file(dir.path(), "a.txt", b"hello")?;

    let output = inplace(dir.path(), &["-e", "upcase", "a.txt"])?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(fs::read(dir.path().join("a.txt"))?, b"HELLO");
    Ok(())
}

#[test]
fn dry_run_changes_nothing() -> TestResult<()> {
    let dir = scratch_dir("inplace-cli-")?;
    write_file(dir.path(), "a.txt", b"keep")?;

    let output = inplace(dir.path(), &["-n", "-b", "~", "rm -f %1; : %2", "a.txt"])?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(fs::read(dir.path().join("a.txt"))?, b"keep");
    assert_eq!(entries(dir.path())?, vec!["a.txt".to_string()]);
    Ok(())
}

#[test]
fn termination_signal_exits_130() -> TestResult<()> {
    if !tools_available(&["kill", "sleep"]) {
        return Ok(());
    }
    let dir = scratch_dir("inplace-cli-")?;
    write_file(dir.path(), "a.txt", b"abc")?;

    let output = inplace(dir.path(), &["-s", "kill -TERM $PPID; sleep 2; cat", "a.txt"])?;
    assert_eq!(output.status.code(), Some(130));
    assert!(stderr(&output).contains("Interrupted."));
    assert_eq!(fs::read(dir.path().join("a.txt"))?, b"abc");
    assert_eq!(entries(dir.path())?, vec!["a.txt".to_string()]);
    Ok(())
}
