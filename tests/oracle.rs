use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use unistitch::core::oracle::{CommandOracle, FqnOracle};

/// `dep.f` is defined in `dep.impl` and re-exported by the package.
fn write_package(root: &Path) {
    fs::create_dir_all(root.join("dep")).unwrap();
    fs::write(root.join("dep/__init__.py"), "from dep.impl import f\n").unwrap();
    fs::write(root.join("dep/impl.py"), "def f():\n    return 1\n").unwrap();
}

/// Stand-in interpreter that ignores its arguments and runs `body`.
#[cfg(unix)]
fn fake_interpreter(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-python");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.canonicalize().unwrap()
}

fn interpreter_name(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

#[cfg(unix)]
#[test]
fn relative_install_root_still_resolves() {
    let tmp = tempfile::Builder::new()
        .prefix(".oracle")
        .tempdir_in(".")
        .unwrap();
    let deps = tmp.path().join("deps");
    write_package(&deps);
    assert!(deps.is_relative());

    let module = deps.canonicalize().unwrap().join("dep/impl.py");
    let script = fake_interpreter(
        tmp.path(),
        &format!("echo '{}'\necho f", module.display()),
    );
    let oracle =
        CommandOracle::new(interpreter_name(&script), &deps, Duration::from_secs(5)).unwrap();
    assert_eq!(oracle.resolve("dep.f").as_deref(), Some("dep.impl.f"));
}

#[cfg(unix)]
#[test]
fn slow_lookup_counts_as_a_miss() {
    let tmp = tempfile::TempDir::new().unwrap();
    let script = fake_interpreter(tmp.path(), "sleep 5");
    let oracle = CommandOracle::new(
        interpreter_name(&script),
        tmp.path(),
        Duration::from_millis(300),
    )
    .unwrap();

    let start = Instant::now();
    assert_eq!(oracle.resolve("dep.f"), None);
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[cfg(unix)]
#[test]
fn failing_interpreter_counts_as_a_miss() {
    let tmp = tempfile::TempDir::new().unwrap();
    let script = fake_interpreter(tmp.path(), "exit 3");
    let oracle =
        CommandOracle::new(interpreter_name(&script), tmp.path(), Duration::from_secs(5)).unwrap();
    assert_eq!(oracle.resolve("dep.f"), None);

    let missing = tmp.path().join("no-such-interpreter");
    let oracle =
        CommandOracle::new(interpreter_name(&missing), tmp.path(), Duration::from_secs(5)).unwrap();
    assert_eq!(oracle.resolve("dep.f"), None);
}

#[cfg(unix)]
#[test]
fn module_outside_install_root_counts_as_a_miss() {
    let tmp = tempfile::TempDir::new().unwrap();
    let deps = tmp.path().join("deps");
    fs::create_dir_all(&deps).unwrap();
    let script = fake_interpreter(tmp.path(), "echo /usr/lib/python3/json/__init__.py\necho loads");
    let oracle =
        CommandOracle::new(interpreter_name(&script), &deps, Duration::from_secs(5)).unwrap();
    assert_eq!(oracle.resolve("json.loads"), None);
}

#[test]
fn missing_install_root_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let result = CommandOracle::new("python3", tmp.path().join("absent"), Duration::from_secs(1));
    assert!(result.is_err());
}

#[test]
fn live_interpreter_finds_reexported_name() {
    let available = Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("python3 not available, skipping");
        return;
    }

    let tmp = tempfile::TempDir::new().unwrap();
    let deps = tmp.path().join("deps");
    write_package(&deps);
    let oracle = CommandOracle::new("python3", &deps, Duration::from_secs(30)).unwrap();
    assert_eq!(oracle.resolve("dep.f").as_deref(), Some("dep.impl.f"));
    assert_eq!(oracle.resolve("dep.nothing"), None);
}
