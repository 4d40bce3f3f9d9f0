//! Tests for `HadoopCli` against a scripted client.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use crate::remote::{HadoopCli, RemoteFs};

const FAKE_CLIENT: &str = r#"
[ "$1" = fs ] || { echo "expected fs, got $1" >&2; exit 2; }
shift
case "$1" in
  -ls)
    echo "Found 2 items"
    echo "-rw-r--r--   1 u g 3 2024-01-01 00:00 $2/a.json"
    echo "drwxr-xr-x   - u g 0 2024-01-01 00:00 $2/sub"
    ;;
  -get) cp "$2" "$3" ;;
  -put) [ -e "$3" ] && { echo "put: \`$3': File exists" >&2; exit 1; }; cp "$2" "$3" ;;
  -mkdir) mkdir -p "$3" ;;
  *) echo "unknown command $1" >&2; exit 255 ;;
esac
"#;

/// Client running the fake script through `sh`, so the script never has to
/// be executable.
fn fake_client() -> (TempDir, HadoopCli) {
    let dir = tempdir().unwrap();
    let script = dir.path().join("hadoop.sh");
    fs::write(&script, FAKE_CLIENT).unwrap();
    let cli = HadoopCli::new("sh").with_base_args(vec![script.display().to_string(), "fs".into()]);
    (dir, cli)
}

#[test]
fn lists_plain_files() {
    let (dir, cli) = fake_client();
    assert_eq!(cli.list_files(dir.path()).unwrap(), ["a.json"]);
}

#[test]
fn copies_files_both_ways() {
    let (dir, cli) = fake_client();
    let remote = dir.path().join("remote");
    cli.mkdirs(&remote.join("nested")).unwrap();
    assert!(remote.join("nested").is_dir());

    let local = dir.path().join("local.json");
    fs::write(&local, "{}\n").unwrap();
    let target = remote.join("nested/out.json");
    cli.put(&local, &target).unwrap();

    let back = dir.path().join("back.json");
    cli.get(&target, &back).unwrap();
    assert_eq!(fs::read_to_string(back).unwrap(), "{}\n");
}

#[test]
fn failure_reports_command_and_stderr() {
    let (dir, cli) = fake_client();
    let local = dir.path().join("x");
    fs::write(&local, "x").unwrap();

    let err = cli.put(&local, &local).unwrap_err().to_string();
    assert!(err.contains("-put"), "{err}");
    assert!(err.contains("File exists"), "{err}");
}

#[test]
fn missing_client_is_an_error() {
    let cli = HadoopCli::new(PathBuf::from("/nonexistent/hadoop"));
    assert!(cli.get(Path::new("/a"), Path::new("/b")).is_err());
    assert_eq!(cli.program(), Path::new("/nonexistent/hadoop"));
}
