use semsolve_util::fs::{find_ancestor_with, read_to_string};
use tempfile::TempDir;

#[test]
fn test_find_ancestor_with_direct() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("semsolve.toml"), "").unwrap();
    let result = find_ancestor_with(tmp.path(), "semsolve.toml");
    assert_eq!(result, Some(tmp.path().to_path_buf()));
}

#[test]
fn test_find_ancestor_with_nested() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("semsolve.toml"), "").unwrap();
    let nested = tmp.path().join("a").join("b").join("c");
    std::fs::create_dir_all(&nested).unwrap();
    let result = find_ancestor_with(&nested, "semsolve.toml");
    assert_eq!(result, Some(tmp.path().to_path_buf()));
}

#[test]
fn test_find_ancestor_with_not_found() {
    let tmp = TempDir::new().unwrap();
    let result = find_ancestor_with(tmp.path(), "NonExistent.file");
    assert_eq!(result, None);
}

#[test]
fn test_read_to_string_contents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    std::fs::write(&path, "{}").unwrap();
    assert_eq!(read_to_string(&path).unwrap(), "{}");
}

#[test]
fn test_read_to_string_missing_names_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("missing.json");
    let err = read_to_string(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("I/O error"), "got: {msg}");
    assert!(msg.contains("missing.json"), "got: {msg}");
}
