use std::fs;
use std::process::Command;
use tempfile::tempdir;

// This test archives a directory tree with the library and then calls `unzip -t`
// and `unzip -l` to verify compatibility.
// If `unzip` is not present on the system, the test will be skipped.

#[test]
fn unzip_compatibility() {
    use vfs_zipper::zip_dir;

    // Check if `unzip` exists by trying to run `unzip -v`.
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("nested/empty")).unwrap();
    fs::write(src.join("hello.txt"), b"hello from test").unwrap();
    // a moderate amount of data to ensure a non-trivial archive
    fs::write(src.join("nested/big.bin"), vec![0u8; 1024 * 1024]).unwrap();

    let zip_path = dir.path().join("compat.zip");
    zip_dir(&src, &zip_path).unwrap();

    // Run `unzip -t` to test archive integrity
    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );

    // Listing must show relative names only
    let listing = Command::new("unzip")
        .arg("-Z1")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let names: Vec<String> = String::from_utf8_lossy(&listing.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        names,
        vec![
            "hello.txt",
            "nested/",
            "nested/big.bin",
            "nested/empty/",
        ]
    );
}
