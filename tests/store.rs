use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use label_crosswalk::store::{FileFormat, OutputTarget, Store};

#[test]
fn discover_skips_backups_and_output_tree() {
    let temp = tempfile::tempdir().unwrap();
    let input = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let output = Store::default_output_dir(&input);
    std::fs::create_dir_all(input.join("a/b")).unwrap();
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(input.join("z.csv"), "x\n").unwrap();
    std::fs::write(input.join("a/b/labels.JSON"), "[]").unwrap();
    std::fs::write(input.join("z.csv.20240101T000000Z.bak"), "x\n").unwrap();
    std::fs::write(input.join("readme.md"), "").unwrap();
    std::fs::write(output.join("z.csv"), "x\n").unwrap();

    let store = Store::new(input.clone(), OutputTarget::Directory(output.clone())).unwrap();
    let files = store.discover().unwrap();
    let relative: Vec<_> = files.iter().map(|file| file.relative.as_str()).collect();
    assert_eq!(relative, vec!["a/b/labels.JSON", "z.csv"]);
    assert_eq!(files[0].format, FileFormat::Json);
    assert_eq!(store.output_path(&files[0]), output.join("a/b/labels.JSON"));
}

#[test]
fn input_must_be_a_directory() {
    let temp = tempfile::tempdir().unwrap();
    let file = Utf8PathBuf::from_path_buf(temp.path().join("labels.csv")).unwrap();
    std::fs::write(&file, "x\n").unwrap();
    assert!(Store::new(file, OutputTarget::InPlace).is_err());
}

#[test]
fn backup_refuses_to_clobber() {
    let temp = tempfile::tempdir().unwrap();
    let file = Utf8PathBuf::from_path_buf(temp.path().join("labels.csv")).unwrap();
    std::fs::write(&file, "original\n").unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

    let backup = Store::backup_file(&file, at).unwrap();
    assert_eq!(backup.file_name(), Some("labels.csv.20240506T070809Z.bak"));
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), "original\n");
    assert!(Store::backup_file(&file, at).is_err());
}

#[test]
fn atomic_write_creates_parents() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("deep/er/out.csv")).unwrap();
    Store::write_bytes_atomic(&path, b"class\n5\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "class\n5\n");
    Store::write_bytes_atomic(&path, b"class\n2\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "class\n2\n");
}

#[cfg(unix)]
#[test]
fn symlink_loops_are_not_followed() {
    let temp = tempfile::tempdir().unwrap();
    let input = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    std::fs::write(input.join("a.csv"), "label_name\nAcari\n").unwrap();
    std::os::unix::fs::symlink(".", input.join("loop")).unwrap();

    let store = Store::new(input, OutputTarget::InPlace).unwrap();
    let files = store.discover().unwrap();
    let relative: Vec<_> = files.iter().map(|file| file.relative.as_str()).collect();
    assert_eq!(relative, vec!["a.csv"]);
}
