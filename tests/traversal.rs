use std::path::Path;

use zipline::zip::{EntryHeader, ZipWriter};
use zipline::{Error, extract_archive, inspect};

/// Write an archive whose entry names are taken verbatim.
async fn craft_archive(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = ZipWriter::new(Vec::<u8>::new());
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(EntryHeader::directory(*name)).await.unwrap();
        } else {
            let mut data = data.as_bytes();
            writer
                .add_file(EntryHeader::file(*name), &mut data)
                .await
                .unwrap();
        }
    }
    let bytes = writer.finish().await.unwrap();
    tokio::fs::write(path, bytes).await.unwrap();
}

#[tokio::test]
async fn traversal_entries_are_rejected_and_the_rest_extracted() {
    let scratch = tempfile::tempdir().unwrap();
    let zip_path = scratch.path().join("slip.zip");
    craft_archive(
        &zip_path,
        &[
            ("good.txt", "good"),
            ("../evil.txt", "evil"),
            ("nested/../../evil2.txt", "evil"),
            ("sub/", ""),
            ("sub/ok.txt", "ok"),
            ("sub/../../out-sibling/evil3.txt", "evil"),
        ],
    )
    .await;

    let stats = inspect(&zip_path).await.unwrap();
    assert_eq!(stats.entry_count, 6);

    let dest = scratch.path().join("out");
    let report = extract_archive(&zip_path, &dest, stats.entry_count, 0o755)
        .wait()
        .await;

    assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    for err in &report.errors {
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!err.is_fatal());
    }
    assert_eq!(report.processed.len(), 3);

    assert!(!scratch.path().join("evil.txt").exists());
    assert!(!scratch.path().join("evil2.txt").exists());
    assert!(!scratch.path().join("out-sibling").exists());
    assert_eq!(std::fs::read(dest.join("good.txt")).unwrap(), b"good");
    assert_eq!(std::fs::read(dest.join("sub/ok.txt")).unwrap(), b"ok");
}

#[tokio::test]
async fn entry_aliasing_the_destination_root_is_rejected() {
    let scratch = tempfile::tempdir().unwrap();
    let zip_path = scratch.path().join("alias.zip");
    craft_archive(&zip_path, &[("./", ""), ("kept.txt", "kept")]).await;

    let dest = scratch.path().join("out");
    let report = extract_archive(&zip_path, &dest, 2, 0o755).wait().await;

    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        Error::PathTraversal { entry, .. } => assert_eq!(entry, "./"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(report.processed, [dest.join("kept.txt")]);
}

#[tokio::test]
async fn absolute_entry_names_stay_inside_destination() {
    let scratch = tempfile::tempdir().unwrap();
    let zip_path = scratch.path().join("absolute.zip");
    craft_archive(&zip_path, &[("/etc/zipline-test.txt", "inside")]).await;

    let dest = scratch.path().join("out");
    let report = extract_archive(&zip_path, &dest, 1, 0o755).wait().await;

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(
        std::fs::read(dest.join("etc/zipline-test.txt")).unwrap(),
        b"inside"
    );
}
