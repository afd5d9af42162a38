//! Integration tests for the conversion entry points.
//!
//! Run with:
//!   cargo test --test convert

mod common;

use edgequake_topdf::{
    convert, convert_batch, convert_file, convert_upload, stage_upload, stage_upload_in,
    ConversionConfig, ConversionProgressCallback, FailureKind, FormatTag, ToPdfError,
    UploadedFile,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn config_in(dir: &std::path::Path) -> ConversionConfig {
    ConversionConfig::builder()
        .output_dir(dir.join("pdfs"))
        .build()
        .unwrap()
}

// ── Single files ─────────────────────────────────────────────────────────────

#[test]
fn docx_paragraphs_become_text_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(
        dir.path(),
        "letter.docx",
        &common::docx(&["Dear reader", "", "Kind regards"]),
    );
    let output = dir.path().join("letter.pdf");

    let out = convert_file(&input, &output, "letter.docx", &ConversionConfig::default()).unwrap();

    assert_eq!(out.format, FormatTag::WordProcessing);
    assert_eq!(out.renderer, "docx");
    assert_eq!(out.stats.pages, Some(1));
    // The blank paragraph is skipped.
    assert_eq!(out.stats.blocks, 2);
    assert_eq!(common::page_count(&output), 1);
    let text = common::page_text(&output, 1);
    assert!(text.contains("Dear"), "got: {text:?}");
    assert!(text.contains("regards"), "got: {text:?}");
}

#[test]
fn png_becomes_a_single_page() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "scan.png", &common::png(400, 300));
    let output = dir.path().join("scan.pdf");

    let out = convert_file(&input, &output, "scan.png", &ConversionConfig::default()).unwrap();

    assert_eq!(out.format, FormatTag::Image);
    assert_eq!(out.stats.pages, Some(1));
    assert_eq!(common::page_count(&output), 1);
    assert_eq!(out.stats.output_bytes, std::fs::metadata(&output).unwrap().len());
}

#[test]
fn spreadsheet_becomes_a_grid() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(
        dir.path(),
        "budget.xlsx",
        &common::xlsx(&[&["Item", "Cost"], &["Paper", "12"], &["Ink", "30"]]),
    );
    let output = dir.path().join("budget.pdf");

    let out = convert_file(&input, &output, "budget.xlsx", &ConversionConfig::default()).unwrap();

    assert_eq!(out.format, FormatTag::Tabular);
    assert_eq!(out.renderer, "table");
    assert_eq!(out.stats.blocks, 6);
    assert_eq!(common::page_count(&output), 1);
    let text = common::page_text(&output, 1);
    assert!(text.contains("Paper"), "got: {text:?}");
}

#[test]
fn long_spreadsheet_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<Vec<String>> = std::iter::once(vec!["n".to_string()])
        .chain((1..=60).map(|i| vec![i.to_string()]))
        .collect();
    let row_refs: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let slices: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();
    let input = common::write(dir.path(), "long.xlsx", &common::xlsx(&slices));
    let output = dir.path().join("long.pdf");

    let out = convert_file(&input, &output, "long.xlsx", &ConversionConfig::default()).unwrap();

    // 27 rows of 10 mm fit between the top margin and the break trigger.
    assert_eq!(out.stats.pages, Some(3));
    assert_eq!(common::page_count(&output), 3);
}

#[test]
fn declared_name_decides_the_strategy() {
    let dir = tempfile::tempdir().unwrap();
    // On-disk name without extension, as for a staged upload.
    let input = common::write(dir.path(), "blob", &common::png(10, 10));
    let output = dir.path().join("blob.pdf");

    let out = convert_file(&input, &output, "Photo.PNG", &ConversionConfig::default()).unwrap();
    assert_eq!(out.format, FormatTag::Image);
}

#[test]
fn conversion_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "a.docx", &common::docx(&["Same bytes every time"]));
    let first = dir.path().join("first.pdf");
    let second = dir.path().join("second.pdf");
    let config = ConversionConfig::default();

    convert_file(&input, &first, "a.docx", &config).unwrap();
    convert_file(&input, &second, "a.docx", &config).unwrap();

    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[test]
fn unsupported_extension_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "notes.txt", b"plain text");
    let output = dir.path().join("notes.pdf");

    let err = convert_file(&input, &output, "notes.txt", &ConversionConfig::default()).unwrap_err();

    assert!(matches!(err, ToPdfError::UnsupportedFormat { .. }));
    assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
    assert!(!output.exists());
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1, "unexpected files: {names:?}");
}

#[test]
fn corrupt_image_is_a_conversion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "broken.png", b"\x89PNG\r\n\x1a\nnot really");
    let output = dir.path().join("broken.pdf");

    let err = convert_file(&input, &output, "broken.png", &ConversionConfig::default()).unwrap_err();

    assert!(
        matches!(err, ToPdfError::ParseFailure { format: FormatTag::Image, .. }),
        "got: {err:?}"
    );
    assert_eq!(err.kind(), FailureKind::ConversionFailed);
    assert!(!output.exists());
}

#[test]
fn mislabelled_file_fails_in_the_parser() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "fake.docx", &common::png(8, 8));
    let output = dir.path().join("fake.pdf");

    let err = convert_file(&input, &output, "fake.docx", &ConversionConfig::default()).unwrap_err();
    assert!(matches!(err, ToPdfError::ParseFailure { .. }), "got: {err:?}");
    assert!(!output.exists());
}

#[test]
fn content_check_rejects_mislabelled_file_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "fake.xlsx", &common::png(8, 8));
    let output = dir.path().join("fake.pdf");
    let config = ConversionConfig::builder().verify_content(true).build().unwrap();

    let err = convert_file(&input, &output, "fake.xlsx", &config).unwrap_err();
    assert!(
        matches!(err, ToPdfError::ContentMismatch { expected: FormatTag::Tabular, .. }),
        "got: {err:?}"
    );
}

#[test]
fn content_check_accepts_genuine_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder().verify_content(true).build().unwrap();
    let cases = [
        ("a.docx", common::docx(&["x"])),
        ("b.xlsx", common::xlsx(&[&["x"]])),
        ("c.png", common::png(4, 4)),
    ];
    for (name, bytes) in cases {
        let input = common::write(dir.path(), name, &bytes);
        let output = dir.path().join(format!("{name}.pdf"));
        convert_file(&input, &output, name, &config)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[test]
fn failed_conversion_does_not_leave_a_stale_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "empty.xlsx", b"");
    let output = dir.path().join("empty.pdf");
    std::fs::write(&output, b"%PDF-1.4 stale").unwrap();

    assert!(convert_file(&input, &output, "empty.xlsx", &ConversionConfig::default()).is_err());
    assert!(!output.exists());
}

#[test]
fn missing_font_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "a.docx", &common::docx(&["hello"]));
    let config = ConversionConfig::builder()
        .font_dir(dir.path().join("no-fonts-here"))
        .build()
        .unwrap();

    let err = convert_file(&input, &dir.path().join("a.pdf"), "a.docx", &config).unwrap_err();
    assert!(matches!(err, ToPdfError::FontUnavailable { .. }), "got: {err:?}");
}

// ── Async and uploads ────────────────────────────────────────────────────────

#[tokio::test]
async fn staged_upload_is_removed_after_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let upload = UploadedFile {
        filename: "Scan 1.png".into(),
        bytes: common::png(20, 20),
    };
    let staged = stage_upload(&upload).unwrap();
    let staged_path = staged.path().to_path_buf();
    assert!(staged_path.exists());

    let out = edgequake_topdf::convert_staged(staged, &upload.filename, &config)
        .await
        .unwrap();

    assert!(!staged_path.exists());
    assert!(out.output_path.starts_with(&config.output_dir));
    let name = out.output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Scan_1-"), "got: {name}");
}

#[tokio::test]
async fn staged_upload_is_removed_after_failed_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    for (name, bytes) in [
        ("broken.png", b"\x89PNG\r\n\x1a\nnot really".to_vec()),
        ("broken.docx", b"not a zip archive".to_vec()),
    ] {
        let upload = UploadedFile {
            filename: name.into(),
            bytes,
        };
        let staged = stage_upload_in(&upload, &dir.path().join("staging")).unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());

        let err = edgequake_topdf::convert_staged(staged, &upload.filename, &config)
            .await
            .unwrap_err();

        assert!(matches!(err, ToPdfError::ParseFailure { .. }), "{name}: {err:?}");
        assert!(!staged_path.exists(), "{name}: staged input left behind");
    }
    let leftovers = std::fs::read_dir(&config.output_dir)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn failed_upload_leaves_staging_dir_empty() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let config = ConversionConfig::builder()
        .output_dir(dir.path().join("pdfs"))
        .staging_dir(&staging)
        .build()
        .unwrap();

    let err = convert_upload(
        UploadedFile {
            filename: "report.docx".into(),
            bytes: b"garbage".to_vec(),
        },
        &config,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ConversionFailed);
    assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
}

#[tokio::test]
async fn unsupported_upload_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let err = convert_upload(
        UploadedFile {
            filename: "archive.zip".into(),
            bytes: b"PK\x03\x04".to_vec(),
        },
        &config,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
    assert!(!config.output_dir.exists());
}

#[tokio::test]
async fn concurrent_uploads_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let jobs = (0..8).map(|i| {
        let config = config.clone();
        tokio::spawn(async move {
            convert_upload(
                UploadedFile {
                    filename: "same-name.docx".into(),
                    bytes: common::docx(&[format!("document number {i}").as_str()]),
                },
                &config,
            )
            .await
        })
    });
    let outputs: Vec<_> = futures::future::join_all(jobs)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let mut paths: Vec<_> = outputs.iter().map(|o| o.output_path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8);
    for (i, output) in outputs.iter().enumerate() {
        assert_eq!(common::page_count(&output.output_path), 1);
        let text = common::page_text(&output.output_path, 1);
        assert!(
            text.contains(&format!("number {i}")),
            "output {i} holds {text:?}"
        );
    }
}

#[tokio::test]
async fn async_convert_matches_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write(dir.path(), "t.xlsx", &common::xlsx(&[&["a", "b"], &["1", "2"]]));
    let sync_out = dir.path().join("sync.pdf");
    let async_out = dir.path().join("async.pdf");
    let config = ConversionConfig::default();

    convert_file(&input, &sync_out, "t.xlsx", &config).unwrap();
    convert(&input, &async_out, "t.xlsx", &config).await.unwrap();

    assert_eq!(std::fs::read(sync_out).unwrap(), std::fs::read(async_out).unwrap());
}

// ── Batches ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: Mutex<Vec<String>>,
    finished: Mutex<Option<(usize, usize)>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_file_start(&self, _index: usize, _total: usize, _name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_complete(&self, _index: usize, _total: usize, _name: &str, _bytes: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_error(&self, _index: usize, _total: usize, name: &str, _error: &str) {
        self.failed.lock().unwrap().push(name.to_string());
    }
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        *self.finished.lock().unwrap() = Some((total, succeeded));
    }
}

#[tokio::test]
async fn batch_reports_each_file_in_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .output_dir(dir.path().join("pdfs"))
        .concurrency(2)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let inputs: Vec<PathBuf> = vec![
        common::write(dir.path(), "one.docx", &common::docx(&["one"])),
        common::write(dir.path(), "two.png", &common::png(5, 5)),
        common::write(dir.path(), "three.txt", b"nope"),
        common::write(dir.path(), "four.xlsx", &common::xlsx(&[&["h"], &["v"]])),
    ];

    let results = convert_batch(&inputs, &config).await;

    assert_eq!(results.len(), 4);
    for (result, input) in results.iter().zip(&inputs) {
        assert_eq!(&result.input, input);
    }
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(!results[2].is_ok());
    assert!(results[3].is_ok());
    assert!(dir.path().join("pdfs/one.pdf").exists());
    assert!(dir.path().join("pdfs/four.pdf").exists());
    // Inputs are untouched.
    assert!(inputs.iter().all(|p| p.exists()));

    assert_eq!(recorder.started.load(Ordering::SeqCst), 4);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 3);
    assert_eq!(*recorder.failed.lock().unwrap(), vec!["three.txt".to_string()]);
    assert_eq!(*recorder.finished.lock().unwrap(), Some((4, 3)));
}
