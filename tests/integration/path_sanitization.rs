use chrono::{TimeZone, Utc};
use mailbox_archiver::output::path::{record_dir_name, MAX_NAME_BYTES};
use mailbox_archiver::output::{sanitize_filename, sanitize_subject, RecordPathBuilder};
use mailbox_archiver::ItemDetail;
use tempfile::TempDir;

const SAMPLES: &[&str] = &[
    "",
    "   ",
    "...",
    "Quarterly report",
    "Re: Fwd: <urgent> \"budget\"",
    "a/b\\c|d?e*f",
    "line\nbreak\ttab\u{7}bell",
    " . leading and trailing . ",
    "🎉🎉🎉 party",
    "日本語の件名です",
    "ends with dots...",
];

#[test]
fn subject_sanitization_is_idempotent() {
    let long = "x. ".repeat(40);
    let emoji = "🎉".repeat(30);
    let samples = SAMPLES
        .iter()
        .copied()
        .chain([long.as_str(), emoji.as_str()]);

    for sample in samples {
        for max in [7, 13, 50, 255] {
            let once = sanitize_subject(sample, max);
            let twice = sanitize_subject(&once, max);
            assert_eq!(once, twice, "input {sample:?} max {max}");
            assert!(!once.is_empty());
        }
    }
}

#[test]
fn sanitized_subjects_contain_no_path_separators_or_controls() {
    for sample in SAMPLES {
        let clean = sanitize_subject(sample, 50);
        assert!(!clean.contains('/'), "{clean:?}");
        assert!(!clean.contains('\\'), "{clean:?}");
        assert!(!clean.chars().any(char::is_control), "{clean:?}");
        assert!(!clean.starts_with('.') && !clean.ends_with('.'), "{clean:?}");
        assert!(clean.len() <= 50);
    }
}

#[test]
fn four_byte_subjects_fit_name_limit_and_create_on_disk() {
    let temp = TempDir::new().unwrap();
    let builder = RecordPathBuilder::new(temp.path());
    let timestamp = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();

    for len in [1, 12, 13, 50, 200] {
        let detail = ItemDetail::new(
            format!("{}{}", "𝄞".repeat(len), len),
            "😀".repeat(len),
            timestamp,
        );
        let name = record_dir_name(&detail);
        assert!(name.len() <= MAX_NAME_BYTES, "{} bytes", name.len());
        assert!(name.starts_with("235959_"));

        let path = builder.build(&detail);
        std::fs::create_dir_all(&path).unwrap();
        assert!(path.is_dir());
    }
}

#[test]
fn date_directories_use_utc_calendar() {
    let builder = RecordPathBuilder::new("/archive");
    let timestamp = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 1).unwrap();
    assert_eq!(
        builder.date_dir(&timestamp),
        std::path::PathBuf::from("/archive/2024/02/29")
    );
}

#[test]
fn attachment_names_keep_extension_when_truncated() {
    let name = format!("{}.pdf", "r".repeat(300));
    let clean = sanitize_filename(&name, 200);
    assert!(clean.len() <= 200);
    assert!(clean.ends_with(".pdf"));

    assert_eq!(sanitize_filename("../../etc/passwd", 200), "_.._etc_passwd");
    assert_eq!(sanitize_filename("   ", 200), "attachment");
}
