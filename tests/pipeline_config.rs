use std::path::Path;

use subtitle_pipeline::batch::{subtitle_path, InputScanner};
use subtitle_pipeline::config::loader;
use subtitle_pipeline::media::srt;
use subtitle_pipeline::validation::validate_config;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn config_file_drives_scanning_and_naming() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pipeline.yaml");
    let cache_dir = dir.path().join("cache");
    write(
        &config_path,
        &format!(
            "tools:\n  cache_dir: {}\nextraction:\n  preferred_languages: [eng, jpn]\n  output_suffix: _en\nbatch:\n  file_patterns: [\"*.mkv\", \"*.mp4\"]\n  recursive: true\n",
            cache_dir.display()
        ),
    );

    let config = loader::load_and_validate(&config_path).unwrap();
    assert_eq!(config.extraction.preferred_languages, ["eng", "jpn"]);
    assert!(cache_dir.is_dir());

    let videos = dir.path().join("videos");
    write(&videos.join("a.mkv"), "");
    write(&videos.join("nested").join("b.MP4"), "");
    write(&videos.join("c.avi"), "");

    let inputs = InputScanner::new(&config.batch)
        .unwrap()
        .scan(&videos)
        .unwrap();
    assert_eq!(inputs.len(), 2);

    let srt_path = subtitle_path(&inputs[0], None, &config.extraction.output_suffix);
    assert_eq!(srt_path, videos.join("a_en.srt"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pipeline.yaml");
    write(
        &config_path,
        "extraction:\n  extract_timeout_secs: 0\n  output_suffix: ../escape\n",
    );

    assert!(loader::load_and_validate(&config_path).is_err());

    let config = loader::load_or_default(&config_path).unwrap();
    let result = validate_config(&config);
    assert_eq!(result.error_count(), 2);
}

#[test]
fn srt_check_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.srt");
    let short = dir.path().join("short.srt");
    write(
        &good,
        "1\n00:00:01,000 --> 00:00:02,500\nHello there.\n\n2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi.\n",
    );
    write(&short, "1\n00:00:01,000 --> 00:00:02,500\n");

    let check = srt::verify(&good);
    assert!(check.is_valid);
    assert_eq!(check.line_count, 7);

    let check = srt::verify(&short);
    assert!(!check.is_valid);
    assert_eq!(check.line_count, 2);
}
