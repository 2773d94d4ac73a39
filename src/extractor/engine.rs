use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, ProbeError, ToolError};
use crate::media::ffmpeg::{self, StreamSelector};
use crate::media::{select_best, srt, TrackLister};
use crate::tools::{CommandRunner, ToolKind};

use super::{track_file_name, ExtractionOutcome, ExtractionRequest, Strategy};

/// Result of one strategy. The outer `Result` of the async helpers carries
/// tool outages, which end the whole request.
type Attempt = Result<(), ExtractionError>;

/// Extracts subtitle tracks to SRT, falling back through [`Strategy::ORDER`].
pub struct SubtitleExtractor<R> {
    runner: Arc<R>,
    lister: TrackLister<R>,
    config: ExtractionConfig,
}

impl<R: CommandRunner> SubtitleExtractor<R> {
    pub fn new(runner: Arc<R>, config: ExtractionConfig) -> Self {
        let lister = TrackLister::new(runner.clone(), config.probe_timeout());
        Self {
            runner,
            lister,
            config,
        }
    }

    /// Runs the strategies in order until one yields a usable file.
    ///
    /// Returns `Err` only when a tool cannot be provisioned. Invalid output
    /// left behind by a failed attempt is removed before the next one.
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ToolError> {
        info!(
            source = %request.source.display(),
            destination = %request.destination.display(),
            track = ?request.track_index,
            "Extracting subtitles"
        );

        let mut failures = Vec::new();
        for strategy in Strategy::ORDER {
            let attempt = match strategy {
                Strategy::ResolvedTrack => self.try_resolved_track(request).await?,
                Strategy::FirstTrack => self.try_first_track(request).await?,
                Strategy::StreamScan => self.try_stream_scan(request).await?,
            };

            match attempt {
                Ok(()) => {
                    info!(
                        strategy = %strategy,
                        path = %request.destination.display(),
                        "Subtitles extracted"
                    );
                    return Ok(ExtractionOutcome::Extracted {
                        path: request.destination.clone(),
                        strategy,
                    });
                }
                Err(e) => {
                    warn!(strategy = %strategy, reason = %e, "Extraction strategy failed");
                    failures.push(format!("{}: {}", strategy, e));
                }
            }
        }

        error!(
            source = %request.source.display(),
            "All extraction strategies failed"
        );
        Ok(ExtractionOutcome::Failed {
            reason: failures.join("; "),
        })
    }

    async fn try_resolved_track(&self, request: &ExtractionRequest) -> Result<Attempt, ToolError> {
        let ordinal = match request.track_index {
            Some(n) => n,
            None => {
                let tracks = self.lister.list_subtitle_tracks(&request.source).await;
                let languages = request
                    .preferred_languages
                    .as_deref()
                    .unwrap_or(&self.config.preferred_languages);
                match select_best(&tracks, languages) {
                    Some(track) => {
                        debug!(
                            index = track.index,
                            language = %track.language,
                            title = %track.title,
                            "Selected subtitle track"
                        );
                        track.index
                    }
                    None => return Ok(Err(ExtractionError::NoTrackSelected)),
                }
            }
        };

        self.run_extraction(
            &request.source,
            &request.destination,
            StreamSelector::Subtitle(ordinal),
            self.config.extract_timeout(),
        )
        .await
    }

    async fn try_first_track(&self, request: &ExtractionRequest) -> Result<Attempt, ToolError> {
        self.run_extraction(
            &request.source,
            &request.destination,
            StreamSelector::Subtitle(0),
            self.config.extract_timeout(),
        )
        .await
    }

    async fn try_stream_scan(&self, request: &ExtractionRequest) -> Result<Attempt, ToolError> {
        let indices = match self.lister.scan_stream_indices(&request.source).await {
            Ok(indices) => indices,
            Err(ProbeError::Tool(e)) => return Err(e),
            Err(ProbeError::TimedOut(detail)) => return Ok(Err(ExtractionError::TimedOut(detail))),
            Err(e) => return Ok(Err(ExtractionError::CommandFailed(e.to_string()))),
        };
        if indices.is_empty() {
            return Ok(Err(ExtractionError::NoStreams));
        }

        let mut last = ExtractionError::NoStreams;
        for index in indices {
            let attempt = self
                .run_extraction(
                    &request.source,
                    &request.destination,
                    StreamSelector::Absolute(index),
                    self.config.scan_timeout(),
                )
                .await?;

            match attempt {
                Ok(()) if srt::looks_like_srt(&request.destination) => {
                    debug!(stream = index, "Stream converted to SRT");
                    return Ok(Ok(()));
                }
                Ok(()) => {
                    debug!(stream = index, "Stream output is not SRT");
                    discard_artifact(&request.destination);
                    last = ExtractionError::NotSrt(request.destination.clone());
                }
                Err(e) => {
                    debug!(stream = index, reason = %e, "Stream did not convert");
                    last = e;
                }
            }
        }

        Ok(Err(last))
    }

    /// Runs one ffmpeg extraction and checks for a non-empty output file.
    async fn run_extraction(
        &self,
        source: &Path,
        destination: &Path,
        selector: StreamSelector,
        timeout: Duration,
    ) -> Result<Attempt, ToolError> {
        let args = ffmpeg::extract_args(source, selector, destination);
        let output = self.runner.run(ToolKind::Ffmpeg, &args, timeout).await?;

        if output.timed_out {
            discard_artifact(destination);
            return Ok(Err(ExtractionError::TimedOut(format!(
                "map {} after {}s",
                selector,
                timeout.as_secs()
            ))));
        }
        if !output.success {
            discard_artifact(destination);
            return Ok(Err(ExtractionError::CommandFailed(format!(
                "map {}: {}",
                selector,
                output.last_error_line()
            ))));
        }

        match std::fs::metadata(destination) {
            Err(_) => Ok(Err(ExtractionError::Missing(destination.to_path_buf()))),
            Ok(meta) if meta.len() == 0 => {
                discard_artifact(destination);
                Ok(Err(ExtractionError::Empty(destination.to_path_buf())))
            }
            Ok(_) => Ok(Ok(())),
        }
    }

    /// Extracts every listed track into `output_dir`.
    ///
    /// Each track goes to its own file named by [`track_file_name`]; a
    /// repeated name gets the track ordinal appended, then a counter until
    /// it is unique. Returns the files that were written.
    pub async fn extract_all(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ToolError> {
        let tracks = self.lister.list_subtitle_tracks(video).await;
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "subtitles".to_string());

        let mut used = HashSet::new();
        let mut written = Vec::new();
        for track in &tracks {
            let name = unique_name(
                &mut used,
                track_file_name(&stem, &track.language, &track.title),
                track.index,
            );
            let destination = output_dir.join(&name);

            let attempt = self
                .run_extraction(
                    video,
                    &destination,
                    StreamSelector::Subtitle(track.index),
                    self.config.extract_timeout(),
                )
                .await?;

            match attempt {
                Ok(()) => {
                    info!(track = track.index, path = %destination.display(), "Track extracted");
                    written.push(destination);
                }
                Err(e) => warn!(track = track.index, reason = %e, "Track extraction failed"),
            }
        }

        Ok(written)
    }
}

/// Claims `name` in `used`, appending the ordinal and then a counter on collision.
fn unique_name(used: &mut HashSet<String>, name: String, ordinal: usize) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let base = name.trim_end_matches(".srt");
    let mut candidate = format!("{}_{}.srt", base, ordinal);
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}_{}.srt", base, ordinal, counter);
        counter += 1;
    }
    candidate
}

/// Removes a failed attempt's output so a later attempt starts clean.
fn discard_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed invalid output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove invalid output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::runner::fake::{failed, ok, ScriptedRunner};
    use crate::tools::CommandOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CUE: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n";

    const ONE_ENGLISH_TRACK: &str = r#"{"streams": [
        {"index": 2, "codec_name": "subrip", "codec_type": "subtitle", "tags": {"language": "eng"}}
    ]}"#;

    const NO_SUBTITLE_DUMP: &str = "\
  Stream #0:0: Video: h264, yuv420p, 1920x1080
  Stream #0:1(eng): Audio: aac, 48000 Hz, stereo
  Stream #0:2: Attachment: ttf
  Stream #0:3: Data: bin_data
";

    fn map_of(args: &[String]) -> Option<&str> {
        let at = args.iter().position(|a| a == "-map")?;
        args.get(at + 1).map(String::as_str)
    }

    fn write_output(args: &[String], content: &str) {
        std::fs::write(args.last().unwrap(), content).unwrap();
    }

    fn extractor(runner: Arc<ScriptedRunner>) -> SubtitleExtractor<ScriptedRunner> {
        SubtitleExtractor::new(runner, ExtractionConfig::default())
    }

    #[tokio::test]
    async fn english_track_is_extracted_directly() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|tool, args| match tool {
            ToolKind::Ffprobe => ok(ONE_ENGLISH_TRACK, ""),
            ToolKind::Ffmpeg => {
                write_output(args, CUE);
                ok("", "")
            }
        }));
        let request = ExtractionRequest::new("movie.mkv", dir.path().join("movie_eng.srt"));

        let outcome = extractor(runner.clone()).extract(&request).await.unwrap();
        assert_eq!(
            outcome,
            ExtractionOutcome::Extracted {
                path: dir.path().join("movie_eng.srt"),
                strategy: Strategy::ResolvedTrack,
            }
        );
        assert!(srt::verify(&request.destination).is_valid);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(map_of(&calls[1].1), Some("0:s:0"));
    }

    #[tokio::test]
    async fn out_of_range_track_falls_back_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_, args| match map_of(args) {
            Some("0:s:5") => failed("Stream map '0:s:5' matches no streams."),
            Some(_) => {
                write_output(args, CUE);
                ok("", "")
            }
            None => failed(""),
        }));
        let request = ExtractionRequest::new("movie.mkv", dir.path().join("out.srt")).with_track(5);

        let outcome = extractor(runner.clone()).extract(&request).await.unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::Extracted {
                strategy: Strategy::FirstTrack,
                ..
            }
        ));
        // An explicit index never consults the lister.
        assert!(runner.calls().iter().all(|(tool, _)| *tool == ToolKind::Ffmpeg));
    }

    #[tokio::test]
    async fn stream_scan_finds_late_stream_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("movie_eng.srt");
        let scanned = Arc::new(AtomicUsize::new(0));
        let counter = scanned.clone();
        let expected = destination.clone();

        let runner = Arc::new(ScriptedRunner::new(move |tool, args| {
            if tool == ToolKind::Ffprobe {
                return failed("Invalid data found when processing input");
            }
            match map_of(args) {
                None => failed(NO_SUBTITLE_DUMP),
                Some("0:s:0") => failed("Stream map '0:s:0' matches no streams."),
                Some(map) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    // Output of the previous stream must be gone by now.
                    assert!(!expected.exists(), "stale artifact before {}", map);
                    if map == "0:3" {
                        write_output(args, CUE);
                    } else {
                        write_output(args, "\u{0}\u{1}garbage");
                    }
                    ok("", "")
                }
            }
        }));
        let request = ExtractionRequest::new("movie.mkv", &destination);

        let outcome = extractor(runner).extract(&request).await.unwrap();
        assert_eq!(
            outcome,
            ExtractionOutcome::Extracted {
                path: destination.clone(),
                strategy: Strategy::StreamScan,
            }
        );
        assert_eq!(scanned.load(Ordering::SeqCst), 4);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), CUE);
    }

    #[tokio::test]
    async fn empty_output_is_never_success() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.srt");
        let runner = Arc::new(ScriptedRunner::new(|tool, args| match tool {
            ToolKind::Ffprobe => ok(ONE_ENGLISH_TRACK, ""),
            ToolKind::Ffmpeg if map_of(args).is_none() => failed(NO_SUBTITLE_DUMP),
            ToolKind::Ffmpeg => {
                write_output(args, "");
                ok("", "")
            }
        }));
        let request = ExtractionRequest::new("movie.mkv", &destination);

        let outcome = extractor(runner).extract(&request).await.unwrap();
        match outcome {
            ExtractionOutcome::Failed { reason } => {
                assert!(reason.contains("resolved track"));
                assert!(reason.contains("first track"));
                assert!(reason.contains("stream scan"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn repeated_extraction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|tool, args| match tool {
            ToolKind::Ffprobe => ok(ONE_ENGLISH_TRACK, ""),
            ToolKind::Ffmpeg => {
                write_output(args, CUE);
                ok("", "")
            }
        }));
        let extractor = extractor(runner);
        let request = ExtractionRequest::new("movie.mkv", dir.path().join("movie_eng.srt"));

        let first = extractor.extract(&request).await.unwrap();
        let second = extractor.extract(&request).await.unwrap();
        assert_eq!(first, second);
        assert!(srt::verify(&request.destination).is_valid);
    }

    #[tokio::test]
    async fn tool_outage_aborts_request() {
        let runner = Arc::new(ScriptedRunner::new(|tool, _| {
            Err(ToolError::Unavailable {
                tool,
                reason: "no binary".to_string(),
            })
        }));
        let request = ExtractionRequest::new("movie.mkv", "movie_eng.srt");

        let err = extractor(runner).extract(&request).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn extract_all_names_each_track() {
        let dir = tempfile::tempdir().unwrap();
        let listing = r#"{"streams": [
            {"index": 2, "codec_name": "subrip", "codec_type": "subtitle", "tags": {"language": "eng"}},
            {"index": 3, "codec_name": "subrip", "codec_type": "subtitle", "tags": {"language": "eng"}},
            {"index": 4, "codec_name": "ass", "codec_type": "subtitle",
             "tags": {"language": "jpn", "title": "Signs: Songs?"}},
            {"index": 5, "codec_name": "hdmv_pgs_subtitle", "codec_type": "subtitle"}
        ]}"#;
        let runner = Arc::new(ScriptedRunner::new(move |tool, args| match tool {
            ToolKind::Ffprobe => ok(listing, ""),
            ToolKind::Ffmpeg if map_of(args) == Some("0:s:3") => {
                failed("Subtitle encoding currently only possible from text to text")
            }
            ToolKind::Ffmpeg => {
                write_output(args, CUE);
                ok("", "")
            }
        }));

        let written = extractor(runner)
            .extract_all(Path::new("/videos/movie.mkv"), dir.path())
            .await
            .unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            ["movie_eng.srt", "movie_eng_1.srt", "movie_jpn_Signs Songs.srt"]
        );
    }

    #[tokio::test]
    async fn extract_all_never_reuses_a_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let listing = r#"{"streams": [
            {"index": 2, "codec_name": "subrip", "codec_type": "subtitle", "tags": {"language": "eng"}},
            {"index": 3, "codec_name": "subrip", "codec_type": "subtitle",
             "tags": {"language": "eng", "title": "2"}},
            {"index": 4, "codec_name": "subrip", "codec_type": "subtitle", "tags": {"language": "eng"}}
        ]}"#;
        let runner = Arc::new(ScriptedRunner::new(move |tool, args| match tool {
            ToolKind::Ffprobe => ok(listing, ""),
            ToolKind::Ffmpeg => {
                write_output(args, CUE);
                ok("", "")
            }
        }));

        let written = extractor(runner)
            .extract_all(Path::new("/videos/movie.mkv"), dir.path())
            .await
            .unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["movie_eng.srt", "movie_eng_2.srt", "movie_eng_2_2.srt"]);
    }

    #[test]
    fn unique_name_counts_past_taken_names() {
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "a_eng.srt".into(), 1), "a_eng.srt");
        assert_eq!(unique_name(&mut used, "a_eng_1.srt".into(), 0), "a_eng_1.srt");
        assert_eq!(unique_name(&mut used, "a_eng.srt".into(), 1), "a_eng_1_2.srt");
        assert_eq!(unique_name(&mut used, "a_eng.srt".into(), 1), "a_eng_1_3.srt");
    }

    #[tokio::test]
    async fn timeouts_are_reported_and_partial_output_removed() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("movie_eng.srt");
        let runner = Arc::new(ScriptedRunner::new(|tool, args| match tool {
            ToolKind::Ffprobe => ok(ONE_ENGLISH_TRACK, ""),
            ToolKind::Ffmpeg if map_of(args).is_none() => {
                Ok(CommandOutput::timed_out(Duration::from_secs(30)))
            }
            ToolKind::Ffmpeg => {
                write_output(args, "1\n00:00:01,000 --> ");
                Ok(CommandOutput::timed_out(Duration::from_secs(120)))
            }
        }));
        let request = ExtractionRequest::new("movie.mkv", &destination);

        let outcome = extractor(runner).extract(&request).await.unwrap();
        let reason = match outcome {
            ExtractionOutcome::Failed { reason } => reason,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert!(
            reason.starts_with("resolved track: ffmpeg timed out: map 0:s:0 after 120s"),
            "{}",
            reason
        );
        assert!(reason.contains("first track: ffmpeg timed out"));
        assert!(reason.contains("stream scan: ffmpeg timed out: stream dump after 30s"));
        assert!(!destination.exists());
    }
}
