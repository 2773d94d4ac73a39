//! Listing the subtitle streams of a container.
//!
//! A structured ffprobe listing is tried first. When that fails the ffmpeg
//! stream table is scraped instead.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::tools::{CommandRunner, ToolKind};

use super::ffmpeg;
use super::subtitle::SubtitleTrack;

fn subtitle_stream_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Stream\s+#\d+:(\d+)(?:\[\w+\])?(?:\((\w+)\))?\s*:\s*Subtitle:\s*(\w+)")
            .expect("subtitle stream pattern is valid")
    })
}

fn any_stream_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Stream\s+#\d+:(\d+)").expect("stream pattern is valid"))
}

/// Lists subtitle tracks through a [`CommandRunner`].
pub struct TrackLister<R> {
    runner: Arc<R>,
    timeout: Duration,
}

impl<R: CommandRunner> TrackLister<R> {
    pub fn new(runner: Arc<R>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Lists the subtitle tracks of `video`.
    ///
    /// Never fails: when neither strategy works the listing is empty and
    /// the reason is logged.
    pub async fn list_subtitle_tracks(&self, video: &Path) -> Vec<SubtitleTrack> {
        match self.probe_structured(video).await {
            Ok(tracks) => {
                info!(file = %video.display(), count = tracks.len(), "Listed subtitle tracks");
                return tracks;
            }
            Err(e) => warn!(
                file = %video.display(),
                error = %e,
                "Structured probe failed, falling back to stream dump"
            ),
        }

        match self.probe_stream_dump(video).await {
            Ok(tracks) => {
                info!(
                    file = %video.display(),
                    count = tracks.len(),
                    "Listed subtitle tracks from stream dump"
                );
                tracks
            }
            Err(e) => {
                warn!(file = %video.display(), error = %e, "No subtitle tracks could be listed");
                Vec::new()
            }
        }
    }

    async fn probe_structured(&self, video: &Path) -> Result<Vec<SubtitleTrack>, ProbeError> {
        let args = ffmpeg::structured_probe_args(video);
        let output = self.runner.run(ToolKind::Ffprobe, &args, self.timeout).await?;

        if output.timed_out {
            return Err(ProbeError::TimedOut(output.stderr));
        }
        if !output.success {
            return Err(ProbeError::CommandFailed(output.last_error_line().to_string()));
        }

        parse_structured(&output.stdout)
    }

    async fn probe_stream_dump(&self, video: &Path) -> Result<Vec<SubtitleTrack>, ProbeError> {
        let args = ffmpeg::stream_dump_args(video);
        let output = self.runner.run(ToolKind::Ffmpeg, &args, self.timeout).await?;

        // `ffmpeg -i` without an output always exits non-zero.
        if output.timed_out {
            return Err(ProbeError::TimedOut(output.stderr));
        }

        let tracks = parse_stream_dump(&output.combined());
        if tracks.is_empty() {
            return Err(ProbeError::NoMatches);
        }
        Ok(tracks)
    }

    /// Returns every absolute stream index in `video`, ascending.
    ///
    /// A stream dump that hits the timeout is `ProbeError::TimedOut`; an
    /// unavailable tool is `ProbeError::Tool`.
    pub async fn scan_stream_indices(&self, video: &Path) -> Result<Vec<usize>, ProbeError> {
        let args = ffmpeg::stream_dump_args(video);
        let output = self.runner.run(ToolKind::Ffmpeg, &args, self.timeout).await?;
        if output.timed_out {
            warn!(
                file = %video.display(),
                timeout_secs = self.timeout.as_secs(),
                "Stream scan timed out"
            );
            return Err(ProbeError::TimedOut(format!(
                "stream dump after {}s",
                self.timeout.as_secs()
            )));
        }
        let indices = parse_stream_indices(&output.combined());
        debug!(file = %video.display(), ?indices, "Scanned stream indices");
        Ok(indices)
    }
}

/// Parses `ffprobe -print_format json -show_streams` output.
///
/// Empty output is an empty listing. Non-subtitle streams and streams
/// without an index are skipped.
pub fn parse_structured(stdout: &str) -> Result<Vec<SubtitleTrack>, ProbeError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let json: serde_json::Value =
        serde_json::from_str(stdout).map_err(|e| ProbeError::ParseFailed(e.to_string()))?;

    let Some(streams) = json.get("streams") else {
        return Ok(Vec::new());
    };
    let streams = streams
        .as_array()
        .ok_or_else(|| ProbeError::ParseFailed("'streams' is not an array".to_string()))?;

    let mut tracks = Vec::new();
    for stream in streams {
        if stream.get("codec_type").and_then(|v| v.as_str()) != Some("subtitle") {
            continue;
        }
        let Some(stream_index) = stream.get("index").and_then(|v| v.as_u64()) else {
            debug!("Skipping subtitle stream without an index");
            continue;
        };

        let tags = stream.get("tags");
        let tag = |key: &str| {
            tags.and_then(|t| t.get(key).or_else(|| t.get(key.to_uppercase())))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        };

        let mut track = SubtitleTrack::new(tracks.len(), stream_index as usize);
        if let Some(language) = tag("language") {
            track = track.with_language(language);
        }
        if let Some(codec) = stream.get("codec_name").and_then(|v| v.as_str()) {
            track = track.with_codec(codec);
        }
        if let Some(title) = tag("title") {
            track = track.with_title(title);
        }
        tracks.push(track);
    }

    Ok(tracks)
}

/// Scrapes subtitle streams from the `ffmpeg -i` stream table.
pub fn parse_stream_dump(text: &str) -> Vec<SubtitleTrack> {
    subtitle_stream_line()
        .captures_iter(text)
        .enumerate()
        .filter_map(|(i, caps)| {
            let stream_index = caps.get(1)?.as_str().parse().ok()?;
            let mut track = SubtitleTrack::new(i, stream_index).with_codec(&caps[3]);
            if let Some(language) = caps.get(2) {
                track = track.with_language(language.as_str());
            }
            Some(track)
        })
        .collect()
}

/// Collects every `Stream #n:k` index, ascending and de-duplicated.
pub fn parse_stream_indices(text: &str) -> Vec<usize> {
    any_stream_line()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect::<BTreeSet<usize>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::CommandOutput;
    use crate::tools::runner::fake::{failed, ok, ScriptedRunner};

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 2, "codec_name": "subrip", "codec_type": "subtitle",
             "tags": {"language": "jpn", "title": "Japanese"}},
            {"index": 3, "codec_name": "ass", "codec_type": "subtitle",
             "tags": {"language": "eng"}},
            {"index": 4, "codec_name": "hdmv_pgs_subtitle", "codec_type": "subtitle"}
        ]
    }"#;

    const STREAM_DUMP: &str = "\
Input #0, matroska,webm, from 'movie.mkv':
  Duration: 00:23:40.02, start: 0.000000, bitrate: 2112 kb/s
  Stream #0:0: Video: hevc (Main 10), yuv420p10le(tv), 1920x1080, 23.98 fps
  Stream #0:1(jpn): Audio: opus, 48000 Hz, stereo, fltp (default)
  Stream #0:2(eng): Subtitle: ass (default)
  Stream #0:3: Subtitle: subrip
  Stream #0:4[0x1200](ger): Subtitle: dvb_subtitle
At least one output file must be specified
";

    #[test]
    fn structured_listing_is_dense() {
        let tracks = parse_structured(PROBE_JSON).unwrap();
        assert_eq!(tracks.len(), 3);
        for (i, t) in tracks.iter().enumerate() {
            assert_eq!(t.index, i);
        }
        assert_eq!(tracks[0].stream_index, 2);
        assert_eq!(tracks[0].title, "Japanese");
        assert_eq!(tracks[1].language, "eng");
        assert_eq!(tracks[1].title, "");
        assert_eq!(tracks[2].language, "und");
        assert_eq!(tracks[2].codec, "hdmv_pgs_subtitle");
    }

    #[test]
    fn structured_listing_edge_cases() {
        assert!(parse_structured("").unwrap().is_empty());
        assert!(parse_structured("{}").unwrap().is_empty());
        assert!(parse_structured(r#"{"streams": []}"#).unwrap().is_empty());
        assert!(matches!(
            parse_structured("{not json"),
            Err(ProbeError::ParseFailed(_))
        ));
    }

    #[test]
    fn stream_dump_finds_subtitles_only() {
        let tracks = parse_stream_dump(STREAM_DUMP);
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].stream_index, 2);
        assert_eq!(tracks[0].language, "eng");
        assert_eq!(tracks[0].codec, "ass");
        assert_eq!(tracks[1].language, "und");
        assert_eq!(tracks[1].title, "");
        assert_eq!(tracks[2].stream_index, 4);
        assert_eq!(tracks[2].language, "ger");
        assert_eq!(tracks[2].index, 2);
    }

    #[test]
    fn stream_indices_are_sorted_and_unique() {
        let text = format!("{}\n  Stream #0:1(jpn): Audio: opus", STREAM_DUMP);
        assert_eq!(parse_stream_indices(&text), vec![0, 1, 2, 3, 4]);
        assert!(parse_stream_indices("no streams here").is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_stream_dump() {
        let runner = Arc::new(ScriptedRunner::new(|tool, _| match tool {
            ToolKind::Ffprobe => failed("Invalid data found when processing input"),
            ToolKind::Ffmpeg => failed(STREAM_DUMP),
        }));
        let lister = TrackLister::new(runner.clone(), Duration::from_secs(30));

        let tracks = lister.list_subtitle_tracks(Path::new("movie.mkv")).await;
        assert_eq!(tracks.len(), 3);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn structured_empty_listing_is_final() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| ok("{\"streams\": []}", "")));
        let lister = TrackLister::new(runner.clone(), Duration::from_secs(30));

        assert!(lister.list_subtitle_tracks(Path::new("movie.mkv")).await.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn tool_outage_yields_empty_listing() {
        let runner = Arc::new(ScriptedRunner::new(|tool, _| {
            Err(ToolError::Unavailable {
                tool,
                reason: "offline".to_string(),
            })
        }));
        let lister = TrackLister::new(runner, Duration::from_secs(30));
        assert!(lister.list_subtitle_tracks(Path::new("movie.mkv")).await.is_empty());
    }

    #[tokio::test]
    async fn stream_scan_reports_timeout() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| {
            Ok(CommandOutput::timed_out(Duration::from_secs(30)))
        }));
        let lister = TrackLister::new(runner, Duration::from_secs(30));

        let err = lister
            .scan_stream_indices(Path::new("movie.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::TimedOut(ref detail) if detail == "stream dump after 30s"));
    }

    #[tokio::test]
    async fn stream_scan_passes_outage_through() {
        let runner = Arc::new(ScriptedRunner::new(|tool, _| {
            Err(ToolError::Unavailable {
                tool,
                reason: "offline".to_string(),
            })
        }));
        let lister = TrackLister::new(runner, Duration::from_secs(30));

        let err = lister
            .scan_stream_indices(Path::new("movie.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Tool(ref e) if e.is_unavailable()));
    }
}
