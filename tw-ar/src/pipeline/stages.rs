//! Pipeline stage implementations
//!
//! Stage order: Normalize → Stitch → Polish → MixMusic (optional) →
//! Encode → Publish. Every stage consumes the previous stage's artifact
//! path(s) and writes a new artifact into the session workspace; nothing is
//! processed in memory or streamed between stages.

use std::path::{Path, PathBuf};

use crate::models::RecordingPage;
use crate::pipeline::{PipelineError, RenderPipeline, RenderRequest, Workspace};
use crate::services::{FilterJob, JobInput};

/// Canonical working format: mono PCM at 44.1 kHz
const CANONICAL_SAMPLE_RATE: u32 = 44_100;

/// Silence inserted between consecutive pages
const INTER_PAGE_SILENCE_SECS: f64 = 0.75;

/// Validity window for signed page download URLs
const SIGNED_URL_TTL_SECS: u64 = 300;

/// Music bed shaping
const MUSIC_FADE_IN_SECS: f64 = 3.0;
const MUSIC_FADE_OUT_SECS: f64 = 5.0;
const MUSIC_VOLUME: f64 = 0.1;

/// Encoder output settings
const MP3_BITRATE: &str = "192k";
const ALBUM_LABEL: &str = "Taleweaver Storybooks";

impl RenderPipeline {
    /// Normalize stage: fetch each page's raw audio and produce canonical
    /// single-channel PCM clips, in page order
    pub(crate) async fn normalize_pages(
        &self,
        workspace: &Workspace,
        pages: &[RecordingPage],
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let mut clips = Vec::with_capacity(pages.len());
        for page in pages {
            // Pages without audio are filtered at query time; skip any that
            // slip through rather than render a gap.
            let Some(audio_ref) = page.audio_ref.as_deref() else {
                continue;
            };

            let url = self
                .pages
                .signed_download(audio_ref, SIGNED_URL_TTL_SECS)
                .await
                .map_err(|e| PipelineError::Download(format!("page {}: {}", page.page_index, e)))?;
            let bytes = self
                .fetcher
                .fetch(&url)
                .await
                .map_err(|e| PipelineError::Download(format!("page {}: {}", page.page_index, e)))?;

            let ext = Path::new(audio_ref)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin");
            let raw_path = workspace.path(&format!("raw_{:03}.{}", page.page_index, ext));
            tokio::fs::write(&raw_path, &bytes).await?;

            let clip = workspace.path(&format!("page_{:03}.wav", page.page_index));
            self.transcoder
                .submit(&FilterJob {
                    inputs: vec![JobInput::file(&raw_path)],
                    filter_graph: None,
                    output_args: canonical_pcm_args(),
                    output: clip.clone(),
                })
                .await?;
            clips.push(clip);
        }
        Ok(clips)
    }

    /// Stitch stage: concatenate page clips with a fixed silence clip
    /// between consecutive pages
    pub(crate) async fn stitch_pages(
        &self,
        workspace: &Workspace,
        clips: &[PathBuf],
    ) -> Result<PathBuf, PipelineError> {
        let silence = self.synthesize_silence(workspace).await?;

        let entries = interleave_with_silence(clips, &silence);
        let manifest_path = workspace.path("concat.txt");
        tokio::fs::write(&manifest_path, render_concat_manifest(&entries)).await?;

        let voice_track = workspace.path("voice.wav");
        self.transcoder
            .submit(&FilterJob {
                inputs: vec![JobInput::with_args(
                    manifest_path.display().to_string(),
                    vec![
                        "-f".to_string(),
                        "concat".to_string(),
                        "-safe".to_string(),
                        "0".to_string(),
                    ],
                )],
                filter_graph: None,
                output_args: canonical_pcm_args(),
                output: voice_track.clone(),
            })
            .await?;
        Ok(voice_track)
    }

    async fn synthesize_silence(&self, workspace: &Workspace) -> Result<PathBuf, PipelineError> {
        let silence = workspace.path("silence.wav");
        self.transcoder
            .submit(&FilterJob {
                inputs: vec![JobInput::with_args(
                    format!("anullsrc=channel_layout=mono:sample_rate={CANONICAL_SAMPLE_RATE}"),
                    vec![
                        "-f".to_string(),
                        "lavfi".to_string(),
                        "-t".to_string(),
                        INTER_PAGE_SILENCE_SECS.to_string(),
                    ],
                )],
                filter_graph: None,
                output_args: canonical_pcm_args(),
                output: silence.clone(),
            })
            .await?;
        Ok(silence)
    }

    /// Polish stage: high-pass rumble removal, then loudness normalization
    pub(crate) async fn polish_track(
        &self,
        workspace: &Workspace,
        voice_track: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let polished = workspace.path("polished.wav");
        self.transcoder
            .submit(&FilterJob {
                inputs: vec![JobInput::file(voice_track)],
                filter_graph: Some("highpass=f=80,loudnorm=I=-16:TP=-1.5:LRA=11".to_string()),
                output_args: canonical_pcm_args(),
                output: polished.clone(),
            })
            .await?;
        Ok(polished)
    }

    /// MixMusic stage: lay the looped, faded, attenuated music bed under
    /// the voice track
    ///
    /// An unreachable music track must never fail a purchased render: on
    /// fetch failure the polished track passes through unmixed.
    pub(crate) async fn mix_music(
        &self,
        workspace: &Workspace,
        polished_track: &Path,
        music_track: &str,
    ) -> Result<PathBuf, PipelineError> {
        let music_url = format!(
            "{}/music/{}.mp3",
            self.config.music_base_url.trim_end_matches('/'),
            music_track
        );
        let music_bytes = match self.fetcher.fetch(&music_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    music_track = %music_track,
                    error = %e,
                    "Music track fetch failed; continuing with unmixed voice track"
                );
                return Ok(polished_track.to_path_buf());
            }
        };
        let music_path = workspace.path("music.mp3");
        tokio::fs::write(&music_path, &music_bytes).await?;

        // The probed duration of the polished track is authoritative; the
        // stored per-page durations are not used for timing.
        let voice_duration = self.transcoder.probe_duration(polished_track).await?;

        let mixed = workspace.path("mixed.wav");
        let mut output_args = vec!["-map".to_string(), "[mix]".to_string()];
        output_args.extend(canonical_pcm_args());
        self.transcoder
            .submit(&FilterJob {
                inputs: vec![
                    JobInput::file(polished_track),
                    JobInput::with_args(
                        music_path.display().to_string(),
                        vec!["-stream_loop".to_string(), "-1".to_string()],
                    ),
                ],
                filter_graph: Some(music_bed_graph(voice_duration)),
                output_args,
                output: mixed.clone(),
            })
            .await?;
        Ok(mixed)
    }

    /// Encode stage: compress to MP3 with descriptive metadata
    pub(crate) async fn encode_track(
        &self,
        workspace: &Workspace,
        input_track: &Path,
        request: &RenderRequest,
    ) -> Result<PathBuf, PipelineError> {
        let output = workspace.path(&format!("{}.mp3", request.session_id));

        let mut output_args = vec![
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            MP3_BITRATE.to_string(),
            "-ar".to_string(),
            CANONICAL_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-metadata".to_string(),
            format!("title={}", request.story_title),
            "-metadata".to_string(),
            format!("album={ALBUM_LABEL}"),
        ];
        if let Some(reader_name) = &request.reader_name {
            output_args.push("-metadata".to_string());
            output_args.push(format!("artist=read by {reader_name}"));
        }

        self.transcoder
            .submit(&FilterJob {
                inputs: vec![JobInput::file(input_track)],
                filter_graph: None,
                output_args,
                output: output.clone(),
            })
            .await?;
        Ok(output)
    }

    /// Publish stage: durable upload under the session's deterministic key
    pub(crate) async fn publish(
        &self,
        final_track: &Path,
        session_id: &str,
    ) -> Result<String, PipelineError> {
        let bytes = tokio::fs::read(final_track).await?;
        let artifact_key = format!("processed/{session_id}.mp3");
        self.artifacts
            .upload(&artifact_key, bytes, "audio/mpeg")
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;
        Ok(artifact_key)
    }
}

/// Interleave page clips with the silence clip: page, silence, page, ...
///
/// No silence before the first or after the last page, so n pages yield
/// 2n − 1 entries. Clip order is preserved exactly as given.
fn interleave_with_silence(clips: &[PathBuf], silence: &Path) -> Vec<PathBuf> {
    let mut entries = Vec::with_capacity(clips.len() * 2);
    for (i, clip) in clips.iter().enumerate() {
        if i > 0 {
            entries.push(silence.to_path_buf());
        }
        entries.push(clip.clone());
    }
    entries
}

/// Render a concat-demuxer manifest for the given entries
fn render_concat_manifest(entries: &[PathBuf]) -> String {
    let mut manifest = String::new();
    for path in entries {
        manifest.push_str(&format!("file '{}'\n", path.display()));
    }
    manifest
}

/// Output arguments producing the canonical mono 44.1 kHz PCM WAV
fn canonical_pcm_args() -> Vec<String> {
    vec![
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        CANONICAL_SAMPLE_RATE.to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
    ]
}

/// Filter graph shaping the music bed and mixing it under the voice
///
/// The voice is input 0, the (infinitely looped) music input 1. The music
/// is trimmed to the probed voice duration, faded in and out, attenuated,
/// then mixed with `duration=first` so the output length follows the voice
/// track regardless of the music file's length.
fn music_bed_graph(voice_duration: f64) -> String {
    let fade_out_start = (voice_duration - MUSIC_FADE_OUT_SECS).max(0.0);
    format!(
        "[1:a]atrim=0:{voice_duration},\
         afade=t=in:st=0:d={MUSIC_FADE_IN_SECS},\
         afade=t=out:st={fade_out_start}:d={MUSIC_FADE_OUT_SECS},\
         volume={MUSIC_VOLUME}[bg];\
         [0:a][bg]amix=inputs=2:duration=first:dropout_transition=0[mix]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_yields_2n_minus_1_entries() {
        let silence = PathBuf::from("/ws/silence.wav");
        for n in 1..=5usize {
            let clips: Vec<PathBuf> = (0..n)
                .map(|i| PathBuf::from(format!("/ws/page_{i:03}.wav")))
                .collect();
            let entries = interleave_with_silence(&clips, &silence);
            assert_eq!(entries.len(), 2 * n - 1);
            // Entries alternate page, silence, page, ...
            for (i, entry) in entries.iter().enumerate() {
                if i % 2 == 0 {
                    assert_eq!(entry, &clips[i / 2]);
                } else {
                    assert_eq!(entry, &silence);
                }
            }
        }
    }

    #[test]
    fn manifest_preserves_given_order() {
        let clips = vec![
            PathBuf::from("/ws/page_002.wav"),
            PathBuf::from("/ws/page_007.wav"),
            PathBuf::from("/ws/page_009.wav"),
        ];
        let entries = interleave_with_silence(&clips, Path::new("/ws/silence.wav"));
        let manifest = render_concat_manifest(&entries);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/ws/page_002.wav'",
                "file '/ws/silence.wav'",
                "file '/ws/page_007.wav'",
                "file '/ws/silence.wav'",
                "file '/ws/page_009.wav'",
            ]
        );
    }

    #[test]
    fn music_graph_trims_to_voice_duration() {
        let graph = music_bed_graph(42.5);
        assert!(graph.contains("atrim=0:42.5"));
        assert!(graph.contains("afade=t=out:st=37.5:d=5"));
        assert!(graph.contains("amix=inputs=2:duration=first"));
        assert!(graph.contains("volume=0.1"));
    }

    #[test]
    fn music_fade_out_start_clamps_at_zero() {
        // A 3 second voice track is shorter than the fade-out window
        let graph = music_bed_graph(3.0);
        assert!(graph.contains("afade=t=out:st=0:d=5"));
    }

    #[test]
    fn canonical_args_request_mono_44k_pcm() {
        let args = canonical_pcm_args();
        assert_eq!(args, vec!["-ac", "1", "-ar", "44100", "-c:a", "pcm_s16le"]);
    }
}
