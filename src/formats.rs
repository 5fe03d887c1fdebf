//! Format normalization: turns the tool's raw rendition list into the ranked
//! list the client chooses from.
//!
//! Only two shapes survive. Progressive HTTPS renditions carrying both audio
//! and video become recommended `direct` entries; muxed HLS renditions become
//! `stream` fallbacks, capped at [`MAX_STREAM_FORMATS`]. Everything else
//! (video-only, audio-only, manifests, signed URLs without a plain `url`) is
//! dropped without error.

use crate::models::{DownloadKind, NormalizedFormat, RawFormat};

/// Upper bound on stream entries in one response.
pub const MAX_STREAM_FORMATS: usize = 3;

pub const UNKNOWN_SIZE: &str = "unknown size";
pub const STREAMING_SIZE: &str = "streaming format";
pub const UNKNOWN_QUALITY: &str = "unknown";

const DEFAULT_FPS: u32 = 30;
const DEFAULT_CONTAINER: &str = "mp4";
const DIRECT_PROTOCOL: &str = "https";
const STREAM_PROTOCOL: &str = "m3u8_native";
const CODEC_NONE: &str = "none";
const MANIFEST_HOST: &str = "manifest.googlevideo.com";

/// Normalizes and ranks `raw` for the client.
///
/// `source_url` is the page URL the formats were extracted from; it is only
/// used for logging.
pub fn normalize_formats(raw: &[RawFormat], source_url: &str) -> Vec<NormalizedFormat> {
    let direct: Vec<NormalizedFormat> = raw.iter().filter(|f| is_direct_candidate(f)).map(project_direct).collect();

    let stream_candidates: Vec<&RawFormat> = raw.iter().filter(|f| is_stream_candidate(f)).collect();
    let stream: Vec<NormalizedFormat> =
        stream_candidates.iter().take(MAX_STREAM_FORMATS).map(|f| project_stream(f)).collect();

    tracing::debug!(
        "{}: {} raw formats, {} direct, {} stream candidates ({} kept)",
        source_url,
        raw.len(),
        direct.len(),
        stream_candidates.len(),
        stream.len()
    );

    let mut formats = direct;
    formats.extend(stream);
    // `sort_by` is stable, so equal keys keep their input order.
    formats.sort_by(|a, b| {
        b.recommended
            .cmp(&a.recommended)
            .then_with(|| quality_rank(&b.quality).cmp(&quality_rank(&a.quality)))
    });
    formats
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref() != Some(CODEC_NONE)
}

fn known_height(f: &RawFormat) -> Option<u32> {
    f.height.filter(|h| *h > 0)
}

fn is_direct_candidate(f: &RawFormat) -> bool {
    f.protocol.as_deref() == Some(DIRECT_PROTOCOL)
        && has_codec(&f.vcodec)
        && known_height(f).is_some()
        && f.url.as_deref().is_some_and(|u| !u.is_empty() && !u.contains(MANIFEST_HOST))
        && has_codec(&f.acodec)
}

fn is_stream_candidate(f: &RawFormat) -> bool {
    f.protocol.as_deref() == Some(STREAM_PROTOCOL)
        && has_codec(&f.vcodec)
        && known_height(f).is_some()
        && has_codec(&f.acodec)
        && f.working != Some(false)
}

fn project(f: &RawFormat, download_kind: DownloadKind, file_size: String) -> NormalizedFormat {
    NormalizedFormat {
        quality: known_height(f).map_or_else(|| UNKNOWN_QUALITY.to_string(), |h| format!("{}p", h)),
        container: f.ext.as_deref().filter(|e| !e.is_empty()).unwrap_or(DEFAULT_CONTAINER).to_uppercase(),
        file_size,
        fps: f
            .fps
            .filter(|fps| fps.is_finite() && *fps >= 1.0)
            .map_or(DEFAULT_FPS, |fps| fps.round() as u32),
        has_audio: has_codec(&f.acodec),
        vcodec: f.vcodec.clone(),
        acodec: f.acodec.clone(),
        format_id: f.format_id.clone(),
        url: f.url.clone(),
        download_kind,
        bitrate: f.tbr.filter(|b| b.is_finite() && *b > 0.0),
        recommended: download_kind == DownloadKind::Direct,
    }
}

fn project_direct(f: &RawFormat) -> NormalizedFormat {
    let size = f
        .filesize
        .or(f.filesize_approx)
        .filter(|b| b.is_finite() && *b >= 0.0)
        .map_or_else(|| UNKNOWN_SIZE.to_string(), |b| format_file_size(b as u64));
    project(f, DownloadKind::Direct, size)
}

fn project_stream(f: &RawFormat) -> NormalizedFormat {
    project(f, DownloadKind::Stream, STREAMING_SIZE.to_string())
}

/// Leading integer of a quality label (`"720p"` -> 720). Anything that does
/// not start with a digit ranks as 0.
pub fn quality_rank(label: &str) -> u32 {
    let digits: String = label.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Human-readable byte count in binary units, two decimals at most
/// (`1536` -> `"1.5 KB"`). Sizes beyond the GB range stay in GB.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn direct(id: &str, height: u32) -> RawFormat {
        RawFormat {
            format_id: Some(id.into()),
            protocol: Some("https".into()),
            vcodec: Some("avc1.64001F".into()),
            acodec: Some("mp4a.40.2".into()),
            height: Some(height),
            url: Some(format!("https://rr1.example.com/videoplayback?itag={}", id)),
            ext: Some("mp4".into()),
            ..Default::default()
        }
    }

    fn stream(id: &str, height: u32) -> RawFormat {
        RawFormat {
            format_id: Some(id.into()),
            protocol: Some("m3u8_native".into()),
            vcodec: Some("avc1.4d401e".into()),
            acodec: Some("mp4a.40.5".into()),
            height: Some(height),
            url: Some(format!("https://manifest.googlevideo.com/api/manifest/hls_playlist/{}", id)),
            ext: Some("mp4".into()),
            ..Default::default()
        }
    }

    fn ids(formats: &[NormalizedFormat]) -> Vec<&str> {
        formats.iter().map(|f| f.format_id.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn direct_entry_ranks_ahead_of_stream() {
        let out = normalize_formats(&[stream("94", 480), direct("22", 720)], "https://youtu.be/x");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].quality, "720p");
        assert!(out[0].recommended);
        assert_eq!(out[0].download_kind, DownloadKind::Direct);
        assert_eq!(out[1].quality, "480p");
        assert!(!out[1].recommended);
        assert_eq!(out[1].file_size, STREAMING_SIZE);
    }

    #[test]
    fn direct_above_stream_even_when_stream_is_taller() {
        let out = normalize_formats(&[stream("96", 1080), direct("18", 360)], "u");
        assert_eq!(ids(&out), vec!["18", "96"]);
    }

    #[test]
    fn partitions_sort_by_descending_height() {
        let raw = vec![direct("18", 360), stream("93", 360), direct("22", 720), stream("95", 720)];
        let out = normalize_formats(&raw, "u");
        assert_eq!(ids(&out), vec!["22", "18", "95", "93"]);
    }

    #[test]
    fn stream_entries_capped_in_input_order() {
        let raw: Vec<RawFormat> = [240, 1080, 360, 720, 480].iter().map(|h| stream(&h.to_string(), *h)).collect();
        let out = normalize_formats(&raw, "u");
        assert_eq!(out.len(), MAX_STREAM_FORMATS);
        // truncation happens before sorting: 720 and 480 never make it in
        assert_eq!(ids(&out), vec!["1080", "360", "240"]);
    }

    #[test]
    fn drops_formats_without_audio_or_video() {
        let mut video_only = direct("137", 1080);
        video_only.acodec = Some("none".into());
        let mut audio_only = direct("140", 0);
        audio_only.vcodec = Some("none".into());
        audio_only.height = None;
        let mut stream_video_only = stream("270", 1080);
        stream_video_only.acodec = Some("none".into());

        let out = normalize_formats(&[video_only, audio_only, stream_video_only], "u");
        assert!(out.is_empty());
    }

    #[test]
    fn drops_manifest_urls_and_missing_urls_from_direct() {
        let mut manifest = direct("22", 720);
        manifest.url = Some("https://manifest.googlevideo.com/api/manifest/dash/xyz".into());
        let mut signed = direct("18", 360);
        signed.url = None;
        assert!(normalize_formats(&[manifest, signed], "u").is_empty());
    }

    #[test]
    fn drops_streams_flagged_not_working() {
        let mut broken = stream("94", 480);
        broken.working = Some(false);
        let mut flagged_ok = stream("95", 720);
        flagged_ok.working = Some(true);
        let out = normalize_formats(&[broken, flagged_ok], "u");
        assert_eq!(ids(&out), vec!["95"]);
    }

    #[test]
    fn drops_zero_height_and_other_protocols() {
        let zero = direct("22", 0);
        let mut dash = direct("299", 1080);
        dash.protocol = Some("http_dash_segments".into());
        assert!(normalize_formats(&[zero, dash], "u").is_empty());
    }

    #[test]
    fn every_entry_satisfies_its_kind() {
        let mut raw = vec![direct("22", 720), stream("94", 480), stream("95", 720)];
        let mut noise = direct("x", 144);
        noise.acodec = Some("none".into());
        raw.push(noise);
        for f in normalize_formats(&raw, "u") {
            assert!(f.has_audio);
            assert_ne!(f.quality, UNKNOWN_QUALITY);
            match f.download_kind {
                DownloadKind::Direct => {
                    assert!(f.recommended);
                    assert!(f.url.is_some());
                }
                DownloadKind::Stream => assert!(!f.recommended),
            }
        }
    }

    #[test]
    fn direct_projection_defaults() {
        let mut f = direct("22", 720);
        f.ext = None;
        f.fps = None;
        f.filesize_approx = Some(3.0 * 1024.0 * 1024.0);
        f.tbr = Some(0.0);
        let out = normalize_formats(&[f], "u");
        assert_eq!(out[0].container, "MP4");
        assert_eq!(out[0].fps, 30);
        assert_eq!(out[0].file_size, "3 MB");
        assert_eq!(out[0].bitrate, None);
    }

    #[test]
    fn direct_size_prefers_exact_then_unknown() {
        let mut exact = direct("22", 720);
        exact.filesize = Some(2048.0);
        exact.filesize_approx = Some(9999.0);
        exact.ext = Some("webm".into());
        exact.fps = Some(59.94);
        exact.tbr = Some(1234.5);
        let unknown = direct("18", 360);
        let out = normalize_formats(&[exact, unknown], "u");
        assert_eq!(out[0].file_size, "2 KB");
        assert_eq!(out[0].container, "WEBM");
        assert_eq!(out[0].fps, 60);
        assert_eq!(out[0].bitrate, Some(1234.5));
        assert_eq!(out[1].file_size, UNKNOWN_SIZE);
    }

    #[test]
    fn quality_rank_never_panics_on_odd_labels() {
        assert_eq!(quality_rank("1080p"), 1080);
        assert_eq!(quality_rank("unknown"), 0);
        assert_eq!(quality_rank(""), 0);
        assert_eq!(quality_rank("p720"), 0);
        assert_eq!(quality_rank("99999999999999999999p"), 0);
    }

    #[test]
    fn file_size_formatting() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_572_864), "1.5 MB");
        assert_eq!(format_file_size(1_234_567_890), "1.15 GB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(normalize_formats(&[], "u").is_empty());
    }
}
