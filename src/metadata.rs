//! Projection of raw tool metadata into the display-ready [`VideoSummary`].

use crate::formats::normalize_formats;
use crate::models::{ExtractorInfo, RawVideoInfo, VideoSummary};

pub const DESCRIPTION_LIMIT: usize = 200;
pub const ELLIPSIS: &str = "...";
pub const PLACEHOLDER_THUMBNAIL: &str = "https://via.placeholder.com/300x200/667eea/ffffff?text=No+Thumbnail";

const UNKNOWN_ID: &str = "unknown";
const UNKNOWN_TITLE: &str = "unknown title";
const NO_DESCRIPTION: &str = "no description";
const UNKNOWN_DATE: &str = "unknown";
const UNKNOWN_CHANNEL: &str = "unknown channel";
const UNKNOWN_DURATION: &str = "unknown duration";

/// Builds the summary for one extraction. Never fails: every field has a fallback.
pub fn project_summary(info: &RawVideoInfo, original_url: &str) -> VideoSummary {
    let formats = normalize_formats(info.formats.as_deref().unwrap_or_default(), original_url);

    VideoSummary {
        video_id: non_empty(&info.id).unwrap_or(UNKNOWN_ID).to_string(),
        title: non_empty(&info.title).unwrap_or(UNKNOWN_TITLE).to_string(),
        description: non_empty(&info.description)
            .map_or_else(|| NO_DESCRIPTION.to_string(), truncate_description),
        thumbnail: non_empty(&info.thumbnail).unwrap_or(PLACEHOLDER_THUMBNAIL).to_string(),
        upload_date: info
            .upload_date
            .as_deref()
            .and_then(format_upload_date)
            .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        channel_name: non_empty(&info.uploader).unwrap_or(UNKNOWN_CHANNEL).to_string(),
        duration: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map_or_else(|| UNKNOWN_DURATION.to_string(), |d| format_duration(d.floor() as u64)),
        formats,
        original_url: original_url.to_string(),
        view_count: info.view_count.unwrap_or(0),
        like_count: info.like_count.unwrap_or(0),
        extractor_info: ExtractorInfo {
            extractor: info.extractor.clone(),
            extractor_key: info.extractor_key.clone(),
        },
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// Cuts `text` to [`DESCRIPTION_LIMIT`] characters (not bytes) and marks the cut.
pub fn truncate_description(text: &str) -> String {
    match text.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// `YYYYMMDD` -> `YYYY-MM-DD`; anything else is rejected.
pub fn format_upload_date(compact: &str) -> Option<String> {
    let compact = compact.trim();
    if compact.len() != 8 || !compact.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &compact[..4], &compact[4..6], &compact[6..]))
}

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawFormat;
    use pretty_assertions::assert_eq;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(45), "0:45");
        assert_eq!(format_duration(125), "2:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3661), "1:01:01");
    }

    #[test]
    fn upload_date_reformatting() {
        assert_eq!(format_upload_date("20240131").as_deref(), Some("2024-01-31"));
        assert_eq!(format_upload_date("2024-01-31"), None);
        assert_eq!(format_upload_date("2024013"), None);
        assert_eq!(format_upload_date("2024O131"), None);
    }

    #[test]
    fn description_truncates_by_characters() {
        let short = "a".repeat(DESCRIPTION_LIMIT);
        assert_eq!(truncate_description(&short), short);

        let long: String = "视".repeat(DESCRIPTION_LIMIT + 5);
        let cut = truncate_description(&long);
        assert!(cut.ends_with(ELLIPSIS));
        assert_eq!(cut.chars().count(), DESCRIPTION_LIMIT + ELLIPSIS.len());
        assert!(cut.starts_with(&"视".repeat(DESCRIPTION_LIMIT)));
    }

    #[test]
    fn empty_metadata_uses_fallbacks() {
        let summary = project_summary(&RawVideoInfo::default(), "https://youtu.be/x");
        assert_eq!(summary.video_id, "unknown");
        assert_eq!(summary.title, UNKNOWN_TITLE);
        assert_eq!(summary.description, NO_DESCRIPTION);
        assert_eq!(summary.thumbnail, PLACEHOLDER_THUMBNAIL);
        assert_eq!(summary.upload_date, "unknown");
        assert_eq!(summary.channel_name, "unknown channel");
        assert_eq!(summary.duration, UNKNOWN_DURATION);
        assert_eq!(summary.view_count, 0);
        assert_eq!(summary.like_count, 0);
        assert!(summary.formats.is_empty());
        assert_eq!(summary.original_url, "https://youtu.be/x");
    }

    #[test]
    fn full_metadata_projection() {
        let info = RawVideoInfo {
            id: Some("dQw4w9WgXcQ".into()),
            title: Some("Never Gonna Give You Up".into()),
            description: Some("short".into()),
            thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg".into()),
            upload_date: Some("20091025".into()),
            uploader: Some("Rick Astley".into()),
            duration: Some(212.7),
            view_count: Some(1_500_000_000),
            like_count: Some(17_000_000),
            extractor: Some("youtube".into()),
            extractor_key: Some("Youtube".into()),
            formats: Some(vec![RawFormat {
                format_id: Some("18".into()),
                protocol: Some("https".into()),
                vcodec: Some("avc1.42001E".into()),
                acodec: Some("mp4a.40.2".into()),
                height: Some(360),
                url: Some("https://rr3.example.com/videoplayback".into()),
                ..Default::default()
            }]),
        };
        let summary = project_summary(&info, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(summary.upload_date, "2009-10-25");
        assert_eq!(summary.duration, "3:32");
        assert_eq!(summary.description, "short");
        assert_eq!(summary.channel_name, "Rick Astley");
        assert_eq!(summary.formats.len(), 1);
        assert_eq!(summary.extractor_info.extractor_key.as_deref(), Some("Youtube"));
    }
}
