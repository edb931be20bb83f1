//! Declared playback intent.

use url::Url;

use crate::engine::VideoScale;

/// How the video is fitted into the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Whole frame visible, letterboxed
    #[default]
    Contain,
    /// View covered, frame cropped
    Cover,
    /// View covered, aspect ignored
    Stretch,
    /// View covered, frame cropped (same scaling as `Cover`)
    Fill,
    /// Native size, centered
    Original,
}

impl ResizeMode {
    /// Parses a host-provided value. Unknown or missing values mean `Contain`.
    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return ResizeMode::Contain;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "cover" => ResizeMode::Cover,
            "stretch" => ResizeMode::Stretch,
            "fill" => ResizeMode::Fill,
            "original" | "center" => ResizeMode::Original,
            _ => ResizeMode::Contain,
        }
    }

    /// Engine scaling for this mode.
    pub fn to_video_scale(self) -> VideoScale {
        match self {
            ResizeMode::Contain => VideoScale::Fit,
            ResizeMode::Cover | ResizeMode::Fill => VideoScale::AspectFill,
            ResizeMode::Stretch => VideoScale::Stretch,
            ResizeMode::Original => VideoScale::Original,
        }
    }
}

/// What the host has asked for, independent of what the engine is doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackIntent {
    pub url: Option<Url>,
    pub playing: bool,
    pub init_options: Vec<String>,
    pub media_options: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub resize_mode: ResizeMode,
}

/// Parses a host url. Blank input or input without a scheme yields `None`.
pub fn parse_url(raw: Option<&str>) -> Option<Url> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!("Rejecting url {trimmed:?}: {e}");
            None
        }
    }
}

/// Trims an aspect ratio. Blank means engine default.
pub fn normalize_aspect_ratio(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_mode_parsing() {
        assert_eq!(ResizeMode::from_value(None), ResizeMode::Contain);
        assert_eq!(ResizeMode::from_value(Some("COVER")), ResizeMode::Cover);
        assert_eq!(ResizeMode::from_value(Some(" stretch ")), ResizeMode::Stretch);
        assert_eq!(ResizeMode::from_value(Some("fill")), ResizeMode::Fill);
        assert_eq!(ResizeMode::from_value(Some("center")), ResizeMode::Original);
        assert_eq!(ResizeMode::from_value(Some("original")), ResizeMode::Original);
        assert_eq!(ResizeMode::from_value(Some("zoom")), ResizeMode::Contain);
    }

    #[test]
    fn test_fill_scales_like_cover() {
        assert_eq!(ResizeMode::Fill.to_video_scale(), VideoScale::AspectFill);
        assert_eq!(ResizeMode::Cover.to_video_scale(), VideoScale::AspectFill);
        assert_eq!(ResizeMode::Contain.to_video_scale(), VideoScale::Fit);
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url(None).is_none());
        assert!(parse_url(Some("   ")).is_none());
        assert!(parse_url(Some("not a url")).is_none());
        let url = parse_url(Some("  rtsp://cam.local:554/stream1 ")).expect("valid url");
        assert_eq!(url.scheme(), "rtsp");
        assert_eq!(url.host_str(), Some("cam.local"));
    }

    #[test]
    fn test_aspect_ratio_trimming() {
        assert_eq!(normalize_aspect_ratio(Some(" 16:9 ")), Some("16:9".into()));
        assert_eq!(normalize_aspect_ratio(Some("  ")), None);
        assert_eq!(normalize_aspect_ratio(None), None);
    }
}
