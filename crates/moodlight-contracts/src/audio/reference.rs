pub const OBJECT_STORE_SCHEME: &str = "gs://";
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Where a track preview lives, as written by the model in `preview_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioReference {
    Object { bucket: String, key: String },
    Url(String),
    Unusable,
}

impl AudioReference {
    /// The value is classified as written; surrounding whitespace is kept.
    pub fn parse(preview_uri: &str) -> Self {
        if preview_uri.is_empty() {
            return Self::Unusable;
        }
        let Some(path) = preview_uri.strip_prefix(OBJECT_STORE_SCHEME) else {
            return Self::Url(preview_uri.to_string());
        };
        match path.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Self::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => Self::Unusable,
        }
    }
}

/// Playable form of a preview, ready to attach to a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Bytes { data: Vec<u8>, mime: String },
    Url { url: String, mime: String },
}

impl AudioSource {
    pub fn mime(&self) -> &str {
        match self {
            Self::Bytes { mime, .. } | Self::Url { mime, .. } => mime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AudioReference;

    #[test]
    fn object_reference_splits_on_first_slash() {
        assert_eq!(
            AudioReference::parse("gs://moods/audio_previews/Tristesse.mp3"),
            AudioReference::Object {
                bucket: "moods".to_string(),
                key: "audio_previews/Tristesse.mp3".to_string(),
            }
        );
    }

    #[test]
    fn plain_urls_pass_through() {
        assert_eq!(
            AudioReference::parse("https://cdn.example.com/a.mp3"),
            AudioReference::Url("https://cdn.example.com/a.mp3".to_string())
        );
    }

    #[test]
    fn urls_are_not_trimmed() {
        assert_eq!(
            AudioReference::parse(" https://cdn.example.com/a.mp3\n"),
            AudioReference::Url(" https://cdn.example.com/a.mp3\n".to_string())
        );
        assert_eq!(
            AudioReference::parse(" gs://moods/a.mp3"),
            AudioReference::Url(" gs://moods/a.mp3".to_string())
        );
    }

    #[test]
    fn empty_and_malformed_references_are_unusable() {
        assert_eq!(AudioReference::parse(""), AudioReference::Unusable);
        assert_eq!(AudioReference::parse("gs://bucket-only"), AudioReference::Unusable);
        assert_eq!(AudioReference::parse("gs://bucket/"), AudioReference::Unusable);
        assert_eq!(AudioReference::parse("gs:///key.mp3"), AudioReference::Unusable);
    }
}
