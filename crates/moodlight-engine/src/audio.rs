use std::sync::Arc;

use moodlight_contracts::audio::{AliasMap, AudioFetchError, AudioReference, AudioSource, AUDIO_MIME};

use crate::error_chain_text;
use crate::storage::ObjectStore;

/// Turns a `preview_uri` into something a chat surface can play.
pub struct AudioResolver {
    store: Arc<dyn ObjectStore>,
    aliases: AliasMap,
}

impl AudioResolver {
    pub fn new(store: Arc<dyn ObjectStore>, aliases: AliasMap) -> Self {
        Self { store, aliases }
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    /// Fetch failures are logged and reported as "no audio".
    pub fn resolve(&self, preview_uri: &str) -> Option<AudioSource> {
        match self.try_resolve(preview_uri) {
            Ok(source) => source,
            Err(err) => {
                tracing::error!(preview_uri, error = %err, "failed to download audio");
                None
            }
        }
    }

    pub fn try_resolve(&self, preview_uri: &str) -> Result<Option<AudioSource>, AudioFetchError> {
        match AudioReference::parse(preview_uri) {
            AudioReference::Unusable => Ok(None),
            AudioReference::Url(url) => Ok(Some(AudioSource::Url {
                url,
                mime: AUDIO_MIME.to_string(),
            })),
            AudioReference::Object { bucket, key } => {
                let canonical = self.aliases.canonical(&key).to_string();
                let mut data = self.fetch(&bucket, &key)?;
                if data.is_none() && canonical != key {
                    tracing::debug!(%bucket, %key, %canonical, "audio key missing, trying canonical");
                    data = self.fetch(&bucket, &canonical)?;
                }
                match data {
                    Some(data) => Ok(Some(AudioSource::Bytes {
                        data,
                        mime: AUDIO_MIME.to_string(),
                    })),
                    None => Err(AudioFetchError::NotFound {
                        bucket,
                        key,
                        canonical,
                    }),
                }
            }
        }
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, AudioFetchError> {
        self.store
            .fetch(bucket, key)
            .map_err(|err| AudioFetchError::Transport(error_chain_text(&err, 512)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use anyhow::bail;
    use moodlight_contracts::audio::{AliasMap, AudioFetchError, AudioSource};

    use super::AudioResolver;
    use crate::storage::ObjectStore;

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub objects: BTreeMap<String, Vec<u8>>,
        pub attempts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl FakeStore {
        pub fn with_object(mut self, path: &str, data: &[u8]) -> Self {
            self.objects.insert(path.to_string(), data.to_vec());
            self
        }

        pub fn attempts(&self) -> Vec<String> {
            self.attempts.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl ObjectStore for FakeStore {
        fn fetch(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            let path = format!("{bucket}/{key}");
            if let Ok(mut attempts) = self.attempts.lock() {
                attempts.push(path.clone());
            }
            if self.fail {
                bail!("connection reset");
            }
            Ok(self.objects.get(&path).cloned())
        }
    }

    #[test]
    fn misnamed_key_falls_back_to_canonical_key() -> anyhow::Result<()> {
        let store = Arc::new(
            FakeStore::default().with_object("bucket/audio_previews/BonneHumeur.mp3", b"mp3"),
        );
        let resolver = AudioResolver::new(store.clone(), AliasMap::bundled());
        let source = resolver.try_resolve("gs://bucket/audio_previews/Bonnehumeur.mp3")?;
        assert_eq!(
            source,
            Some(AudioSource::Bytes {
                data: b"mp3".to_vec(),
                mime: "audio/mpeg".to_string(),
            })
        );
        assert_eq!(
            store.attempts(),
            vec![
                "bucket/audio_previews/Bonnehumeur.mp3".to_string(),
                "bucket/audio_previews/BonneHumeur.mp3".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn original_key_is_used_when_present() -> anyhow::Result<()> {
        let store = Arc::new(
            FakeStore::default().with_object("bucket/audio_previews/Bonnehumeur.mp3", b"orig"),
        );
        let resolver = AudioResolver::new(store.clone(), AliasMap::bundled());
        let source = resolver.try_resolve("gs://bucket/audio_previews/Bonnehumeur.mp3")?;
        assert!(matches!(source, Some(AudioSource::Bytes { ref data, .. }) if data == b"orig"));
        assert_eq!(store.attempts().len(), 1);
        Ok(())
    }

    #[test]
    fn urls_are_returned_without_fetching() -> anyhow::Result<()> {
        let store = Arc::new(FakeStore::default());
        let resolver = AudioResolver::new(store.clone(), AliasMap::bundled());
        let source = resolver.try_resolve("https://cdn.example.com/Tristesse.mp3")?;
        assert_eq!(
            source,
            Some(AudioSource::Url {
                url: "https://cdn.example.com/Tristesse.mp3".to_string(),
                mime: "audio/mpeg".to_string(),
            })
        );
        assert!(store.attempts().is_empty());
        Ok(())
    }

    #[test]
    fn empty_and_malformed_references_resolve_to_nothing() {
        let store = Arc::new(FakeStore::default());
        let resolver = AudioResolver::new(store.clone(), AliasMap::bundled());
        assert_eq!(resolver.resolve(""), None);
        assert_eq!(resolver.resolve("gs://bucket-without-key"), None);
        assert!(store.attempts().is_empty());
    }

    #[test]
    fn missing_object_is_not_found_and_swallowed_by_resolve() {
        let store = Arc::new(FakeStore::default());
        let resolver = AudioResolver::new(store.clone(), AliasMap::bundled());
        let err = resolver
            .try_resolve("gs://bucket/audio_previews/Tristess.mp3")
            .unwrap_err();
        assert_eq!(
            err,
            AudioFetchError::NotFound {
                bucket: "bucket".to_string(),
                key: "audio_previews/Tristess.mp3".to_string(),
                canonical: "audio_previews/Tristesse.mp3".to_string(),
            }
        );
        assert_eq!(resolver.resolve("gs://bucket/audio_previews/Tristess.mp3"), None);
    }

    #[test]
    fn transport_failures_do_not_escape_resolve() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..FakeStore::default()
        });
        let resolver = AudioResolver::new(store, AliasMap::bundled());
        assert!(matches!(
            resolver.try_resolve("gs://bucket/a.mp3"),
            Err(AudioFetchError::Transport(ref message)) if message.contains("connection reset")
        ));
        assert_eq!(resolver.resolve("gs://bucket/a.mp3"), None);
    }
}
