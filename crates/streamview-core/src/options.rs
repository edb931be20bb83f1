//! Decoder option normalization.
//!
//! Hosts pass a single flat list of option strings. Each token is either an
//! engine-init option (applied once, when the engine is constructed) or a
//! per-media option (applied every time a stream is loaded):
//!
//! ```text
//! ":network-caching=500"  → media   (leading ':' marks media scope)
//! "--rtsp-tcp"            → init
//! "rtsp-tcp"              → init, canonicalized to "--rtsp-tcp"
//! ```
//!
//! Duplicates are resolved per category by canonical key: a later value
//! overwrites the earlier one *in place*, because some engine flags are
//! order-sensitive.

use std::collections::HashMap;

/// Prefix that marks a media-scoped option.
pub const MEDIA_SIGIL: char = ':';

/// Canonical prefix for init options.
const INIT_PREFIX: &str = "--";

/// Which phase of the engine an option applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionCategory {
    /// Applied at engine construction
    Init,
    /// Applied per loaded stream
    Media,
}

impl OptionCategory {
    fn as_str(self) -> &'static str {
        match self {
            OptionCategory::Init => "init",
            OptionCategory::Media => "media",
        }
    }

    /// Classifies a trimmed token.
    pub fn classify(token: &str) -> Self {
        if token.starts_with(MEDIA_SIGIL) {
            OptionCategory::Media
        } else {
            OptionCategory::Init
        }
    }
}

/// Normalized, key-unique option lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOptions {
    pub init: Vec<String>,
    pub media: Vec<String>,
}

/// Returns the canonical dedup key for an option, e.g. `"media|network-caching"`.
///
/// Leading `-`/`:` characters are ignored and the name is lowercased; the value
/// after `=` does not participate.
pub fn canonical_key(option: &str, category: OptionCategory) -> String {
    let name = option
        .trim()
        .trim_start_matches(['-', MEDIA_SIGIL])
        .split('=')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    format!("{}|{}", category.as_str(), name)
}

/// Applies the canonical prefix for `category` if absent.
pub fn with_canonical_prefix(option: &str, category: OptionCategory) -> String {
    match category {
        OptionCategory::Init => {
            if option.starts_with('-') {
                option.to_string()
            } else if let Some(rest) = option.strip_prefix(MEDIA_SIGIL) {
                format!("{INIT_PREFIX}{rest}")
            } else {
                format!("{INIT_PREFIX}{option}")
            }
        }
        OptionCategory::Media => {
            if option.starts_with(MEDIA_SIGIL) {
                option.to_string()
            } else {
                format!("{MEDIA_SIGIL}{}", option.trim_start_matches('-'))
            }
        }
    }
}

/// Folds the legacy split form (separate init and media lists) into one flat
/// option list. Entries are prefixed for their category so classification
/// round-trips.
pub fn merge_split_options(init: &[String], media: &[String]) -> Vec<String> {
    let init = init
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|o| with_canonical_prefix(o, OptionCategory::Init));
    let media = media
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|o| with_canonical_prefix(o, OptionCategory::Media));
    init.chain(media).collect()
}

/// Ordered list with in-place overwrite on key collision.
#[derive(Default)]
struct OrderedOptions {
    entries: Vec<String>,
    positions: HashMap<String, usize>,
}

impl OrderedOptions {
    fn upsert(&mut self, key: String, value: String) {
        match self.positions.get(&key) {
            Some(&idx) => self.entries[idx] = value,
            None => {
                self.positions.insert(key, self.entries.len());
                self.entries.push(value);
            }
        }
    }
}

/// Splits and deduplicates raw option lists on top of built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct OptionsNormalizer {
    default_init: Vec<String>,
    default_media: Vec<String>,
}

impl OptionsNormalizer {
    /// Creates a normalizer seeded with the given defaults.
    ///
    /// Defaults are taken as belonging to the given category regardless of
    /// their prefix.
    pub fn new(default_init: Vec<String>, default_media: Vec<String>) -> Self {
        Self {
            default_init,
            default_media,
        }
    }

    /// Normalizes `raw` into init and media lists.
    ///
    /// `None` and an empty list both yield the defaults.
    pub fn normalize(&self, raw: Option<&[String]>) -> NormalizedOptions {
        let mut init = OrderedOptions::default();
        let mut media = OrderedOptions::default();

        let mut append = |token: &str, category: OptionCategory| {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return;
            }
            let value = with_canonical_prefix(trimmed, category);
            let key = canonical_key(&value, category);
            match category {
                OptionCategory::Init => init.upsert(key, value),
                OptionCategory::Media => media.upsert(key, value),
            }
        };

        for option in &self.default_init {
            append(option, OptionCategory::Init);
        }
        for option in &self.default_media {
            append(option, OptionCategory::Media);
        }
        for option in raw.unwrap_or_default() {
            let trimmed = option.trim();
            append(trimmed, OptionCategory::classify(trimmed));
        }

        NormalizedOptions {
            init: init.entries,
            media: media.entries,
        }
    }
}
