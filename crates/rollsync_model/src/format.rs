//! Resource format enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The format of a learning resource.
///
/// The API adds new formats over time, so this is an open enumeration:
/// any value that is not recognised lands in [`Format::Other`] instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Format {
    /// A video.
    Video,
    /// A course made of several parts.
    Course,
    /// A written article.
    Article,
    /// A podcast episode.
    Podcast,
    /// A playlist of other resources.
    Playlist,
    /// A cover image.
    Cover,
    /// A format this client does not know yet, kept verbatim.
    Other(String),
}

impl Format {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Format::Video => "Video",
            Format::Course => "Course",
            Format::Article => "Article",
            Format::Podcast => "Podcast",
            Format::Playlist => "Playlist",
            Format::Cover => "Cover",
            Format::Other(raw) => raw,
        }
    }

    /// Returns true if the format is not one of the known variants.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Format::Other(_))
    }
}

impl From<String> for Format {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "video" => Format::Video,
            "course" => Format::Course,
            "article" => Format::Article,
            "podcast" => Format::Podcast,
            "playlist" => Format::Playlist,
            "cover" => Format::Cover,
            _ => Format::Other(raw),
        }
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        match format {
            Format::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
