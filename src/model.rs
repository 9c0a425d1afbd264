use std::fmt;

/// Prefix every accepted watch URL starts with.
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch";

/// A song as reported by the scrobble history: the identity used for
/// searching and caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Track {
    pub artist: String,
    pub title: String,
}

impl Track {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// One video returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub url: String,
    pub display_title: String,
    pub channel_name: String,
}

impl Candidate {
    /// Build a candidate from a video id, deriving the watch URL.
    pub fn from_video_id(
        id: impl Into<String>,
        display_title: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            url: format!("{WATCH_URL_PREFIX}?v={id}"),
            id,
            display_title: display_title.into(),
            channel_name: channel_name.into(),
        }
    }
}

/// Quality class of a matched video. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    MusicVideo,
    Audio,
    Lyrics,
    Other,
}

impl Tier {
    /// All tiers, highest priority first.
    pub const ALL: [Tier; 4] = [Tier::MusicVideo, Tier::Audio, Tier::Lyrics, Tier::Other];

    /// Tiers that own indicator tables, in scan order.
    pub const CLASSIFIED: [Tier; 3] = [Tier::MusicVideo, Tier::Audio, Tier::Lyrics];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::MusicVideo => "music video",
            Tier::Audio => "audio",
            Tier::Lyrics => "lyric video",
            Tier::Other => "relevant video",
        }
    }
}

/// True if `url` looks like a video watch URL we can hand to the downloader.
pub fn is_watch_url(url: &str) -> bool {
    url.starts_with(WATCH_URL_PREFIX)
}
