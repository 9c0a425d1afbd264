//! Title phrases that signal a video's quality tier.
//!
//! Pure data. Order matters: the classifier returns the first phrase that
//! matches, scanning tables top to bottom. Extend by appending phrases.

use crate::model::Tier;

/// Channel-name suffix of auto-generated per-artist audio channels.
pub const TOPIC_CHANNEL_MARKER: &str = "- Topic";

/// Official music videos.
pub const MUSIC_VIDEO: &[&str] = &[
    // Universal
    "official music video",
    "official video",
    "mv",
    "m/v",
    "vevo",
    "music video",
    // Korean
    "뮤직비디오",
    "official mv",
    "performance video",
    // Japanese
    "ミュージックビデオ",
    "pv",
    "オフィシャル",
    // Spanish
    "video oficial",
    // Portuguese
    "vídeo oficial",
    "clipe oficial",
    // French
    "clip officiel",
    "vidéo officielle",
    // Chinese
    "官方完整版",
    "官方版",
    "官方高清",
    "官方网易云",
    "MV超清",
    "官方MV",
    "完整版",
    // Hindi / Indian
    "official video song",
    "full video song",
    // Russian / Slavic
    "официальное видео",
    "официальный клип",
    "официальная премьера",
    "музыкальный клип",
    // German
    "offizielles video",
    "offizielles musikvideo",
    "offizieller musikfilm",
    // Arabic
    "فيديو كليب رسمي",
    "الفيديو الرسمي",
    // Italian
    "video ufficiale",
    "videoclip ufficiale",
    // Turkish
    "resmi video",
    "resmi müzik video",
    "official video klip",
    // Thai
    "เอ็มวี",
    "มิวสิควิดีโอ",
    // Indonesian / Malay
    "video klip resmi",
    "video rasmi",
    "musik video",
];

/// Official audio uploads and topic-channel style titles.
pub const AUDIO: &[&str] = &[
    "official audio",
    "audio oficial",
    "audio ufficiale",
    "topic",
    "studio",
    "audio",
    TOPIC_CHANNEL_MARKER,
];

/// Lyric videos and visualizers.
pub const LYRICS: &[&str] = &[
    "lyric video",
    "lyrics",
    "with lyrics",
    "letra",
    "paroles",
    "लिरिक्स",
    "lirik video",
    "official visualizer",
    "visualizer",
];

/// Indicator table for a tier. `Other` has none.
pub fn for_tier(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::MusicVideo => MUSIC_VIDEO,
        Tier::Audio => AUDIO,
        Tier::Lyrics => LYRICS,
        Tier::Other => &[],
    }
}
