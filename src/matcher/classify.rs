use super::indicators::{self, TOPIC_CHANNEL_MARKER};
use crate::model::Tier;

/// Classify a search result by its title and channel.
///
/// `title_lower` must already be lowercased. Returns the tier and the phrase
/// that decided it, or `None` when nothing matched.
/// Tiered: first match wins (topic channel → music video → audio → lyrics).
pub fn classify(title_lower: &str, channel_name: &str) -> Option<(Tier, &'static str)> {
    // Auto-generated artist channels only carry audio uploads
    if channel_name.contains(TOPIC_CHANNEL_MARKER) {
        return Some((Tier::Audio, TOPIC_CHANNEL_MARKER));
    }

    for tier in Tier::CLASSIFIED {
        for &phrase in indicators::for_tier(tier) {
            if title_lower.contains(&phrase.to_lowercase()) {
                return Some((tier, phrase));
            }
        }
    }

    None
}
