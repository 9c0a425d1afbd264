use super::classify::classify;
use crate::model::{Candidate, Tier, Track};

/// A candidate accepted into a tier slot, with the signals that put it there.
#[derive(Debug, Clone, PartialEq)]
pub struct TierMatch {
    pub candidate: Candidate,
    pub tier: Tier,
    /// Phrase that classified it; `None` for the `Other` slot.
    pub indicator: Option<&'static str>,
    pub exact_match: bool,
    pub artist_channel: bool,
}

impl TierMatch {
    /// Human-readable kind of match ("topic channel" for auto-generated audio).
    pub fn kind(&self) -> &'static str {
        match (self.tier, self.indicator) {
            (Tier::Audio, Some(super::indicators::TOPIC_CHANNEL_MARKER)) => "topic channel",
            (tier, _) => tier.label(),
        }
    }
}

/// First relevant candidate seen per tier.
///
/// Lives for one resolution: slots filled by an earlier query are never
/// revisited by a later one.
#[derive(Debug, Default)]
pub struct BestByTier {
    slots: [Option<TierMatch>; 4],
}

impl BestByTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tier: Tier) -> Option<&TierMatch> {
        self.slots[tier.index()].as_ref()
    }

    pub fn any_filled(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Highest-priority filled slot.
    pub fn best(&self) -> Option<&TierMatch> {
        Tier::ALL.iter().find_map(|&tier| self.get(tier))
    }

    pub fn into_best(self) -> Option<TierMatch> {
        self.slots.into_iter().flatten().next()
    }

    /// Fill `tier` if empty. Returns true if the candidate was stored.
    fn offer(&mut self, m: TierMatch) -> bool {
        let slot = &mut self.slots[m.tier.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(m);
        true
    }
}

/// Route one page of search results into `best`.
///
/// Candidates whose title mentions neither the artist nor the song title are
/// dropped. Each remaining candidate lands in its tier's slot unless that slot
/// is already taken.
pub fn evaluate(page: &[Candidate], track: &Track, best: &mut BestByTier) {
    let artist_lower = track.artist.to_lowercase();
    let title_lower = track.title.to_lowercase();
    let forward = format!("{artist_lower} - {title_lower}");
    let reverse = format!("{title_lower} - {artist_lower}");

    for candidate in page {
        let display_lower = candidate.display_title.to_lowercase();

        let mentions_title = display_lower.contains(&title_lower);
        if !mentions_title && !display_lower.contains(&artist_lower) {
            log::debug!("  skip (irrelevant): {}", candidate.display_title);
            continue;
        }

        let classified = classify(&display_lower, &candidate.channel_name);
        let artist_channel = candidate.channel_name.to_lowercase().contains(&artist_lower);
        let exact_match = display_lower.contains(&forward) || display_lower.contains(&reverse);

        let (tier, indicator) = match classified {
            Some((tier, phrase)) => (tier, Some(phrase)),
            None => (Tier::Other, None),
        };

        let stored = best.offer(TierMatch {
            candidate: candidate.clone(),
            tier,
            indicator,
            exact_match,
            artist_channel,
        });

        if stored {
            log::debug!(
                "  {} slot <- {} [{}] exact={exact_match} artist_channel={artist_channel} strong={}",
                tier.label(),
                candidate.display_title,
                candidate.channel_name,
                exact_match || (artist_channel && mentions_title),
            );
        }
    }
}
