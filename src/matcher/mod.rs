//! Pick the one video that best represents a song.
//!
//! A resolution checks the match cache, then runs a short fixed list of
//! searches. Every relevant result is sorted into a tier slot (music video,
//! audio, lyrics, other); the first slot filled in priority order wins.

pub mod classify;
pub mod evaluate;
pub mod indicators;

use thiserror::Error;

use crate::cache::{self, CacheError, UrlCache};
use crate::model::{Candidate, Track, is_watch_url};
use evaluate::{BestByTier, TierMatch, evaluate};

/// Results requested per search.
pub const DEFAULT_MAX_RESULTS: u32 = 8;

/// Hint appended to the second search.
const QUALITY_HINT: &str = "official MV";

#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP 403: daily quota spent or key rejected.
    #[error("Search rejected with HTTP {status} (quota exceeded or key invalid)")]
    Quota { status: u16 },
    #[error("Search failed with HTTP {status}")]
    Status { status: u16 },
    #[error("Search request failed: {0}")]
    Transport(String),
    #[error("Unexpected search response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("Search quota exceeded and no replacement API key was given")]
    NoCredential,
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// A video catalog that can be searched for music.
pub trait VideoSearch {
    /// Search the music category, most relevant first.
    fn search(&mut self, query: &str, max_results: u32) -> Result<Vec<Candidate>, SearchError>;

    /// Swap the API key used for subsequent searches.
    fn set_api_key(&mut self, key: String);
}

/// Supplies a fresh API key after a quota failure. `None` means give up.
pub trait CredentialSource {
    fn replacement_key(&mut self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: FnMut() -> Option<String>,
{
    fn replacement_key(&mut self) -> Option<String> {
        self()
    }
}

/// Asks someone for a URL when search found nothing.
pub trait ManualUrlSource {
    fn manual_url(&mut self, track: &Track) -> Option<String>;
}

impl<F> ManualUrlSource for F
where
    F: FnMut(&Track) -> Option<String>,
{
    fn manual_url(&mut self, track: &Track) -> Option<String> {
        self(track)
    }
}

/// Where a resolved URL came from.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSource {
    Cache,
    Search(TierMatch),
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: String,
    pub url: String,
    pub source: MatchSource,
}

/// The searches tried for a track, in order.
pub fn search_queries(track: &Track) -> [String; 2] {
    let base = format!("{} - {}", track.artist, track.title);
    let hinted = format!("{base} {QUALITY_HINT}");
    [base, hinted]
}

/// Resolves tracks to video URLs, owning the search client and both caches.
pub struct MatchSelector<S, C> {
    search: S,
    cache: C,
    progress: C,
    credentials: Box<dyn CredentialSource>,
    manual: Option<Box<dyn ManualUrlSource>>,
    max_results: u32,
}

impl<S: VideoSearch, C: UrlCache> MatchSelector<S, C> {
    /// `cache` is the long-lived match cache; `progress` tracks the current run.
    pub fn new(search: S, cache: C, progress: C, credentials: Box<dyn CredentialSource>) -> Self {
        Self {
            search,
            cache,
            progress,
            credentials,
            manual: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Ask `source` for a URL when search finds nothing.
    pub fn with_manual_fallback(mut self, source: Box<dyn ManualUrlSource>) -> Self {
        self.manual = Some(source);
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn progress(&self) -> &C {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut C {
        &mut self.progress
    }

    /// Find the best video for `track`.
    ///
    /// `Ok(None)` means nothing relevant was found (and no usable manual URL
    /// was given). Quota failures are retried after swapping keys; any other
    /// search failure is returned.
    pub fn resolve(&mut self, track: &Track) -> Result<Option<Resolution>, ResolveError> {
        let key = cache::cache_key(track);

        if let Some(url) = self.cache.get(&key) {
            log::info!("Cached match for {key}: {url}");
            self.remember(&key, &url)?;
            return Ok(Some(Resolution {
                key,
                url,
                source: MatchSource::Cache,
            }));
        }

        let mut best = BestByTier::new();
        for query in search_queries(track) {
            log::info!("Searching: {query}");
            let page = self.search_with_retry(&query)?;
            log::debug!("  {} results", page.len());
            evaluate(&page, track, &mut best);

            // TODO: keep searching when only the Other slot is filled, so a
            // weak first page cannot hide an official video on the second.
            if best.any_filled() {
                break;
            }
        }

        if let Some(m) = best.into_best() {
            log::info!(
                "Matched {key} as {}: {} [{}]",
                m.kind(),
                m.candidate.display_title,
                m.candidate.channel_name
            );
            let url = m.candidate.url.clone();
            self.remember(&key, &url)?;
            return Ok(Some(Resolution {
                key,
                url,
                source: MatchSource::Search(m),
            }));
        }

        log::info!("No relevant video found for {key}");

        let Some(manual) = self.manual.as_mut() else {
            return Ok(None);
        };
        match manual.manual_url(track) {
            Some(url) if is_watch_url(url.trim()) => {
                let url = url.trim().to_string();
                self.remember(&key, &url)?;
                Ok(Some(Resolution {
                    key,
                    url,
                    source: MatchSource::Manual,
                }))
            }
            Some(url) if !url.trim().is_empty() => {
                log::warn!("Ignoring manual URL that is not a watch URL: {url}");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Record a URL for `track` chosen outside of search, e.g. a correction.
    pub fn pin(&mut self, track: &Track, url: &str) -> Result<String, ResolveError> {
        let key = cache::cache_key(track);
        self.remember(&key, url)?;
        Ok(key)
    }

    /// Drop any cached match for `track`. Returns true if one existed.
    pub fn forget(&mut self, track: &Track) -> Result<bool, ResolveError> {
        let key = cache::cache_key(track);
        let in_cache = self.cache.remove(&key)?;
        let in_progress = self.progress.remove(&key)?;
        Ok(in_cache || in_progress)
    }

    fn search_with_retry(&mut self, query: &str) -> Result<Vec<Candidate>, ResolveError> {
        loop {
            match self.search.search(query, self.max_results) {
                Ok(page) => return Ok(page),
                Err(SearchError::Quota { status }) => {
                    log::warn!("Search quota hit (HTTP {status}), asking for a new API key");
                    let key = self
                        .credentials
                        .replacement_key()
                        .filter(|k| !k.trim().is_empty())
                        .ok_or(ResolveError::NoCredential)?;
                    self.search.set_api_key(key.trim().to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn remember(&mut self, key: &str, url: &str) -> Result<(), CacheError> {
        if self.cache.get(key).as_deref() != Some(url) {
            self.cache.put(key, url)?;
        }
        self.progress.put(key, url)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::model::Tier;

    /// Scripted search: each call pops the next response.
    #[derive(Default)]
    struct FakeSearch {
        responses: VecDeque<Result<Vec<Candidate>, SearchError>>,
        queries: Vec<String>,
        keys: Vec<String>,
    }

    impl FakeSearch {
        fn with(responses: Vec<Result<Vec<Candidate>, SearchError>>) -> Self {
            Self {
                responses: responses.into(),
                ..Self::default()
            }
        }
    }

    impl VideoSearch for FakeSearch {
        fn search(&mut self, query: &str, _max_results: u32) -> Result<Vec<Candidate>, SearchError> {
            self.queries.push(query.to_string());
            self.responses.pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn set_api_key(&mut self, key: String) {
            self.keys.push(key);
        }
    }

    fn cand(id: &str, title: &str, channel: &str) -> Candidate {
        Candidate::from_video_id(id, title, channel)
    }

    fn url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={id}")
    }

    fn no_credentials() -> Box<dyn CredentialSource> {
        Box::new(|| None::<String>)
    }

    fn selector(search: FakeSearch) -> MatchSelector<FakeSearch, MemoryCache> {
        MatchSelector::new(search, MemoryCache::new(), MemoryCache::new(), no_credentials())
    }

    fn track() -> Track {
        Track::new("Artist", "Song")
    }

    #[test]
    fn queries_are_plain_then_hinted() {
        assert_eq!(
            search_queries(&track()),
            ["Artist - Song".to_string(), "Artist - Song official MV".to_string()]
        );
    }

    #[test]
    fn official_video_on_first_page() {
        let mut sel = selector(FakeSearch::with(vec![Ok(vec![cand(
            "mv1",
            "Artist - Song (Official Music Video)",
            "ArtistVEVO",
        )])]));

        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("mv1"));
        assert_eq!(r.key, "Artist - Song");
        match &r.source {
            MatchSource::Search(m) => {
                assert_eq!(m.tier, Tier::MusicVideo);
                assert!(m.exact_match);
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(sel.cache().get("Artist - Song"), Some(url("mv1")));
        assert_eq!(sel.progress().get("Artist - Song"), Some(url("mv1")));
        // Early exit: second query never issued
        assert_eq!(sel.search().queries, vec!["Artist - Song"]);
    }

    #[test]
    fn music_video_from_second_query_when_first_page_is_irrelevant() {
        let mut sel = selector(FakeSearch::with(vec![
            Ok(vec![cand("x", "Unrelated upload", "Someone")]),
            Ok(vec![
                cand("lyr", "Artist - Song (Lyrics)", "Fan"),
                cand("mv", "Artist - Song Official MV", "Label"),
            ]),
        ]));

        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("mv"));
        assert_eq!(sel.search().queries.len(), 2);
    }

    #[test]
    fn slots_accumulate_and_priority_is_decided_last() {
        // Two pages evaluated into one map, as resolve() does across queries
        let t = track();
        let mut best = BestByTier::new();
        evaluate(&[cand("lyr", "Artist - Song (Lyrics)", "Fan")], &t, &mut best);
        evaluate(&[cand("mv", "Artist - Song Official MV", "Label")], &t, &mut best);
        assert_eq!(best.get(Tier::Lyrics).unwrap().candidate.id, "lyr");
        assert_eq!(best.best().unwrap().candidate.id, "mv");
    }

    #[test]
    fn lyric_video_on_first_page_stops_the_search() {
        let mut sel = selector(FakeSearch::with(vec![
            Ok(vec![cand("lyr", "Artist - Song (Lyrics)", "Fan")]),
            Ok(vec![cand("mv", "Artist - Song Official MV", "Label")]),
        ]));
        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("lyr"));
        assert_eq!(sel.search().queries, vec!["Artist - Song"]);
    }

    #[test]
    fn cache_hit_skips_search() {
        let mut cache = MemoryCache::new();
        cache.put("Artist - Song", &url("cached")).unwrap();
        let mut sel = MatchSelector::new(
            FakeSearch::default(),
            cache,
            MemoryCache::new(),
            no_credentials(),
        );

        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("cached"));
        assert_eq!(r.source, MatchSource::Cache);
        assert!(sel.search().queries.is_empty());
        assert_eq!(sel.progress().get("Artist - Song"), Some(url("cached")));
    }

    #[test]
    fn nothing_relevant_without_fallback_caches_nothing() {
        let mut sel = selector(FakeSearch::with(vec![
            Ok(vec![cand("a", "Other Band - Hit (Official Video)", "OtherVEVO")]),
            Ok(vec![cand("b", "Completely different", "Nobody")]),
        ]));

        assert_eq!(sel.resolve(&track()).unwrap(), None);
        assert_eq!(sel.search().queries.len(), 2);
        assert!(sel.cache().is_empty());
        assert!(sel.progress().is_empty());
    }

    #[test]
    fn quota_error_refreshes_key_and_retries_same_query() {
        let mut handed_out = 0;
        let credentials = Box::new(move || {
            handed_out += 1;
            Some(format!("key-{handed_out}"))
        });
        let search = FakeSearch::with(vec![
            Err(SearchError::Quota { status: 403 }),
            Ok(vec![cand("ok", "Artist - Song (Official Audio)", "Label")]),
        ]);
        let mut sel = MatchSelector::new(search, MemoryCache::new(), MemoryCache::new(), credentials);

        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("ok"));
        assert_eq!(sel.search().keys, vec!["key-1"]);
        assert_eq!(sel.search().queries, vec!["Artist - Song", "Artist - Song"]);
    }

    #[test]
    fn quota_without_replacement_key_fails() {
        let mut sel = selector(FakeSearch::with(vec![Err(SearchError::Quota { status: 403 })]));
        assert!(matches!(sel.resolve(&track()), Err(ResolveError::NoCredential)));
        assert!(sel.cache().is_empty());
    }

    #[test]
    fn blank_replacement_key_counts_as_none() {
        let search = FakeSearch::with(vec![Err(SearchError::Quota { status: 403 })]);
        let mut sel = MatchSelector::new(
            search,
            MemoryCache::new(),
            MemoryCache::new(),
            Box::new(|| Some("   ".to_string())),
        );
        assert!(matches!(sel.resolve(&track()), Err(ResolveError::NoCredential)));
        assert!(sel.search().keys.is_empty());
    }

    #[test]
    fn other_search_errors_propagate() {
        let mut sel = selector(FakeSearch::with(vec![Err(SearchError::Status { status: 500 })]));
        assert!(matches!(
            sel.resolve(&track()),
            Err(ResolveError::Search(SearchError::Status { status: 500 }))
        ));
        assert_eq!(sel.search().queries.len(), 1);
    }

    #[test]
    fn resolve_is_idempotent_with_warm_cache() {
        let mut sel = selector(FakeSearch::with(vec![Ok(vec![cand(
            "v",
            "Artist - Song (Official Video)",
            "Label",
        )])]));

        let first = sel.resolve(&track()).unwrap().unwrap();
        let searches = sel.search().queries.len();
        let second = sel.resolve(&track()).unwrap().unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(sel.search().queries.len(), searches);
    }

    #[test]
    fn early_exit_even_when_only_other_is_filled() {
        let mut sel = selector(FakeSearch::with(vec![
            Ok(vec![cand("weak", "Artist at the fair", "Fan")]),
            Ok(vec![cand("mv", "Artist - Song (Official Video)", "Label")]),
        ]));
        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("weak"));
        assert_eq!(sel.search().queries.len(), 1);
    }

    #[test]
    fn relevance_gate_beats_strong_indicators() {
        let mut sel = selector(FakeSearch::with(vec![
            Ok(vec![cand("a", "Official Music Video", "VEVO")]),
            Ok(vec![cand("b", "Official Music Video", "VEVO")]),
        ]));
        assert_eq!(sel.resolve(&track()).unwrap(), None);
    }

    #[test]
    fn manual_fallback_accepts_watch_url() {
        let mut sel = selector(FakeSearch::default()).with_manual_fallback(Box::new(
            |t: &Track| {
                assert_eq!(t.title, "Song");
                Some(format!(" {} ", url("manual")))
            },
        ));
        let r = sel.resolve(&track()).unwrap().unwrap();
        assert_eq!(r.url, url("manual"));
        assert_eq!(r.source, MatchSource::Manual);
        assert_eq!(sel.cache().get("Artist - Song"), Some(url("manual")));
    }

    #[test]
    fn manual_fallback_rejects_other_urls() {
        let mut sel = selector(FakeSearch::default())
            .with_manual_fallback(Box::new(|_: &Track| Some("https://youtu.be/abc".to_string())));
        assert_eq!(sel.resolve(&track()).unwrap(), None);
        assert!(sel.cache().is_empty());
    }

    #[test]
    fn manual_fallback_skip() {
        let mut sel =
            selector(FakeSearch::default()).with_manual_fallback(Box::new(|_: &Track| None::<String>));
        assert_eq!(sel.resolve(&track()).unwrap(), None);
    }

    #[test]
    fn manual_fallback_not_asked_when_search_matches() {
        let mut sel = selector(FakeSearch::with(vec![Ok(vec![cand("v", "Artist - Song", "Fan")])]))
            .with_manual_fallback(Box::new(|_: &Track| -> Option<String> {
                panic!("should not prompt")
            }));
        assert_eq!(sel.resolve(&track()).unwrap().unwrap().url, url("v"));
    }

    #[test]
    fn pin_and_forget() {
        let mut sel = selector(FakeSearch::default());
        let key = sel.pin(&track(), &url("fixed")).unwrap();
        assert_eq!(key, "Artist - Song");
        assert_eq!(sel.resolve(&track()).unwrap().unwrap().url, url("fixed"));

        assert!(sel.forget(&track()).unwrap());
        assert!(!sel.forget(&track()).unwrap());
        assert!(sel.cache().is_empty());
    }

    #[test]
    fn cache_key_uses_gentle_cleaning() {
        let mut cache = MemoryCache::new();
        cache.put("ACDC - Back in Black", &url("acdc")).unwrap();
        let mut sel = MatchSelector::new(
            FakeSearch::default(),
            cache,
            MemoryCache::new(),
            no_credentials(),
        );
        let r = sel.resolve(&Track::new("AC/DC", "Back in Black")).unwrap().unwrap();
        assert_eq!(r.url, url("acdc"));
    }
}
