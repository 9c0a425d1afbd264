//! One full run: top tracks for a month → matched videos → captioned clips →
//! a single countdown video.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::{JsonFileCache, UrlCache};
use crate::config::{AppConfig, ClipConfig};
use crate::lastfm::{self, LastfmClient, MonthRequest, ScrobbleCache};
use crate::matcher::{MatchSelector, MatchSource, Resolution, ResolveError, VideoSearch};
use crate::media::{self, ClipExtractor, Ffmpeg, MediaError};
use crate::model::Track;
use crate::prompt::ConsolePrompt;
use crate::youtube::YouTubeClient;

pub const VIDEO_CACHE_FILE: &str = "video_cache.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const SCROBBLE_CACHE_FILE: &str = "lastfm_cache.json";
const LIST_FILE: &str = "filelist.txt";

/// What to build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub user: String,
    pub year: i32,
    pub month: u32,
    pub count: usize,
    /// Prompt for a URL when search finds nothing.
    pub manual: bool,
    /// Re-fetch scrobbles even if the cached month is fresh.
    pub refresh: bool,
    /// Leave the clips directory in place afterwards.
    pub keep_clips: bool,
}

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildResult {
    pub output: PathBuf,
    pub included: usize,
    pub skipped: Vec<Track>,
}

/// Resolves tracks against YouTube with the on-disk caches.
pub type Selector = MatchSelector<YouTubeClient, JsonFileCache>;

/// The configured YouTube API key, required for anything that searches.
pub fn youtube_key(config: &AppConfig) -> Result<String> {
    config
        .youtube
        .api_key
        .clone()
        .context("No YouTube API key. Set YOUTUBE_API_KEY or [youtube] api_key in config.")
}

/// Open the match selector over `<cache_dir>/video_cache.json` and
/// `<cache_dir>/progress.json`, prompting on the console when needed.
pub fn open_selector(
    config: &AppConfig,
    cache_dir: &Path,
    api_key: String,
    prompt: ConsolePrompt,
    manual: bool,
) -> Result<Selector> {
    let cache = JsonFileCache::open(&cache_dir.join(VIDEO_CACHE_FILE))
        .context("Failed to open video cache")?;
    let progress = JsonFileCache::open(&cache_dir.join(PROGRESS_FILE))
        .context("Failed to open progress cache")?;
    log::info!("Video cache: {} entries in {}", cache.len(), cache.path().display());
    if !progress.is_empty() {
        log::info!("Resuming: {} tracks resolved by an earlier run", progress.len());
    }

    let mut selector = MatchSelector::new(
        YouTubeClient::new(api_key),
        cache,
        progress,
        Box::new(prompt.clone()),
    )
    .with_max_results(config.youtube.max_results);
    if manual || config.manual_fallback {
        selector = selector.with_manual_fallback(Box::new(prompt));
    }
    Ok(selector)
}

/// Load the month's top tracks, using the scrobble cache while fresh.
pub fn top_tracks(
    config: &AppConfig,
    cache_dir: &Path,
    req: &MonthRequest<'_>,
) -> Result<Vec<(Track, usize)>> {
    let api_key = config
        .lastfm
        .api_key
        .clone()
        .context("No Last.fm API key. Set LASTFM_API_KEY or [lastfm] api_key in config.")?;
    let client = LastfmClient::new(api_key, config.lastfm.page_size, config.lastfm.rate_limit_ms);
    let mut cache = ScrobbleCache::open(&cache_dir.join(SCROBBLE_CACHE_FILE))?;
    lastfm::load_top_tracks(&client, &mut cache, config.lastfm.cache_ttl_hours, req)
}

pub fn build(config: &AppConfig, cache_dir: &Path, opts: &BuildOptions) -> Result<BuildResult> {
    let top = top_tracks(
        config,
        cache_dir,
        &MonthRequest {
            user: &opts.user,
            year: opts.year,
            month: opts.month,
            limit: opts.count,
            refresh: opts.refresh,
        },
    )?;
    if top.is_empty() {
        anyhow::bail!(
            "No scrobbles for {} in {} {}",
            opts.user,
            lastfm::month_name(opts.month),
            opts.year
        );
    }
    let n = top.len();

    let clips_dir = config.resolve_clips_dir(cache_dir);
    fs::create_dir_all(&clips_dir)
        .with_context(|| format!("Failed to create {}", clips_dir.display()))?;

    let pb = ProgressBar::new(n as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut selector = open_selector(
        config,
        cache_dir,
        youtube_key(config)?,
        ConsolePrompt::new(pb.clone()),
        opts.manual,
    )?;
    let ffmpeg = Ffmpeg::new(config.clip.codec.clone());

    let Countdown { clips, skipped } = run_countdown(&mut selector, &top, &pb, |res, rank, label| {
        make_clip(&ffmpeg, &config.clip, &res.url, &clips_dir, rank, label)
    });
    pb.finish_and_clear();

    if clips.is_empty() {
        anyhow::bail!("No clips were produced, nothing to compile");
    }

    println!("Rendering title card and joining {} clips...", clips.len());
    let title = title_text(&opts.user, n, opts.year, opts.month);
    let title_path = clips_dir.join("title.mp4");
    ffmpeg
        .title_card(&title_path, &title)
        .context("Failed to render title card")?;

    let mut sequence = Vec::with_capacity(clips.len() + 1);
    sequence.push(title_path);
    sequence.extend(clips.iter().cloned());

    let output_dir = config.resolve_output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let output = output_dir.join(output_file_name(&opts.user, n, opts.year, opts.month));
    let list_file = clips_dir.join(LIST_FILE);
    ffmpeg
        .concat(&sequence, &list_file, &output)
        .context("Failed to join clips")?;

    // Resume state only matters for interrupted runs
    selector
        .progress_mut()
        .clear()
        .context("Failed to clear progress cache")?;
    if let Err(e) = fs::remove_file(&list_file) {
        log::debug!("Could not remove {}: {e}", list_file.display());
    }
    if !opts.keep_clips {
        if let Err(e) = fs::remove_dir_all(&clips_dir) {
            log::warn!("Could not remove {}: {e}", clips_dir.display());
        }
    }

    Ok(BuildResult {
        output,
        included: clips.len(),
        skipped,
    })
}

/// Clips made and tracks skipped by one pass over the ranking.
#[derive(Debug, Default)]
pub struct Countdown {
    /// In playback order: least played first.
    pub clips: Vec<PathBuf>,
    pub skipped: Vec<Track>,
}

/// Resolve and clip each ranked track, least played first.
///
/// A track that cannot be resolved or clipped is reported and skipped; the
/// rest of the ranking is still processed. `clip` receives the resolution,
/// the track's rank and its caption.
pub fn run_countdown<S, C, F>(
    selector: &mut MatchSelector<S, C>,
    top: &[(Track, usize)],
    pb: &ProgressBar,
    mut clip: F,
) -> Countdown
where
    S: VideoSearch,
    C: UrlCache,
    F: FnMut(&Resolution, usize, &str) -> Result<PathBuf, MediaError>,
{
    let mut out = Countdown::default();

    for (i, (track, plays)) in top.iter().enumerate().rev() {
        let rank = i + 1;
        let label = caption_label(rank, track);
        pb.set_message(label.clone());
        pb.println(format!("{label} ({plays} plays)"));

        let resolution = match selector.resolve(track) {
            Ok(Some(r)) => Some(r),
            Ok(None) => {
                pb.println("  no video found, skipping");
                None
            }
            Err(ResolveError::NoCredential) => {
                pb.println("  search quota exhausted, skipping");
                None
            }
            Err(e) => {
                log::warn!("Search failed for {track}: {e}");
                pb.println(format!("  search failed ({e}), skipping"));
                None
            }
        };

        match resolution {
            Some(resolution) => {
                pb.println(describe(&resolution));
                match clip(&resolution, rank, &label) {
                    Ok(path) => out.clips.push(path),
                    Err(e) => {
                        log::warn!("Clip for {track} failed: {e}");
                        pb.println(format!("  clip failed ({e}), skipping"));
                        out.skipped.push(track.clone());
                    }
                }
            }
            None => out.skipped.push(track.clone()),
        }
        pb.inc(1);
    }

    out
}

/// Download, trim and caption one song. Intermediate files are removed.
fn make_clip(
    extractor: &impl ClipExtractor,
    clip: &ClipConfig,
    url: &str,
    clips_dir: &Path,
    rank: usize,
    label: &str,
) -> Result<PathBuf, MediaError> {
    let duration = media::video_duration(url).unwrap_or_else(|e| {
        log::warn!("Could not read duration of {url}: {e}");
        None
    });
    let start = media::clip_start(clip.start_secs, clip.duration_secs, duration);
    log::debug!("Clip #{rank}: start {start}s, video length {duration:?}");

    let full = clips_dir.join(format!("song_{rank:02}_full.mp4"));
    let trimmed = clips_dir.join(format!("song_{rank:02}_trim.mp4"));
    let captioned = clips_dir.join(format!("song_{rank:02}.mp4"));

    media::download(url, &full)?;
    let result = extractor
        .extract(&full, start, clip.duration_secs, &trimmed)
        .and_then(|()| extractor.overlay_caption(&trimmed, &captioned, label));

    for path in [&full, &trimmed] {
        fs::remove_file(path).ok();
    }
    result.map(|()| captioned)
}

/// Caption burned into each clip: `"3. Artist - Title"`.
pub fn caption_label(rank: usize, track: &Track) -> String {
    format!("{rank}. {track}")
}

pub fn title_text(user: &str, n: usize, year: i32, month: u32) -> String {
    format!("{user}'s Top {n} songs of {} {year}", lastfm::month_name(month))
}

pub fn output_file_name(user: &str, n: usize, year: i32, month: u32) -> String {
    format!("{user}_top{n}_{year}_{month:02}.mp4")
}

/// One-line report of where a match came from.
pub fn describe(resolution: &Resolution) -> String {
    match &resolution.source {
        MatchSource::Cache => format!("  cached: {}", resolution.url),
        MatchSource::Search(m) => format!(
            "  {}: {} [{}] {}",
            m.kind(),
            m.candidate.display_title,
            m.candidate.channel_name,
            resolution.url
        ),
        MatchSource::Manual => format!("  manual: {}", resolution.url),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::matcher::SearchError;
    use crate::matcher::evaluate::TierMatch;
    use crate::model::{Candidate, Tier};

    /// Scripted search: each call pops the next page.
    struct ScriptedSearch {
        pages: VecDeque<Result<Vec<Candidate>, SearchError>>,
    }

    impl VideoSearch for ScriptedSearch {
        fn search(&mut self, _query: &str, _max: u32) -> Result<Vec<Candidate>, SearchError> {
            self.pages.pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn set_api_key(&mut self, _key: String) {}
    }

    fn selector(
        pages: Vec<Result<Vec<Candidate>, SearchError>>,
    ) -> MatchSelector<ScriptedSearch, MemoryCache> {
        MatchSelector::new(
            ScriptedSearch {
                pages: pages.into(),
            },
            MemoryCache::new(),
            MemoryCache::new(),
            Box::new(|| None::<String>),
        )
    }

    fn ranking() -> Vec<(Track, usize)> {
        vec![
            (Track::new("Alpha", "First"), 9),
            (Track::new("Beta", "Second"), 5),
            (Track::new("Gamma", "Third"), 2),
        ]
    }

    #[test]
    fn failed_tracks_are_skipped_and_the_run_continues() {
        // Countdown order: Gamma (search error), Beta (nothing relevant), Alpha (match)
        let mut sel = selector(vec![
            Err(SearchError::Status { status: 500 }),
            Ok(vec![Candidate::from_video_id("x", "Unrelated", "Someone")]),
            Ok(vec![Candidate::from_video_id("y", "Still unrelated", "Someone")]),
            Ok(vec![Candidate::from_video_id("a1", "Alpha - First (Official Video)", "AlphaVEVO")]),
        ]);

        let mut clipped = Vec::new();
        let out = run_countdown(&mut sel, &ranking(), &ProgressBar::hidden(), |res, rank, label| {
            clipped.push((res.url.clone(), rank, label.to_string()));
            Ok(PathBuf::from(format!("song_{rank:02}.mp4")))
        });

        assert_eq!(
            clipped,
            vec![(
                "https://www.youtube.com/watch?v=a1".to_string(),
                1,
                "1. Alpha - First".to_string()
            )]
        );
        assert_eq!(out.clips, vec![PathBuf::from("song_01.mp4")]);
        assert_eq!(
            out.skipped,
            vec![Track::new("Gamma", "Third"), Track::new("Beta", "Second")]
        );
    }

    #[test]
    fn clip_failure_skips_only_that_track() {
        let mut sel = selector(vec![
            Ok(vec![Candidate::from_video_id("g", "Gamma - Third", "Gamma")]),
            Ok(vec![Candidate::from_video_id("b", "Beta - Second", "Beta")]),
            Ok(vec![Candidate::from_video_id("a", "Alpha - First", "Alpha")]),
        ]);

        let out = run_countdown(&mut sel, &ranking(), &ProgressBar::hidden(), |_, rank, _| {
            if rank == 2 {
                Err(MediaError::NoOutput(PathBuf::from("song_02.mp4")))
            } else {
                Ok(PathBuf::from(format!("song_{rank:02}.mp4")))
            }
        });

        // Least played first
        assert_eq!(
            out.clips,
            vec![PathBuf::from("song_03.mp4"), PathBuf::from("song_01.mp4")]
        );
        assert_eq!(out.skipped, vec![Track::new("Beta", "Second")]);
    }

    #[test]
    fn names_and_labels() {
        let t = Track::new("Phoenix", "Lisztomania");
        assert_eq!(caption_label(3, &t), "3. Phoenix - Lisztomania");
        assert_eq!(output_file_name("rj", 10, 2024, 3), "rj_top10_2024_03.mp4");
        assert_eq!(title_text("rj", 10, 2024, 3), "rj's Top 10 songs of March 2024");
    }

    #[test]
    fn describe_sources() {
        let url = "https://www.youtube.com/watch?v=x1".to_string();
        let cached = Resolution {
            key: "A - B".into(),
            url: url.clone(),
            source: MatchSource::Cache,
        };
        assert_eq!(describe(&cached), format!("  cached: {url}"));

        let m = TierMatch {
            candidate: Candidate::from_video_id("x1", "A - B (Official Video)", "AVEVO"),
            tier: Tier::MusicVideo,
            indicator: Some("official video"),
            exact_match: true,
            artist_channel: false,
        };
        let searched = Resolution {
            key: "A - B".into(),
            url: url.clone(),
            source: MatchSource::Search(m),
        };
        assert_eq!(
            describe(&searched),
            format!("  music video: A - B (Official Video) [AVEVO] {url}")
        );
    }
}
