//! Monthly top tracks from Last.fm scrobble history.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, TimeZone};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::model::Track;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// `user.getrecenttracks` response. Errors come back as `{error, message}`.
#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracks>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: Vec<Scrobble>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}

#[derive(Debug, Deserialize)]
struct PageAttr {
    #[serde(rename = "totalPages")]
    total_pages: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Scrobble {
    artist: TextField,
    name: String,
    /// Missing on the "now playing" entry.
    date: Option<ScrobbleDate>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    #[serde(rename = "#text")]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ScrobbleDate {
    uts: String,
}

/// One cached month of scrobbles.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MonthEntry {
    last_fetched: i64,
    /// `[artist, title]` pairs, newest first.
    scrobbles: Vec<(String, String)>,
}

/// Settings for talking to Last.fm.
pub struct LastfmClient {
    api_key: String,
    page_size: u32,
    rate_limit_ms: u64,
}

impl LastfmClient {
    pub fn new(api_key: impl Into<String>, page_size: u32, rate_limit_ms: u64) -> Self {
        Self {
            api_key: api_key.into(),
            page_size,
            rate_limit_ms,
        }
    }

    /// All scrobbles by `user` in `[start, end)` (Unix seconds), newest first.
    ///
    /// History is paged newest first, so paging stops at the first scrobble
    /// older than `start`.
    pub fn fetch_scrobbles(&self, user: &str, start: i64, end: i64) -> Result<Vec<Track>> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());

        let mut scrobbles = Vec::new();
        let mut page = 1u32;

        loop {
            pb.set_message(format!("Fetching Last.fm page {page}..."));
            pb.tick();

            let tracks = self.fetch_page(user, page)?;
            let Some(tracks) = tracks.recenttracks else {
                log::warn!("Last.fm response has no recenttracks, stopping");
                break;
            };
            if tracks.track.is_empty() {
                break;
            }

            let reached_start = collect_in_range(&tracks.track, start, end, &mut scrobbles);
            if reached_start {
                log::info!("Reached scrobbles before the month on page {page}, stopping");
                break;
            }

            let total_pages = tracks
                .attr
                .and_then(|a| a.total_pages)
                .and_then(|t| t.parse::<u32>().ok());
            if total_pages.is_some_and(|total| page >= total) {
                break;
            }

            page += 1;
            thread::sleep(Duration::from_millis(self.rate_limit_ms));
        }

        pb.finish_and_clear();
        log::info!("Fetched {} scrobbles over {page} pages", scrobbles.len());
        Ok(scrobbles)
    }

    fn fetch_page(&self, user: &str, page: u32) -> Result<RecentTracksResponse> {
        log::debug!("Fetching recent tracks for {user}, page {page}");

        // Last.fm puts its {error, message} body on 4xx responses, so keep them
        let mut response = ureq::get(API_URL)
            .config()
            .http_status_as_error(false)
            .build()
            .query("method", "user.getrecenttracks")
            .query("user", user)
            .query("api_key", &self.api_key)
            .query("format", "json")
            .query("limit", self.page_size.to_string())
            .query("page", page.to_string())
            .call()
            .with_context(|| format!("HTTP request failed (page {page})"))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("Failed to read response (page {page})"))?;
        parse_page(status, &body).with_context(|| format!("Last.fm page {page}"))
    }
}

/// Interpret one `user.getrecenttracks` response.
///
/// An API error in the body wins over the HTTP status, so a rejected key
/// reports Last.fm's own message.
fn parse_page(status: u16, body: &str) -> Result<RecentTracksResponse> {
    let parsed = serde_json::from_str::<RecentTracksResponse>(body);

    match parsed {
        Ok(RecentTracksResponse {
            error: Some(code),
            message,
            ..
        }) => anyhow::bail!(
            "Last.fm API error {code}: {}",
            message.as_deref().unwrap_or("unknown error")
        ),
        _ if !(200..300).contains(&status) => anyhow::bail!("Last.fm returned HTTP {status}"),
        Ok(response) => Ok(response),
        Err(e) => Err(e).context("Failed to parse JSON"),
    }
}

/// Append scrobbles inside `[start, end)` to `out`.
/// Returns true once a scrobble older than `start` is seen.
fn collect_in_range(page: &[Scrobble], start: i64, end: i64, out: &mut Vec<Track>) -> bool {
    for s in page {
        let Some(date) = &s.date else {
            continue; // now playing
        };
        let Ok(ts) = date.uts.parse::<i64>() else {
            log::debug!("Skipping scrobble with bad timestamp {:?}", date.uts);
            continue;
        };
        if ts < start {
            return true;
        }
        if ts < end {
            out.push(Track::new(s.artist.text.clone(), s.name.clone()));
        }
    }
    false
}

/// Unix-second bounds `[start, end)` of a calendar month in `tz`.
pub fn month_bounds<Tz: TimeZone>(tz: &Tz, year: i32, month: u32) -> Result<(i64, i64)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("Invalid month {year}-{month:02}"))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .with_context(|| format!("Invalid month {year}-{month:02}"))?;

    let to_ts = |d: NaiveDate| -> Result<i64> {
        let midnight = d.and_hms_opt(0, 0, 0).context("Invalid midnight")?;
        let local = tz
            .from_local_datetime(&midnight)
            .earliest()
            .with_context(|| format!("{d} midnight does not exist in this time zone"))?;
        Ok(local.timestamp())
    };

    Ok((to_ts(first)?, to_ts(next)?))
}

/// Cache key for a user's month: `"{user}_{YYYY-MM}"`.
pub fn month_key(user: &str, year: i32, month: u32) -> String {
    format!("{user}_{year}-{month:02}")
}

/// The `n` most played tracks, most played first. Ties keep the order in
/// which the tracks first appear.
pub fn top_tracks(scrobbles: &[Track], n: usize) -> Vec<(Track, usize)> {
    let mut counts: HashMap<&Track, (usize, usize)> = HashMap::new();
    for (i, track) in scrobbles.iter().enumerate() {
        counts.entry(track).or_insert((0, i)).0 += 1;
    }

    let mut ranked: Vec<(&Track, usize, usize)> = counts
        .into_iter()
        .map(|(track, (count, first_seen))| (track, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(n)
        .map(|(track, count, _)| (track.clone(), count))
        .collect()
}

/// File-backed cache of fetched months, reused while fresh.
pub struct ScrobbleCache {
    path: PathBuf,
    months: BTreeMap<String, MonthEntry>,
}

impl ScrobbleCache {
    pub fn open(path: &Path) -> Result<Self> {
        let months = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        Ok(Self {
            path: path.to_path_buf(),
            months,
        })
    }

    /// Scrobbles for `key` if fetched less than `ttl_hours` before `now`.
    pub fn get_fresh(&self, key: &str, now: i64, ttl_hours: i64) -> Option<Vec<Track>> {
        let entry = self.months.get(key)?;
        if now - entry.last_fetched >= ttl_hours * 3600 {
            return None;
        }
        Some(
            entry
                .scrobbles
                .iter()
                .map(|(artist, title)| Track::new(artist.clone(), title.clone()))
                .collect(),
        )
    }

    pub fn store(&mut self, key: &str, now: i64, scrobbles: &[Track]) -> Result<()> {
        self.months.insert(
            key.to_string(),
            MonthEntry {
                last_fetched: now,
                scrobbles: scrobbles
                    .iter()
                    .map(|t| (t.artist.clone(), t.title.clone()))
                    .collect(),
            },
        );
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.months)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Everything needed to load one user's month.
pub struct MonthRequest<'a> {
    pub user: &'a str,
    pub year: i32,
    pub month: u32,
    pub limit: usize,
    /// Ignore a fresh cache entry and fetch again.
    pub refresh: bool,
}

/// Top tracks for a month, from the scrobble cache when fresh.
pub fn load_top_tracks(
    client: &LastfmClient,
    cache: &mut ScrobbleCache,
    ttl_hours: i64,
    req: &MonthRequest<'_>,
) -> Result<Vec<(Track, usize)>> {
    let key = month_key(req.user, req.year, req.month);
    let now = chrono::Utc::now().timestamp();

    let cached = if req.refresh {
        None
    } else {
        cache.get_fresh(&key, now, ttl_hours)
    };

    let scrobbles = match cached {
        Some(scrobbles) => {
            println!("Using cached scrobbles for {key}");
            scrobbles
        }
        None => {
            let (start, end) = month_bounds(&chrono::Local, req.year, req.month)?;
            let scrobbles = client
                .fetch_scrobbles(req.user, start, end)
                .context("Failed to fetch scrobbles")?;
            cache.store(&key, now, &scrobbles).context("Failed to cache scrobbles")?;
            scrobbles
        }
    };

    Ok(top_tracks(&scrobbles, req.limit))
}

/// English month name for titles ("March").
pub fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ];
    NAMES.get(month.wrapping_sub(1) as usize).copied().unwrap_or("Unknown")
}

/// Current (year, month) in local time.
pub fn current_month() -> (i32, u32) {
    let now = chrono::Local::now();
    (now.year(), now.month())
}
