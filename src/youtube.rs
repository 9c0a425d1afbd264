use serde::Deserialize;

use crate::matcher::{SearchError, VideoSearch};
use crate::model::Candidate;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// YouTube's "Music" video category.
const MUSIC_CATEGORY_ID: &str = "10";

/// YouTube Data API v3 search response (partial, we only need `items`).
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

/// Channels and playlists come back without a `videoId`.
#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
}

/// Video search backed by the YouTube Data API.
pub struct YouTubeClient {
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl VideoSearch for YouTubeClient {
    fn search(&mut self, query: &str, max_results: u32) -> Result<Vec<Candidate>, SearchError> {
        log::debug!("GET {SEARCH_URL} q={query:?} maxResults={max_results}");

        let mut response = ureq::get(SEARCH_URL)
            .query("part", "snippet")
            .query("q", query)
            .query("type", "video")
            .query("maxResults", max_results.to_string())
            .query("order", "relevance")
            .query("videoCategoryId", MUSIC_CATEGORY_ID)
            .query("key", &self.api_key)
            .call()
            .map_err(classify_http_error)?;

        let body: SearchResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(candidates_from(body))
    }

    fn set_api_key(&mut self, key: String) {
        self.api_key = key;
    }
}

fn classify_http_error(e: ureq::Error) -> SearchError {
    match e {
        ureq::Error::StatusCode(403) => SearchError::Quota { status: 403 },
        ureq::Error::StatusCode(status) => SearchError::Status { status },
        other => SearchError::Transport(other.to_string()),
    }
}

fn candidates_from(response: SearchResponse) -> Vec<Candidate> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.video_id?;
            Some(Candidate::from_video_id(
                id,
                unescape_html(&item.snippet.title),
                unescape_html(&item.snippet.channel_title),
            ))
        })
        .collect()
}

/// Undo the HTML escaping the API applies to snippet text.
fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
