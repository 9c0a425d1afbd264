//! Download, trim, caption and join clips by shelling out to yt-dlp and ffmpeg.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

/// Title card length in seconds.
const TITLE_CARD_SECS: u32 = 3;

/// yt-dlp format selector: mp4 video + m4a audio, else best single mp4.
const DOWNLOAD_FORMAT: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/best";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{0} not found. Install it and make sure it is on PATH")]
    ToolNotFound(&'static str),
    #[error("{tool} failed: {stderr}")]
    Failed { tool: &'static str, stderr: String },
    #[error("{} was not produced", .0.display())]
    NoOutput(PathBuf),
    #[error("Unexpected {tool} output: {output:?}")]
    BadOutput { tool: &'static str, output: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Turns a downloaded video into a captioned clip.
pub trait ClipExtractor {
    /// Cut `duration_secs` of `source` starting at `start_secs` into `output`.
    fn extract(
        &self,
        source: &Path,
        start_secs: u64,
        duration_secs: u64,
        output: &Path,
    ) -> Result<()>;

    /// Burn `text` into the bottom of `input`.
    fn overlay_caption(&self, input: &Path, output: &Path, text: &str) -> Result<()>;
}

/// Run a tool to completion, turning a non-zero exit into an error.
fn run<I, A>(tool: &'static str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let output = Command::new(tool).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::ToolNotFound(tool)
        } else {
            MediaError::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::Failed { tool, stderr });
    }
    Ok(output)
}

fn ensure_output(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::NoOutput(path.to_path_buf())),
    }
}

/// Length of the video at `url` in seconds, if the site reports one.
pub fn video_duration(url: &str) -> Result<Option<f64>> {
    let output = run(
        "yt-dlp",
        ["--skip-download", "--no-warnings", "--no-playlist", "--print", "duration", url],
    )?;
    Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .next()
        .and_then(|l| l.trim().parse::<f64>().ok())
        .filter(|d| *d > 0.0)
}

/// Where to start a clip so it fits inside the video.
///
/// Uses `preferred` unless the clip would run past the end, in which case the
/// clip is pulled back to end with the video.
pub fn clip_start(preferred: u64, clip_len: u64, video_duration: Option<f64>) -> u64 {
    match video_duration {
        Some(d) if (preferred + clip_len) as f64 > d => (d - clip_len as f64).max(0.0) as u64,
        _ => preferred,
    }
}

/// Download `url` to `output` as mp4.
pub fn download(url: &str, output: &Path) -> Result<()> {
    log::debug!("Downloading {url} -> {}", output.display());
    let out = output.to_string_lossy();
    run(
        "yt-dlp",
        [
            "--quiet",
            "--no-warnings",
            "--no-progress",
            "--no-playlist",
            "-f",
            DOWNLOAD_FORMAT,
            "--merge-output-format",
            "mp4",
            "-o",
            &*out,
            url,
        ],
    )?;
    ensure_output(output)
}

/// ffmpeg-based media operations, all encoding video with one codec.
pub struct Ffmpeg {
    codec: String,
}

/// Font and placement for a caption, scaled to the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub font_size: u32,
    pub shadow_x: u32,
    pub shadow_y: u32,
    /// drawtext `y` expression.
    pub y: String,
}

impl Default for CaptionLayout {
    fn default() -> Self {
        Self {
            font_size: 36,
            shadow_x: 2,
            shadow_y: 2,
            y: "h-100".to_string(),
        }
    }
}

/// Size a caption of `chars` characters for a `width`×`height` frame.
///
/// Base size is 5% of the height, shrunk so the estimated width (0.6 × size
/// per character) stays within 85% of the frame. The baseline sits 8% above
/// the bottom edge.
pub fn caption_layout(width: u32, height: u32, chars: usize) -> CaptionLayout {
    let base = (height as f64 * 0.05) as u32;
    let estimated = chars as f64 * base as f64 * 0.6;
    let budget = width as f64 * 0.85;
    let font_size = if estimated > budget {
        (base as f64 * budget / estimated) as u32
    } else {
        base
    };

    CaptionLayout {
        font_size: font_size.max(1),
        shadow_x: ((width as f64 * 0.002) as u32).max(2),
        shadow_y: ((height as f64 * 0.002) as u32).max(2),
        y: format!("h-{}", (height as f64 * 0.08) as u32),
    }
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape an unquoted filter option value for `-vf`.
///
/// Two passes: one for the filter's `key=value:...` option list, one for the
/// filtergraph that wraps it.
fn escape_filter_value(value: &str) -> String {
    let option = backslash_escape(value, &['\\', '\'', ':']);
    backslash_escape(&option, &['\\', '\'', '[', ']', ',', ';'])
}

/// Body of a concat-demuxer list file.
fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

fn parse_dimensions(stdout: &str) -> Option<(u32, u32)> {
    let (w, h) = stdout.lines().next()?.trim().split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Width and height of the first video stream.
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = run(
        "ffprobe",
        [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-select_streams"),
            OsStr::new("v:0"),
            OsStr::new("-show_entries"),
            OsStr::new("stream=width,height"),
            OsStr::new("-of"),
            OsStr::new("csv=p=0:s=x"),
            path.as_os_str(),
        ],
    )?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    parse_dimensions(&stdout).ok_or(MediaError::BadOutput {
        tool: "ffprobe",
        output: stdout,
    })
}

impl Ffmpeg {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }

    fn ffmpeg(&self, args: &[&OsStr]) -> Result<()> {
        let mut full: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("warning"),
            OsStr::new("-y"),
        ];
        full.extend_from_slice(args);
        run("ffmpeg", full)?;
        Ok(())
    }

    /// Render a black 1080p card with centered `text` and a silent track.
    pub fn title_card(&self, output: &Path, text: &str) -> Result<()> {
        let text_file = output.with_extension("caption.txt");
        fs::write(&text_file, text)?;

        let filter = format!(
            "drawtext=textfile={}:fontsize=50:fontcolor=white:x=(w-text_w)/2:y=(h-text_h)/2",
            escape_filter_value(&text_file.to_string_lossy()),
        );
        let video_src = format!("color=c=black:s=1920x1080:r=30:d={TITLE_CARD_SECS}");
        let duration = TITLE_CARD_SECS.to_string();

        let result = self.ffmpeg(&[
            OsStr::new("-f"),
            OsStr::new("lavfi"),
            OsStr::new("-i"),
            OsStr::new(&video_src),
            OsStr::new("-f"),
            OsStr::new("lavfi"),
            OsStr::new("-i"),
            OsStr::new("anullsrc=r=44100:cl=stereo"),
            OsStr::new("-t"),
            OsStr::new(&duration),
            OsStr::new("-vf"),
            OsStr::new(&filter),
            OsStr::new("-c:v"),
            OsStr::new(&self.codec),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-shortest"),
            output.as_os_str(),
        ]);
        fs::remove_file(&text_file).ok();
        result?;
        ensure_output(output)
    }

    /// Join `clips` in order into `output`, writing the list to `list_file`.
    pub fn concat(&self, clips: &[PathBuf], list_file: &Path, output: &Path) -> Result<()> {
        let absolute: Vec<PathBuf> = clips
            .iter()
            .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();
        fs::write(list_file, concat_list(&absolute))?;

        self.ffmpeg(&[
            OsStr::new("-f"),
            OsStr::new("concat"),
            OsStr::new("-safe"),
            OsStr::new("0"),
            OsStr::new("-i"),
            list_file.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new(&self.codec),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-b:a"),
            OsStr::new("192k"),
            OsStr::new("-r"),
            OsStr::new("30"),
            OsStr::new("-f"),
            OsStr::new("mp4"),
            output.as_os_str(),
        ])?;
        ensure_output(output)
    }

    fn encode_clip(&self, source: &Path, start: &str, duration: &str, output: &Path) -> Result<()> {
        self.ffmpeg(&[
            OsStr::new("-i"),
            source.as_os_str(),
            OsStr::new("-ss"),
            OsStr::new(start),
            OsStr::new("-t"),
            OsStr::new(duration),
            OsStr::new("-c:v"),
            OsStr::new(&self.codec),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-b:a"),
            OsStr::new("192k"),
            OsStr::new("-r"),
            OsStr::new("30"),
            OsStr::new("-vsync"),
            OsStr::new("cfr"),
            output.as_os_str(),
        ])?;
        ensure_output(output)
    }

    fn copy_clip(&self, source: &Path, start: &str, duration: &str, output: &Path) -> Result<()> {
        self.ffmpeg(&[
            OsStr::new("-i"),
            source.as_os_str(),
            OsStr::new("-ss"),
            OsStr::new(start),
            OsStr::new("-t"),
            OsStr::new(duration),
            OsStr::new("-c"),
            OsStr::new("copy"),
            output.as_os_str(),
        ])?;
        ensure_output(output)
    }
}

impl ClipExtractor for Ffmpeg {
    /// Re-encode the segment; fall back to a stream copy if the encoder fails.
    fn extract(
        &self,
        source: &Path,
        start_secs: u64,
        duration_secs: u64,
        output: &Path,
    ) -> Result<()> {
        let start = start_secs.to_string();
        let duration = duration_secs.to_string();

        match self.encode_clip(source, &start, &duration, output) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Encoding clip with {} failed ({e}), trying stream copy", self.codec);
                self.copy_clip(source, &start, &duration, output)
            }
        }
    }

    /// Caption sized to the frame, falling back to fixed values if probing fails.
    fn overlay_caption(&self, input: &Path, output: &Path, text: &str) -> Result<()> {
        let layout = match probe_dimensions(input) {
            Ok((w, h)) => caption_layout(w, h, text.chars().count()),
            Err(e) => {
                log::warn!("Could not probe {}: {e}. Using default caption size.", input.display());
                CaptionLayout::default()
            }
        };

        // drawtext reads the caption from a file so any script or quote survives
        let text_file = output.with_extension("caption.txt");
        fs::write(&text_file, text)?;

        let filter = format!(
            "drawtext=textfile={}:fontsize={}:fontcolor=white:x=(w-text_w)/2:y={}:\
             shadowcolor=black:shadowx={}:shadowy={}",
            escape_filter_value(&text_file.to_string_lossy()),
            layout.font_size,
            layout.y,
            layout.shadow_x,
            layout.shadow_y,
        );

        let result = self.ffmpeg(&[
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-vf"),
            OsStr::new(&filter),
            OsStr::new("-c:v"),
            OsStr::new(&self.codec),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-b:a"),
            OsStr::new("192k"),
            output.as_os_str(),
        ]);
        fs::remove_file(&text_file).ok();
        result?;
        ensure_output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_start_keeps_preferred_when_it_fits() {
        assert_eq!(clip_start(60, 15, Some(200.0)), 60);
        assert_eq!(clip_start(60, 15, Some(75.0)), 60);
        assert_eq!(clip_start(60, 15, None), 60);
    }

    #[test]
    fn clip_start_pulls_back_for_short_videos() {
        assert_eq!(clip_start(60, 15, Some(70.0)), 55);
        assert_eq!(clip_start(60, 15, Some(10.0)), 0);
    }

    #[test]
    fn parse_yt_dlp_duration() {
        assert_eq!(parse_duration("213\n"), Some(213.0));
        assert_eq!(parse_duration("212.5"), Some(212.5));
        assert_eq!(parse_duration("NA\n"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn parse_ffprobe_dimensions() {
        assert_eq!(parse_dimensions("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("640x360"), Some((640, 360)));
        assert_eq!(parse_dimensions("garbage"), None);
        assert_eq!(parse_dimensions(""), None);
    }

    #[test]
    fn caption_layout_short_text() {
        let l = caption_layout(1920, 1080, 20);
        assert_eq!(l.font_size, 54);
        assert_eq!(l.shadow_x, 3);
        assert_eq!(l.shadow_y, 2);
        assert_eq!(l.y, "h-86");
    }

    #[test]
    fn caption_layout_shrinks_long_text() {
        let l = caption_layout(1280, 720, 80);
        // base 36, estimated 80*36*0.6 = 1728 > 1088
        assert!(l.font_size < 36);
        assert_eq!(l.font_size, 22);
    }

    #[test]
    fn escape_filter_values() {
        assert_eq!(escape_filter_value("/tmp/a.txt"), "/tmp/a.txt");
        assert_eq!(escape_filter_value(r"C:\clips\a.txt"), r"C\\:\\\\clips\\\\a.txt");
        assert_eq!(escape_filter_value("a,b[1];c"), r"a\,b\[1\]\;c");
        let windows = r"C:\clips\a.txt";
        assert_eq!(unescape_once(&unescape_once(&escape_filter_value(windows))), windows);
    }

    #[test]
    fn apostrophe_in_caption_path_survives_both_levels() {
        // One level of unescaping per parser: filtergraph, then option list
        let escaped = escape_filter_value("/home/o'brien/clips/song_01.caption.txt");
        assert_eq!(escaped, r"/home/o\\\'brien/clips/song_01.caption.txt");
        assert_eq!(unescape_once(&unescape_once(&escaped)), "/home/o'brien/clips/song_01.caption.txt");
    }

    /// Drop one level of backslash escaping, as each ffmpeg parser does.
    fn unescape_once(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                out.extend(chars.next());
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/c/title.mp4"), PathBuf::from("/c/it's.mp4")]);
        assert_eq!(list, "file '/c/title.mp4'\nfile '/c/it'\\''s.mp4'\n");
    }
}
