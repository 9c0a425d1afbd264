use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::PathBuf;
use videofm::compile::{self, BuildOptions};
use videofm::lastfm::{self, MonthRequest};
use videofm::matcher::MatchSource;
use videofm::model::{Track, is_watch_url};
use videofm::prompt::ConsolePrompt;

#[derive(Parser)]
#[command(
    name = "videofm",
    version,
    about = "Turn a Last.fm month into a countdown video of your top songs"
)]
struct Cli {
    /// Directory for match and scrobble caches
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Which user and month to look at.
#[derive(Args)]
struct MonthArgs {
    /// Last.fm username
    #[arg(short, long)]
    user: String,

    /// Year (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Month 1-12 (defaults to the current month)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    /// Number of songs
    #[arg(short = 'n', long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=50))]
    count: u32,

    /// Re-fetch scrobbles even if a recent copy is cached
    #[arg(long)]
    refresh: bool,
}

impl MonthArgs {
    fn year_month(&self) -> (i32, u32) {
        let (year, month) = lastfm::current_month();
        (self.year.unwrap_or(year), self.month.unwrap_or(month))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the countdown video for a month
    Build {
        #[command(flatten)]
        month: MonthArgs,

        /// Ask for a URL when no video is found
        #[arg(long)]
        manual: bool,

        /// Keep downloaded clips after the video is built
        #[arg(long)]
        keep_clips: bool,
    },

    /// Print a month's most played songs
    Top {
        #[command(flatten)]
        month: MonthArgs,
    },

    /// Find the video for one song
    Resolve {
        artist: String,
        title: String,

        /// Ask for a URL when no video is found
        #[arg(long)]
        manual: bool,
    },

    /// Replace the cached video for a song
    Pin {
        artist: String,
        title: String,
        /// YouTube watch URL
        url: String,
    },

    /// Drop the cached video for a song so it is searched again
    Forget { artist: String, title: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = videofm::config::AppConfig::load();

    // Resolve cache dir: CLI > config > XDG default
    let cache_dir = cli.cache_dir.unwrap_or_else(|| config.resolve_cache_dir());
    log::info!("Cache directory: {}", cache_dir.display());

    match cli.command {
        Commands::Build {
            month,
            manual,
            keep_clips,
        } => {
            let (year, mon) = month.year_month();
            let opts = BuildOptions {
                user: month.user.clone(),
                year,
                month: mon,
                count: month.count as usize,
                manual,
                refresh: month.refresh,
                keep_clips,
            };
            let result = compile::build(&config, &cache_dir, &opts).context("Build failed")?;

            println!(
                "Built {} with {} clips",
                result.output.display(),
                result.included
            );
            if !result.skipped.is_empty() {
                println!("Skipped {} songs:", result.skipped.len());
                for track in &result.skipped {
                    println!("  {track}");
                }
                println!("Use `videofm pin <artist> <title> <url>` to supply a video and rebuild.");
            }
        }

        Commands::Top { month } => {
            let (year, mon) = month.year_month();
            let top = compile::top_tracks(
                &config,
                &cache_dir,
                &MonthRequest {
                    user: &month.user,
                    year,
                    month: mon,
                    limit: month.count as usize,
                    refresh: month.refresh,
                },
            )?;

            if top.is_empty() {
                println!("No scrobbles for {} in {} {}.", month.user, lastfm::month_name(mon), year);
                return Ok(());
            }

            println!(
                "Top {} songs for {} in {} {}:",
                top.len(),
                month.user,
                lastfm::month_name(mon),
                year
            );
            println!();
            for (i, (track, plays)) in top.iter().enumerate() {
                println!("{:>3}. {:<60} {:>4} plays", i + 1, track.to_string(), plays);
            }
        }

        Commands::Resolve {
            artist,
            title,
            manual,
        } => {
            let track = Track::new(artist, title);
            let prompt = ConsolePrompt::new(ProgressBar::hidden());
            let api_key = compile::youtube_key(&config)?;
            let mut selector =
                compile::open_selector(&config, &cache_dir, api_key, prompt, manual)?;

            match selector.resolve(&track)? {
                Some(resolution) => {
                    match &resolution.source {
                        MatchSource::Cache => println!("{track} (cached)"),
                        MatchSource::Search(m) => println!(
                            "{track} ({}: {} [{}])",
                            m.kind(),
                            m.candidate.display_title,
                            m.candidate.channel_name
                        ),
                        MatchSource::Manual => println!("{track} (manual)"),
                    }
                    println!("{}", resolution.url);
                }
                None => println!("No video found for {track}."),
            }
        }

        Commands::Pin { artist, title, url } => {
            let url = url.trim();
            if !is_watch_url(url) {
                anyhow::bail!("Not a YouTube watch URL: {url}");
            }
            let track = Track::new(artist, title);
            let prompt = ConsolePrompt::new(ProgressBar::hidden());
            // No searching, so no key needed
            let mut selector =
                compile::open_selector(&config, &cache_dir, String::new(), prompt, false)?;
            let key = selector.pin(&track, url)?;
            println!("Pinned {key} -> {url}");
        }

        Commands::Forget { artist, title } => {
            let track = Track::new(artist, title);
            let prompt = ConsolePrompt::new(ProgressBar::hidden());
            // No searching, so no key needed
            let mut selector =
                compile::open_selector(&config, &cache_dir, String::new(), prompt, false)?;
            if selector.forget(&track)? {
                println!("Forgot cached video for {track}");
            } else {
                println!("No cached video for {track}");
            }
        }
    }

    Ok(())
}
