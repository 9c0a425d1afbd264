//! Interactive terminal prompts for a replacement API key or a manual URL.

use std::io::{self, BufRead, Write};

use indicatif::ProgressBar;

use crate::matcher::{CredentialSource, ManualUrlSource};
use crate::model::Track;

/// Reads answers from stdin, pausing `progress` while the question is shown.
#[derive(Clone)]
pub struct ConsolePrompt {
    progress: ProgressBar,
}

impl ConsolePrompt {
    pub fn new(progress: ProgressBar) -> Self {
        Self { progress }
    }

    fn ask(&self, question: &str) -> Option<String> {
        self.progress.suspend(|| {
            print!("{question}");
            io::stdout().flush().ok()?;
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) => None, // EOF
                Ok(_) => Some(line.trim().to_string()),
                Err(e) => {
                    log::warn!("Failed to read answer: {e}");
                    None
                }
            }
        })
    }
}

impl CredentialSource for ConsolePrompt {
    fn replacement_key(&mut self) -> Option<String> {
        self.progress.suspend(|| {
            println!("YouTube API quota exceeded (or the key was rejected).");
        });
        self.ask("Enter a new YouTube API key (blank to skip): ")
            .filter(|k| !k.is_empty())
    }
}

impl ManualUrlSource for ConsolePrompt {
    fn manual_url(&mut self, track: &Track) -> Option<String> {
        self.ask(&format!(
            "No video found for \"{track}\". Paste a YouTube URL (blank to skip): "
        ))
        .filter(|u| !u.is_empty())
    }
}
