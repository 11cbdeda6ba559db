//! Turns plain-text stories and polls into the JSON documents published to `cms/*`.
//!
//! Stories are separated by a `===STORY===` line:
//!
//! ```text
//! Title: Waiting Well
//! Subtitle: What patience taught us
//! Category: Singles
//! First paragraph.
//! Second paragraph.
//! Lesson: Patience is active.
//! ```
//!
//! Polls are separated by `===POLL===` and hold a `Question:` line followed by
//! `Option A:`, `Option B:` ... lines.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const STORY_SEPARATOR: &str = "\n\n===STORY===\n\n";
const POLL_SEPARATOR: &str = "\n\n===POLL===\n\n";
const CONTENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Stories,
    Polls,
}

impl ContentKind {
    /// Picks the kind from a file name containing "story", "stories" or "poll".
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.contains("story") || name.contains("stories") {
            Some(ContentKind::Stories)
        } else if name.contains("poll") {
            Some(ContentKind::Polls)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Stories => write!(f, "stories"),
            ContentKind::Polls => write!(f, "polls"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub story_id: String,
    pub week_number: usize,
    pub publish_date: String,
    pub audiences: Vec<String>,
    pub tags: Vec<String>,
    pub title: String,
    pub subtitle: String,
    pub reading_time_mins: u32,
    pub content_blocks: Vec<ContentBlock>,
    pub key_lessons: Vec<String>,
    pub poll_id: String,
    pub recommended_product_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub inferred_tags: Vec<String>,
    pub insight_copy: String,
    pub recommended_product_ids: Vec<String>,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub poll_id: String,
    pub story_id: String,
    pub week_number: usize,
    pub question: String,
    pub options: Vec<PollOption>,
    pub default_insight_copy: String,
    pub default_recommended_product_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StoriesDocument<'a> {
    version: u32,
    stories: &'a [Story],
}

#[derive(Debug, Serialize)]
struct PollsDocument<'a> {
    version: u32,
    polls: &'a [Poll],
}

fn week_id(prefix: &str, week: usize) -> String {
    format!("{}_week_{:02}", prefix, week)
}

fn blocks<'a>(content: &'a str, separator: &'a str) -> impl Iterator<Item = &'a str> {
    content.split(separator).filter(|block| !block.trim().is_empty())
}

fn lines(block: &str) -> Vec<&str> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// The text after the first occurrence of `label`, trimmed.
fn after_label(line: &str, label: &str) -> String {
    line.replacen(label, "", 1).trim().to_string()
}

/// Removes the first line of `rest` when it starts with `label`, returning its text.
fn take_labeled<'a>(rest: &mut &'a [&'a str], label: &str) -> Option<String> {
    let lines: &'a [&'a str] = *rest;
    let (first, tail) = lines.split_first()?;
    if !first.starts_with(label) {
        return None;
    }
    *rest = tail;
    Some(after_label(first, label))
}

pub fn parse_story(block: &str, week: usize, publish_date: NaiveDate) -> Story {
    let lines = lines(block);
    let mut rest = lines.as_slice();

    let title = take_labeled(&mut rest, "Title:").unwrap_or_default();
    let subtitle = take_labeled(&mut rest, "Subtitle:").unwrap_or_default();
    // Category lines are accepted but the default tags are kept.
    take_labeled(&mut rest, "Category:");

    let body_len = rest
        .iter()
        .position(|line| line.starts_with("Lesson:"))
        .unwrap_or(rest.len());
    let (body, after) = rest.split_at(body_len);

    let key_lessons = after
        .iter()
        .take_while(|line| line.starts_with("Lesson:"))
        .map(|line| after_label(line, "Lesson:"))
        .collect();

    let content_blocks = if body.is_empty() {
        Vec::new()
    } else {
        vec![ContentBlock {
            kind: "text".to_string(),
            content: body.join("\n\n"),
        }]
    };

    Story {
        story_id: week_id("story", week),
        week_number: week,
        publish_date: publish_date.format("%Y-%m-%d").to_string(),
        audiences: ["single_never_married", "divorced_widowed", "married"]
            .map(String::from)
            .to_vec(),
        tags: ["relationship", "wisdom"].map(String::from).to_vec(),
        title,
        subtitle,
        reading_time_mins: 4,
        content_blocks,
        key_lessons,
        poll_id: week_id("poll", week),
        recommended_product_ids: Vec::new(),
    }
}

/// Splits `Option X: text` into the letter and the text.
fn option_line(line: &str) -> Option<(char, String)> {
    let rest = line.strip_prefix("Option")?;
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }

    let mut chars = trimmed.chars();
    let letter = chars.next().filter(char::is_ascii_uppercase)?;
    let text = chars.as_str().strip_prefix(':')?;
    Some((letter, text.trim().to_string()))
}

pub fn parse_poll(block: &str, week: usize) -> Poll {
    let lines = lines(block);
    let mut rest = lines.as_slice();

    let question = take_labeled(&mut rest, "Question:").unwrap_or_default();

    let options = rest
        .iter()
        .map_while(|line| option_line(line))
        .map(|(letter, text)| PollOption {
            id: letter.to_string(),
            insight_copy: format!("You selected: {}", text),
            text,
            inferred_tags: Vec::new(),
            recommended_product_ids: Vec::new(),
            votes: 0,
        })
        .collect();

    Poll {
        poll_id: week_id("poll", week),
        story_id: week_id("story", week),
        week_number: week,
        question,
        options,
        default_insight_copy: "Thanks for your response!".to_string(),
        default_recommended_product_ids: Vec::new(),
    }
}

pub fn parse_stories(content: &str, publish_date: NaiveDate) -> Vec<Story> {
    blocks(content, STORY_SEPARATOR)
        .enumerate()
        .map(|(i, block)| parse_story(block, i + 1, publish_date))
        .collect()
}

pub fn parse_polls(content: &str) -> Vec<Poll> {
    blocks(content, POLL_SEPARATOR)
        .enumerate()
        .map(|(i, block)| parse_poll(block, i + 1))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentReport {
    pub output: PathBuf,
    pub kind: ContentKind,
    pub count: usize,
}

impl fmt::Display for ContentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generated {}", self.output.display())?;
        writeln!(f, "  {} {} created", self.count, self.kind)?;
        write!(f, "Next: nexus publish-content {}", self.output.display())
    }
}

/// Reads `input` and writes the generated JSON beside it, with a `.json` extension.
/// Stories are dated `publish_date`.
pub fn generate_content(input: &Path, publish_date: NaiveDate) -> Result<ContentReport> {
    let Some(kind) = ContentKind::from_path(input) else {
        bail!("file name must contain \"story\" or \"poll\": {}", input.display());
    };

    let content = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let (json, count) = match kind {
        ContentKind::Stories => {
            let stories = parse_stories(&content, publish_date);
            let document = StoriesDocument {
                version: CONTENT_VERSION,
                stories: &stories,
            };
            (serde_json::to_string_pretty(&document)?, stories.len())
        }
        ContentKind::Polls => {
            let polls = parse_polls(&content);
            let document = PollsDocument {
                version: CONTENT_VERSION,
                polls: &polls,
            };
            (serde_json::to_string_pretty(&document)?, polls.len())
        }
    };

    let output = input.with_extension("json");
    fs::write(&output, json).with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(output = %output.display(), kind = %kind, count, "generated content");
    Ok(ContentReport { output, kind, count })
}
