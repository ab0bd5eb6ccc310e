//! The positional record each notification is flattened into.
//!
//! A record serializes to exactly [`FIELDS`] tab-separated fields. The
//! selector splits rows on runs of ASCII spaces and tabs, so every field
//! except the trailing title must stay a single token. Display fields that
//! would otherwise contain spaces (the formatted time, the padded reference
//! column, the read marker) use U+00A0 instead, which the selector's
//! tokenizer does not treat as a separator.

use anyhow::{Context, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

use crate::github::ThreadNotification;

/// Number of serialized fields. The first `FIELDS - 1` are single tokens;
/// the title flows to the end of the line.
pub const FIELDS: usize = 11;

/// How many leading fields the selector hides from display.
pub const HIDDEN_FIELDS: usize = 4;

/// Glyph shown in the unread column for unread threads.
pub const UNREAD_GLYPH: &str = "\u{25cf}";

/// Read threads fill the unread column with a no-break space so the column
/// keeps its position.
pub const READ_GLYPH: &str = "\u{a0}";

/// Serialized stand-in for an absent comment anchor.
pub const NULL_SENTINEL: &str = "null";

/// Width the reference column is padded to. Longer references are kept
/// whole, never truncated.
pub const REF_WIDTH: usize = 5;

const NBSP: char = '\u{a0}';

/// The kind of entity a notification points to.
///
/// `PreRelease` never arrives on the wire; the enrichment stage rewrites
/// `Release` to it when the fetched release is flagged as a pre-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectType {
    Issue,
    PullRequest,
    Commit,
    Release,
    PreRelease,
    Discussion,
    CheckSuite,
    Other,
}

impl SubjectType {
    /// Maps a wire (or serialized) name to its variant. Unknown names
    /// collapse into `Other`.
    pub fn from_wire(s: &str) -> SubjectType {
        match s {
            "Issue" => SubjectType::Issue,
            "PullRequest" => SubjectType::PullRequest,
            "Commit" => SubjectType::Commit,
            "Release" => SubjectType::Release,
            "Pre-release" => SubjectType::PreRelease,
            "Discussion" => SubjectType::Discussion,
            "CheckSuite" => SubjectType::CheckSuite,
            _ => SubjectType::Other,
        }
    }
}

impl FromStr for SubjectType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<SubjectType, Self::Err> {
        Ok(SubjectType::from_wire(s))
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            SubjectType::Issue => "Issue",
            SubjectType::PullRequest => "PullRequest",
            SubjectType::Commit => "Commit",
            SubjectType::Release => "Release",
            SubjectType::PreRelease => "Pre-release",
            SubjectType::Discussion => "Discussion",
            SubjectType::CheckSuite => "CheckSuite",
            SubjectType::Other => "Other",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unread,
    Read,
}

impl FromStr for ThreadState {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<ThreadState> {
        match s {
            "UNREAD" => Ok(ThreadState::Unread),
            "READ" => Ok(ThreadState::Read),
            other => bail!("unknown thread state `{other}`"),
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ThreadState::Unread => "UNREAD",
            ThreadState::Read => "READ",
        })
    }
}

/// One notification, flattened for filtering, display and selection.
///
/// Immutable once enrichment has filled `reference_number`; a reload builds
/// a brand-new set instead of mutating records in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Year-month of the notification's `updated_at`, e.g. `2026-08`. Feeds
    /// the discussion search qualifier; not serialized.
    pub updated_month: String,
    /// Instant the notification was fetched, RFC 3339. Mark-all-read uses it
    /// as the `last_read_at` cutoff.
    pub timestamp: String,
    pub thread_id: String,
    pub thread_state: ThreadState,
    /// Trailing path segment of the latest comment URL, when the thread
    /// points at a specific comment rather than its subject.
    pub comment_anchor: Option<String>,
    /// Pre-formatted `DD/Mon HH:MM`, date and time joined by U+00A0.
    pub display_time: String,
    pub owner: String,
    pub name: String,
    pub subject_type: SubjectType,
    /// Raw API URL of the subject; consumed by enrichment, not serialized.
    pub subject_url: Option<String>,
    /// Tabs and newlines are replaced with spaces at encode time so the
    /// title can only ever be the last field.
    pub title: String,
    /// Per-type reference (issue number, short SHA, tag, ...). Empty until
    /// enriched, and stays empty when the subject URL is null.
    pub reference_number: String,
}

impl NotificationRecord {
    /// Flattens one raw notification. Pure; `now` is the fetch instant the
    /// caller captured. `reference_number` is left empty for the enricher.
    pub fn encode(raw: &ThreadNotification, now: DateTime<Utc>) -> NotificationRecord {
        let comment_anchor = match (&raw.subject.latest_comment_url, &raw.subject.url) {
            // An echoed subject URL means "no specific comment".
            (Some(comment), subject) if subject.as_deref() != Some(comment.as_str()) => {
                last_segment(comment).map(str::to_string)
            }
            _ => None,
        };
        NotificationRecord {
            updated_month: raw.updated_at.format("%Y-%m").to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            thread_id: raw.id.clone(),
            thread_state: if raw.unread {
                ThreadState::Unread
            } else {
                ThreadState::Read
            },
            comment_anchor,
            display_time: format!(
                "{}\u{a0}{}",
                raw.updated_at.format("%d/%b"),
                raw.updated_at.format("%H:%M")
            ),
            owner: raw.repository.owner.login.clone(),
            name: raw.repository.name.clone(),
            subject_type: SubjectType::from_wire(&raw.subject.kind),
            subject_url: raw.subject.url.clone(),
            title: sanitize_title(&raw.subject.title),
            reference_number: String::new(),
        }
    }

    /// The single-token search fragment for the discussion lookup.
    pub fn search_qualifier(&self) -> String {
        format!("updated:>={}", self.updated_month)
    }

    pub fn unread_glyph(&self) -> &'static str {
        match self.thread_state {
            ThreadState::Unread => UNREAD_GLYPH,
            ThreadState::Read => READ_GLYPH,
        }
    }

    /// Reference column padded with U+00A0 to [`REF_WIDTH`] so the field
    /// never collapses out of its position, even when empty.
    pub fn padded_reference(&self) -> String {
        let width = self.reference_number.chars().count();
        let mut out = self.reference_number.clone();
        if width < REF_WIDTH {
            out.extend(std::iter::repeat(NBSP).take(REF_WIDTH - width));
        }
        out
    }

    /// Tab-separated serialization, [`FIELDS`] fields. Filtering matches
    /// against this text, hidden fields included.
    pub fn serialize(&self) -> String {
        let fields: [String; FIELDS] = [
            self.timestamp.clone(),
            self.thread_id.clone(),
            self.thread_state.to_string(),
            self.comment_anchor
                .clone()
                .unwrap_or_else(|| NULL_SENTINEL.to_string()),
            self.display_time.clone(),
            self.owner.clone(),
            self.name.clone(),
            self.unread_glyph().to_string(),
            self.subject_type.to_string(),
            self.padded_reference(),
            self.title.clone(),
        ];
        fields.join("\t")
    }

    /// Parses a tab-serialized line back into a record.
    pub fn parse_line(line: &str) -> anyhow::Result<NotificationRecord> {
        let fields: Vec<&str> = line.splitn(FIELDS, '\t').collect();
        if fields.len() != FIELDS {
            bail!("expected {FIELDS} fields, got {}", fields.len());
        }
        let title = fields[FIELDS - 1];
        Self::from_fields(&fields[..FIELDS - 1], title)
    }

    /// Parses a row handed back by the selector. The selector re-joins
    /// fields with alignment spaces, so this splits on runs of ASCII
    /// whitespace: the first ten tokens are the positional fields and the
    /// remainder is the title.
    pub fn from_selector_row(row: &str) -> anyhow::Result<NotificationRecord> {
        let (fields, title) =
            split_selector_row(row).context("row does not have the expected field layout")?;
        Self::from_fields(&fields, title)
    }

    fn from_fields(fields: &[&str], title: &str) -> anyhow::Result<NotificationRecord> {
        let timestamp = fields[0].to_string();
        let anchor = fields[3];
        Ok(NotificationRecord {
            // Year-month prefix of the fetch instant; only meaningful before
            // enrichment, which has already happened for parsed rows.
            updated_month: timestamp.get(..7).unwrap_or_default().to_string(),
            thread_id: fields[1].to_string(),
            thread_state: fields[2].parse()?,
            comment_anchor: (anchor != NULL_SENTINEL).then(|| anchor.to_string()),
            display_time: fields[4].to_string(),
            owner: fields[5].to_string(),
            name: fields[6].to_string(),
            subject_type: SubjectType::from_wire(fields[8]),
            subject_url: None,
            title: title.to_string(),
            reference_number: fields[9].trim_end_matches(NBSP).to_string(),
            timestamp,
        })
    }
}

/// Splits a selector row into its ten leading tokens plus the title.
///
/// Only ASCII spaces and tabs separate fields, mirroring the selector's
/// AWK-style tokenizer; U+00A0 inside a field does not split it.
pub fn split_selector_row(row: &str) -> Option<([&str; FIELDS - 1], &str)> {
    let is_sep = |c: char| c == ' ' || c == '\t';
    let mut fields = [""; FIELDS - 1];
    let mut rest = row;
    for field in fields.iter_mut() {
        rest = rest.trim_start_matches(is_sep);
        if rest.is_empty() {
            return None;
        }
        match rest.find(is_sep) {
            Some(end) => {
                *field = &rest[..end];
                rest = &rest[end..];
            }
            None => {
                *field = rest;
                rest = "";
            }
        }
    }
    Some((fields, rest.trim_matches(is_sep)))
}

fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn last_segment(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|s| !s.is_empty())
}
