//! The fetch/enrich/filter pipeline that turns the remote inbox into rows.
//!
//! Stages run sequentially: pages are requested one by one, every record is
//! enriched in input order, then the survivors are pattern-filtered and
//! column-aligned. A reload re-runs the whole pipeline from scratch.

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing as log;

use crate::github::{GithubClient, ReleaseDetail, ThreadNotification};
use crate::record::{FIELDS, HIDDEN_FIELDS, NotificationRecord, SubjectType};

/// Printed (or shown as a placeholder row) when nothing is left to read.
pub const ALL_CAUGHT_UP: &str = "All caught up!";

const DEFAULT_PAGE_SIZE: usize = 100;

const DISCUSSION_QUERY: &str = "query($filter: String!) {
  search(query: $filter, type: DISCUSSION, first: 1) {
    nodes { ... on Discussion { number } }
  }
}";

#[derive(Debug, Clone, Default)]
pub struct InboxOptions {
    /// Include notifications that are already marked as read.
    pub include_read: bool,
    /// Restrict to threads the user is directly participating in.
    pub participating: bool,
    /// Maximum number of notifications to fetch; 0 means unlimited.
    pub max: usize,
    pub exclude: Option<String>,
    pub filter: Option<String>,
}

/// Runs the full pipeline and returns the records that survived filtering,
/// in the order the API returned them.
pub async fn collect(
    client: &GithubClient,
    opts: &InboxOptions,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<NotificationRecord>> {
    let spec = FilterSpec::from_patterns(opts.exclude.as_deref(), opts.filter.as_deref())?;
    let raw = fetch_notifications(client, opts).await?;
    let records = enrich(client, raw, now).await?;
    Ok(records
        .into_iter()
        .filter(|rec| spec.keeps(&rec.serialize()))
        .collect())
}

/// Pages through the notification listing until a page comes back empty.
///
/// A caller-supplied cap becomes the page size and stops the loop after the
/// first page; the API is treated as authoritative for "at most N", so a cap
/// above 100 (the server-side clamp) silently under-counts.
pub async fn fetch_notifications(
    client: &GithubClient,
    opts: &InboxOptions,
) -> anyhow::Result<Vec<ThreadNotification>> {
    let per_page = if opts.max > 0 {
        opts.max
    } else {
        DEFAULT_PAGE_SIZE
    };
    let mut notifications = Vec::new();
    let mut page = 1;
    loop {
        let url = format!(
            "{}/notifications?per_page={}&page={}&all={}&participating={}",
            client.api_url(),
            per_page,
            page,
            opts.include_read,
            opts.participating,
        );
        let batch: Vec<ThreadNotification> = client
            .json(client.get(&url))
            .await
            .with_context(|| format!("failed to list notifications (page {page})"))?;
        log::debug!("page {page}: {} notifications", batch.len());
        if batch.is_empty() {
            break;
        }
        notifications.extend(batch);
        if opts.max > 0 {
            break;
        }
        page += 1;
    }
    Ok(notifications)
}

/// Fills in each record's reference number, one lookup at a time, in input
/// order.
///
/// Discussions cost a search query and any failure there is fatal; a release
/// whose resource is gone is dropped; everything else derives the reference
/// from the subject URL without another request.
pub async fn enrich(
    client: &GithubClient,
    raw: Vec<ThreadNotification>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<NotificationRecord>> {
    let mut records = Vec::with_capacity(raw.len());
    for notification in &raw {
        let mut rec = NotificationRecord::encode(notification, now);
        match (rec.subject_type, rec.subject_url.as_deref()) {
            (SubjectType::Discussion, _) => {
                let number = search_discussion_number(client, &rec).await?;
                rec.reference_number = number.to_string();
            }
            (_, None) => {}
            (SubjectType::Commit, Some(url)) => {
                rec.reference_number = short_sha(url);
            }
            (SubjectType::Release, Some(url)) => {
                match client.json::<ReleaseDetail>(client.get(url)).await {
                    Ok(release) => {
                        rec.reference_number = release.tag_name;
                        if release.prerelease {
                            rec.subject_type = SubjectType::PreRelease;
                        }
                    }
                    Err(e) => {
                        // Dead reference (deleted release); skip the thread.
                        log::debug!("dropping release notification {}: {e:#}", rec.thread_id);
                        continue;
                    }
                }
            }
            (_, Some(url)) => {
                let number = url.rsplit('/').next().unwrap_or_default();
                rec.reference_number = format!("#{number}");
            }
        }
        records.push(rec);
    }
    Ok(records)
}

fn short_sha(url: &str) -> String {
    let sha = url.rsplit('/').next().unwrap_or_default();
    sha.chars().take(7).collect()
}

async fn search_discussion_number(
    client: &GithubClient,
    rec: &NotificationRecord,
) -> anyhow::Result<u64> {
    let filter = format!(
        "{} in:title {} repo:{}/{}",
        rec.title,
        rec.search_qualifier(),
        rec.owner,
        rec.name,
    );
    let data = client
        .graphql_query(DISCUSSION_QUERY, serde_json::json!({ "filter": filter }))
        .await
        .with_context(|| format!("discussion search failed for {}/{}", rec.owner, rec.name))?;
    data["data"]["search"]["nodes"][0]["number"]
        .as_u64()
        .ok_or_else(|| anyhow::anyhow!("no discussion matched `{filter}`"))
}

/// Exclusion and inclusion patterns, matched against the full serialized
/// record text, hidden fields included.
#[derive(Debug, Default)]
pub struct FilterSpec {
    exclude: Option<Regex>,
    include: Option<Regex>,
}

impl FilterSpec {
    pub fn from_patterns(
        exclude: Option<&str>,
        include: Option<&str>,
    ) -> anyhow::Result<FilterSpec> {
        let compile = |pat: &str| {
            Regex::new(pat).with_context(|| format!("invalid pattern `{pat}`"))
        };
        Ok(FilterSpec {
            exclude: exclude.map(compile).transpose()?,
            include: include.map(compile).transpose()?,
        })
    }

    pub fn keeps(&self, line: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(line)) {
            return false;
        }
        self.include.as_ref().map_or(true, |re| re.is_match(line))
    }
}

/// Column-aligns the records for display: every field but the title is
/// padded to its widest value with a two-space gutter, so the selector sees
/// one whitespace-run-separated token per field.
pub fn render_table(records: &[NotificationRecord]) -> Vec<String> {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|rec| rec.serialize().split('\t').map(str::to_string).collect())
        .collect();
    let mut widths = [0usize; FIELDS - 1];
    for row in &rows {
        for (width, field) in widths.iter_mut().zip(row) {
            *width = (*width).max(field.chars().count());
        }
    }
    rows.iter()
        .map(|row| {
            let mut line = String::new();
            for (width, field) in widths.iter().zip(row) {
                line.push_str(field);
                let pad = width - field.chars().count() + 2;
                line.extend(std::iter::repeat(' ').take(pad));
            }
            line.push_str(&row[FIELDS - 1]);
            // Only ASCII spaces; a bare trim would eat the U+00A0 padding.
            line.trim_end_matches(' ').to_string()
        })
        .collect()
}

/// The row shown when a reload finds an empty inbox. The selector hides the
/// first [`HIDDEN_FIELDS`] columns of every row, so the message is
/// front-padded with invisible single-token fields to keep its text out of
/// the hidden window.
pub fn placeholder_row() -> String {
    let mut row = String::new();
    for _ in 0..HIDDEN_FIELDS {
        row.push('\u{a0}');
        row.push_str("  ");
    }
    row.push_str(ALL_CAUGHT_UP);
    row
}

/// Static-mode output: the aligned table, or the literal completion message
/// when nothing survived.
pub fn static_output(records: &[NotificationRecord]) -> String {
    if records.is_empty() {
        ALL_CAUGHT_UP.to_string()
    } else {
        render_table(records).join("\n")
    }
}
