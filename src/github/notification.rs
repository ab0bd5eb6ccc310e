//! Wire-format models for the notifications API and the secondary lookups
//! the enrichment stage performs against it.

use chrono::{DateTime, Utc};

/// A single thread in the authenticated user's notification inbox.
///
/// Example: `https://api.github.com/notifications`
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ThreadNotification {
    /// Opaque thread id, used to mark a single thread as read.
    pub id: String,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    pub subject: Subject,
    pub repository: Repository,
}

/// The entity a notification points to (issue, PR, commit, release, ...).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Subject {
    pub title: String,
    /// API URL for the subject. `None` for subjects with no stable resource,
    /// such as discussions and some check suites.
    pub url: Option<String>,
    /// API URL for the most recent comment in the thread. The API echoes the
    /// subject URL here when the thread has no comments.
    pub latest_comment_url: Option<String>,
    /// Wire name of the subject type, e.g. `Issue` or `PullRequest`. Kept as
    /// a string here; [`crate::record::SubjectType`] is the typed view.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct User {
    pub login: String,
}

/// The release resource behind a `Release` notification.
///
/// Example: `https://api.github.com/repos/octocat/Hello-World/releases/1`
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReleaseDetail {
    pub tag_name: String,
    pub prerelease: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<String>,
}

/// An issue or pull request, as far as the detail views need it.
///
/// Issues and pull requests share these fields, so one struct serves both.
#[derive(Debug, serde::Deserialize)]
pub struct IssueDetail {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: User,
    #[serde(deserialize_with = "opt_string")]
    pub body: String,
    pub html_url: String,
}

/// A commit, as returned by the repository commits endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub commit: CommitInfo,
    #[serde(default)]
    pub stats: Option<CommitStats>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CommitInfo {
    pub message: String,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CommitStats {
    pub additions: u64,
    pub deletions: u64,
}

/// Deserialize as an optional string
pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    use serde::de::Deserialize;
    match <Option<String>>::deserialize(deserializer) {
        Ok(v) => Ok(v.unwrap_or_default()),
        Err(e) => Err(e),
    }
}
