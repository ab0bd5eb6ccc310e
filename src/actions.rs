//! Handlers behind the selector's key presses: open in browser, render a
//! detail or diff view, mark threads read, add a comment.
//!
//! Everything dispatches on [`SubjectType`]; the URL, preview and
//! comment-eligibility tables live here and nowhere else.

use anyhow::{Context, bail};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing as log;

use crate::github::{CommitDetail, GithubClient, IssueDetail, ReleaseDetail};
use crate::record::{NotificationRecord, SubjectType, ThreadState};

/// The web page a record opens in the browser.
pub fn browse_url(rec: &NotificationRecord) -> String {
    let repo = format!("https://github.com/{}/{}", rec.owner, rec.name);
    let number = rec.reference_number.trim_start_matches('#');
    match rec.subject_type {
        SubjectType::CheckSuite => format!("{repo}/actions"),
        SubjectType::Commit => format!("{repo}/commit/{number}"),
        SubjectType::Discussion => format!("{repo}/discussions/{number}"),
        SubjectType::Issue | SubjectType::PullRequest => match &rec.comment_anchor {
            Some(anchor) => format!("{repo}/issues/{number}#issuecomment-{anchor}"),
            None => format!("{repo}/issues/{number}"),
        },
        SubjectType::Release | SubjectType::PreRelease => {
            format!("{repo}/releases/tag/{}", rec.reference_number)
        }
        SubjectType::Other => repo,
    }
}

/// Hands the record's page to the system browser. `BROWSER` wins over the
/// platform opener.
pub fn open_in_browser(rec: &NotificationRecord) -> anyhow::Result<()> {
    let url = browse_url(rec);
    let opener = std::env::var("BROWSER").unwrap_or_else(|_| {
        if cfg!(target_os = "macos") {
            "open".to_string()
        } else {
            "xdg-open".to_string()
        }
    });
    log::debug!("opening {url} with {opener}");
    let status = Command::new(&opener)
        .arg(&url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to launch `{opener}`"))?;
    if !status.success() {
        bail!("`{opener}` exited with {status} opening {url}");
    }
    Ok(())
}

fn repo_api_url(client: &GithubClient, rec: &NotificationRecord) -> String {
    format!("{}/repos/{}/{}", client.api_url(), rec.owner, rec.name)
}

/// Plain-text detail view of a record's subject.
pub async fn render_detail(
    client: &GithubClient,
    rec: &NotificationRecord,
) -> anyhow::Result<String> {
    let number = rec.reference_number.trim_start_matches('#');
    match rec.subject_type {
        SubjectType::Issue | SubjectType::PullRequest if !number.is_empty() => {
            let url = format!("{}/issues/{number}", repo_api_url(client, rec));
            let issue: IssueDetail = client
                .json(client.get(&url))
                .await
                .context("failed to fetch issue detail")?;
            let mut out = format!(
                "{} · {}/{}#{}\nstate: {}  author: {}\n{}\n",
                issue.title, rec.owner, rec.name, issue.number, issue.state, issue.user.login,
                issue.html_url,
            );
            if !issue.body.is_empty() {
                out.push('\n');
                out.push_str(&issue.body);
                out.push('\n');
            }
            Ok(out)
        }
        SubjectType::Commit if !number.is_empty() => {
            let url = format!("{}/commits/{number}", repo_api_url(client, rec));
            let commit: CommitDetail = client
                .json(client.get(&url))
                .await
                .context("failed to fetch commit detail")?;
            let mut out = format!("commit {}\n", commit.sha);
            if let Some(author) = &commit.commit.author {
                out.push_str(&format!("author: {}", author.name));
                if let Some(date) = author.date {
                    out.push_str(&format!("  ({date})"));
                }
                out.push('\n');
            }
            if let Some(stats) = &commit.stats {
                out.push_str(&format!("+{} -{}\n", stats.additions, stats.deletions));
            }
            out.push('\n');
            out.push_str(&commit.commit.message);
            out.push('\n');
            Ok(out)
        }
        SubjectType::Release | SubjectType::PreRelease if !number.is_empty() => {
            let url = format!(
                "{}/releases/tags/{}",
                repo_api_url(client, rec),
                rec.reference_number
            );
            let release: ReleaseDetail = client
                .json(client.get(&url))
                .await
                .context("failed to fetch release detail")?;
            let mut out = format!(
                "{} · {}/{} {}\n",
                release.name.as_deref().unwrap_or(&release.tag_name),
                rec.owner,
                rec.name,
                rec.subject_type,
            );
            if let Some(published) = release.published_at {
                out.push_str(&format!("published: {published}\n"));
            }
            if let Some(body) = &release.body {
                out.push('\n');
                out.push_str(body);
                out.push('\n');
            }
            Ok(out)
        }
        // Discussions, check suites and anything without a resolvable
        // resource get a summary built from the record alone.
        _ => Ok(format!(
            "{} · {}/{} {}\n\n{}\n",
            rec.subject_type, rec.owner, rec.name, rec.reference_number, rec.title,
        )),
    }
}

/// Preview-pane text: pull requests show their diff, everything else the
/// textual detail view.
pub async fn render_preview(
    client: &GithubClient,
    rec: &NotificationRecord,
) -> anyhow::Result<String> {
    match rec.subject_type {
        SubjectType::PullRequest => pr_diff(client, rec).await,
        _ => render_detail(client, rec).await,
    }
}

async fn pr_diff(client: &GithubClient, rec: &NotificationRecord) -> anyhow::Result<String> {
    let number = rec.reference_number.trim_start_matches('#');
    if number.is_empty() {
        return render_detail(client, rec).await;
    }
    let url = format!("{}/pulls/{number}", repo_api_url(client, rec));
    client
        .text(
            client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/vnd.github.v3.diff"),
        )
        .await
        .context("failed to fetch pull request diff")
}

/// Full detail through the user's pager; falls back to plain stdout when no
/// pager can be started.
pub async fn view_detail(client: &GithubClient, rec: &NotificationRecord) -> anyhow::Result<()> {
    let text = render_detail(client, rec).await?;
    page(&text);
    Ok(())
}

fn page(text: &str) {
    let pager = std::env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let mut words = pager.split_whitespace();
    let Some(bin) = words.next() else {
        println!("{text}");
        return;
    };
    let child = Command::new(bin).args(words).stdin(Stdio::piped()).spawn();
    match child {
        Ok(mut child) => {
            if let Some(stdin) = child.stdin.as_mut() {
                // The pager may quit before reading everything.
                let _ = stdin.write_all(text.as_bytes());
            }
            let _ = child.wait();
        }
        Err(e) => {
            log::debug!("no pager ({e}), printing directly");
            println!("{text}");
        }
    }
}

/// Marks a single thread read, but only when it is currently unread.
pub async fn mark_thread_read(
    client: &GithubClient,
    thread_id: &str,
    state: ThreadState,
) -> anyhow::Result<()> {
    if state != ThreadState::Unread {
        return Ok(());
    }
    let url = format!("{}/notifications/threads/{thread_id}", client.api_url());
    client
        .send_req(client.patch(&url))
        .await
        .with_context(|| format!("failed to mark thread {thread_id} read"))?;
    Ok(())
}

/// Marks everything up to `last_read_at` read.
pub async fn mark_all_read(client: &GithubClient, last_read_at: &str) -> anyhow::Result<()> {
    let url = format!("{}/notifications", client.api_url());
    client
        .send_req(client.put(&url).json(&serde_json::json!({
            "last_read_at": last_read_at,
            "read": true,
        })))
        .await
        .context("failed to mark all notifications read")?;
    Ok(())
}

pub fn can_comment(subject_type: SubjectType) -> bool {
    matches!(
        subject_type,
        SubjectType::Issue | SubjectType::PullRequest
    )
}

/// Collects a comment in `$EDITOR` and posts it to the record's issue or
/// pull request. Unsupported subject types report and return cleanly.
pub async fn add_comment(client: &GithubClient, rec: &NotificationRecord) -> anyhow::Result<()> {
    if !can_comment(rec.subject_type) {
        println!(
            "commenting is not supported for {} notifications",
            rec.subject_type
        );
        return Ok(());
    }
    let number = rec.reference_number.trim_start_matches('#').to_string();
    if number.is_empty() {
        bail!("record has no reference number to comment on");
    }

    let file = tempfile::Builder::new()
        .prefix("gh-inbox-comment-")
        .suffix(".md")
        .tempfile()
        .context("failed to create comment buffer")?;
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let mut words = editor.split_whitespace();
    let bin = words.next().unwrap_or("vi");
    let status = Command::new(bin)
        .args(words)
        .arg(file.path())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to launch editor `{editor}`"))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }
    let body = std::fs::read_to_string(file.path()).context("failed to read comment buffer")?;
    let body = body.trim();
    if body.is_empty() {
        println!("empty comment, nothing posted");
        return Ok(());
    }

    let url = format!("{}/issues/{number}/comments", repo_api_url(client, rec));
    client
        .send_req(client.post(&url).json(&serde_json::json!({ "body": body })))
        .await
        .with_context(|| format!("failed to comment on {}/{}#{number}", rec.owner, rec.name))?;
    println!("comment added to {}/{}#{number}", rec.owner, rec.name);
    Ok(())
}
