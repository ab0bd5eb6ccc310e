use clap::Parser;
use tracing as log;

use gh_inbox::actions;
use gh_inbox::github::GithubClient;
use gh_inbox::pipeline::{self, ALL_CAUGHT_UP, InboxOptions};
use gh_inbox::record::{NotificationRecord, ThreadState};
use gh_inbox::selector::{Finder, FinderKey, ensure_finder};

/// Browse your GitHub notification inbox from the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Include notifications already marked as read.
    #[arg(short = 'a', long)]
    all: bool,

    /// Mark every notification as read, then exit.
    #[arg(short = 'r', long)]
    mark_read: bool,

    /// Drop rows matching this pattern (matched against every field,
    /// hidden ones included).
    #[arg(short = 'e', long, value_name = "PATTERN")]
    exclude: Option<String>,

    /// Keep only rows matching this pattern.
    #[arg(short = 'f', long, value_name = "PATTERN")]
    filter: Option<String>,

    /// Print the table once instead of opening the interactive selector.
    #[arg(short = 's', long = "static")]
    static_mode: bool,

    /// Maximum number of notifications to fetch (0 = unlimited).
    #[arg(short = 'n', long, value_name = "NUM", default_value_t = 0)]
    num: usize,

    /// Only notifications you are directly participating in.
    #[arg(short = 'p', long)]
    participating: bool,

    /// Show the preview pane by default.
    #[arg(short = 'w', long)]
    preview: bool,

    #[command(subcommand)]
    internal: Option<Internal>,
}

/// Hidden re-entry points the selector's key bindings call back into.
#[derive(clap::Subcommand, Debug)]
enum Internal {
    /// Print the current table of rows.
    #[command(hide = true)]
    Rows {
        /// This invocation is a reload from inside the selector.
        #[arg(long)]
        reload: bool,
    },
    /// Print the preview text for one selected row.
    #[command(hide = true)]
    PreviewRow { row: String },
    /// Open one selected row in the browser.
    #[command(hide = true)]
    OpenRow { row: String },
    /// Mark one thread read, if it is unread.
    #[command(hide = true)]
    ReadThread { thread_id: String, state: String },
    /// Mark everything up to the given instant read.
    #[command(hide = true)]
    ReadAll { timestamp: String },
}

fn inbox_options(opt: &Opt) -> InboxOptions {
    InboxOptions {
        include_read: opt.all,
        participating: opt.participating,
        max: opt.num,
        exclude: opt.exclude.clone(),
        filter: opt.filter.clone(),
    }
}

/// The flag list a re-invocation needs to rebuild the same pipeline.
fn reentry_flags(opt: &Opt) -> Vec<String> {
    let mut flags = vec!["-n".to_string(), opt.num.to_string()];
    if opt.all {
        flags.push("-a".to_string());
    }
    if opt.participating {
        flags.push("-p".to_string());
    }
    if let Some(pattern) = &opt.exclude {
        flags.push("-e".to_string());
        flags.push(pattern.clone());
    }
    if let Some(pattern) = &opt.filter {
        flags.push("-f".to_string());
        flags.push(pattern.clone());
    }
    flags
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();
    let client = GithubClient::new_from_env();

    if let Some(internal) = &opt.internal {
        return run_internal(&client, &opt, internal).await;
    }

    if opt.mark_read {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        actions::mark_all_read(&client, &now).await?;
        println!("all notifications marked as read");
        return Ok(());
    }

    if !opt.static_mode {
        ensure_finder()?;
    }

    let records = pipeline::collect(&client, &inbox_options(&opt), chrono::Utc::now()).await?;

    if opt.static_mode {
        println!("{}", pipeline::static_output(&records));
        return Ok(());
    }
    if records.is_empty() {
        println!("{ALL_CAUGHT_UP}");
        return Ok(());
    }

    let rows = pipeline::render_table(&records);
    let finder = Finder::new(&reentry_flags(&opt), opt.preview)?;
    let outcome = finder.run(&rows)?;
    let rec = match NotificationRecord::from_selector_row(&outcome.selection) {
        Ok(rec) => rec,
        Err(e) => {
            // Empty list, the all-caught-up placeholder, or nothing selected.
            log::debug!("nothing chosen ({e:#})");
            return Ok(());
        }
    };
    match outcome.key {
        FinderKey::Esc => return Ok(()),
        FinderKey::Enter => {
            actions::view_detail(&client, &rec).await?;
        }
        FinderKey::Comment => {
            actions::add_comment(&client, &rec).await?;
        }
    }
    actions::mark_thread_read(&client, &rec.thread_id, rec.thread_state).await
}

async fn run_internal(
    client: &GithubClient,
    opt: &Opt,
    internal: &Internal,
) -> anyhow::Result<()> {
    match internal {
        Internal::Rows { reload } => {
            let records =
                pipeline::collect(client, &inbox_options(opt), chrono::Utc::now()).await?;
            if records.is_empty() {
                if *reload {
                    println!("{}", pipeline::placeholder_row());
                } else {
                    println!("{ALL_CAUGHT_UP}");
                }
                return Ok(());
            }
            for row in pipeline::render_table(&records) {
                println!("{row}");
            }
            Ok(())
        }
        Internal::PreviewRow { row } => {
            let Ok(rec) = NotificationRecord::from_selector_row(row) else {
                return Ok(());
            };
            match actions::render_preview(client, &rec).await {
                Ok(text) => println!("{text}"),
                // Keep the preview pane usable even when a lookup fails.
                Err(e) => println!("preview unavailable: {e:#}"),
            }
            Ok(())
        }
        Internal::OpenRow { row } => {
            let Ok(rec) = NotificationRecord::from_selector_row(row) else {
                return Ok(());
            };
            actions::open_in_browser(&rec)
        }
        Internal::ReadThread { thread_id, state } => {
            let state: ThreadState = state.parse().unwrap_or(ThreadState::Read);
            actions::mark_thread_read(client, thread_id, state).await
        }
        Internal::ReadAll { timestamp } => actions::mark_all_read(client, timestamp).await,
    }
}
