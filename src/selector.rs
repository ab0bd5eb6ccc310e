//! Adapter around the external fuzzy finder.
//!
//! The finder owns the terminal while it runs. Non-terminal key presses are
//! wired as finder-side bindings that re-invoke this executable (mark read,
//! reload, preview, open in browser) without closing the UI; only enter,
//! esc and ctrl-x terminate it, handing back a three-line result: the typed
//! query, the pressed key, and the selected row.

use anyhow::{Context, bail};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing as log;

/// Oldest finder version whose `reload` and `--expect` behavior we rely on.
pub const MIN_FZF_VERSION: (u32, u32, u32) = (0, 29, 0);

const HEADER: &str = "enter:view  tab:preview  ctrl-b:browse  ctrl-t:read  \
ctrl-a:read-all  ctrl-r:reload  ctrl-x:comment  esc:quit";

/// Checks that `fzf` exists and is recent enough. Fatal when it is not;
/// static mode is the only way around a missing finder.
pub fn ensure_finder() -> anyhow::Result<()> {
    let output = Command::new("fzf")
        .arg("--version")
        .output()
        .context("fzf is required for interactive mode; install it or pass --static")?;
    if !output.status.success() {
        bail!("`fzf --version` exited with {}", output.status);
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let version = parse_version(&text)
        .with_context(|| format!("could not parse fzf version from {text:?}"))?;
    if version < MIN_FZF_VERSION {
        let (maj, min, patch) = MIN_FZF_VERSION;
        bail!(
            "fzf {}.{}.{} is too old, need at least {maj}.{min}.{patch}",
            version.0,
            version.1,
            version.2,
        );
    }
    Ok(())
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    // "0.54.0 (d1b6...)" - only the leading triple matters.
    let mut parts = text.split_whitespace().next()?.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();
    Some((major, minor, patch))
}

/// Key that closed the finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderKey {
    Enter,
    Esc,
    Comment,
}

#[derive(Debug)]
pub struct FinderOutcome {
    /// Free text the user had typed into the finder.
    pub query: String,
    pub key: FinderKey,
    /// Full text of the selected row; empty when nothing was selected.
    pub selection: String,
}

/// A configured finder invocation. The command strings re-enter this
/// executable; `{n}` placeholders are expanded by the finder from the
/// current row's whitespace-separated fields.
pub struct Finder {
    reload: String,
    preview: String,
    open: String,
    read_one: String,
    read_all: String,
    show_preview: bool,
}

impl Finder {
    /// `reentry` is the flag list a re-invocation needs to rebuild the same
    /// pipeline (page cap, patterns, ...).
    pub fn new(reentry: &[String], show_preview: bool) -> anyhow::Result<Finder> {
        let exe = std::env::current_exe().context("cannot determine current executable")?;
        let exe = shell_quote(&exe.to_string_lossy());
        let flags = reentry
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Finder {
            reload: format!("{exe} {flags} rows --reload"),
            preview: format!("{exe} preview-row {{}}"),
            open: format!("{exe} open-row {{}}"),
            read_one: format!("{exe} read-thread {{2}} {{3}}"),
            read_all: format!("{exe} read-all {{1}}"),
            show_preview,
        })
    }

    /// Feeds the rows in and blocks until a terminating key. Bindings that
    /// mutate remote state chain into a reload, which blocks the finder's
    /// display until the re-run pipeline has produced fresh rows.
    pub fn run(&self, rows: &[String]) -> anyhow::Result<FinderOutcome> {
        let preview_window = if self.show_preview {
            "right:50%:wrap"
        } else {
            "right:50%:wrap:hidden"
        };
        let mut child = Command::new("fzf")
            .arg(format!("--with-nth={}..", crate::record::HIDDEN_FIELDS + 1))
            .arg("--print-query")
            .arg("--expect=esc,ctrl-x")
            .arg("--layout=reverse")
            .arg("--info=inline")
            .arg("--no-multi")
            .arg(format!("--header={HEADER}"))
            .arg(format!("--preview={}", self.preview))
            .arg(format!("--preview-window={preview_window}"))
            .arg("--bind=tab:toggle-preview")
            .arg(format!("--bind=ctrl-b:execute-silent({})", self.open))
            .arg(format!("--bind=ctrl-r:reload({})", self.reload))
            .arg(format!(
                "--bind=ctrl-t:execute-silent({})+reload({})",
                self.read_one, self.reload
            ))
            .arg(format!(
                "--bind=ctrl-a:execute-silent({})+reload({})",
                self.read_all, self.reload
            ))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .context("failed to launch fzf")?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .context("fzf child has no stdin handle")?;
            for row in rows {
                if writeln!(stdin, "{row}").is_err() {
                    // fzf can exit before consuming every row.
                    break;
                }
            }
        }
        let output = child.wait_with_output().context("failed to wait for fzf")?;
        log::debug!("fzf exited with {:?}", output.status.code());
        match output.status.code() {
            // 0: selection made, 1: no match for the query.
            Some(0) | Some(1) => Ok(parse_outcome(&String::from_utf8_lossy(&output.stdout))),
            // 130: aborted (ctrl-c); same as an explicit esc.
            Some(130) => Ok(FinderOutcome {
                query: String::new(),
                key: FinderKey::Esc,
                selection: String::new(),
            }),
            code => bail!("fzf exited with unexpected status {code:?}"),
        }
    }
}

/// The three-line contract: query, terminating key, selected row. Missing
/// trailing lines (empty list, no selection) read as empty strings.
fn parse_outcome(stdout: &str) -> FinderOutcome {
    let mut lines = stdout.lines();
    let query = lines.next().unwrap_or_default().to_string();
    let key = match lines.next().unwrap_or_default() {
        "esc" => FinderKey::Esc,
        "ctrl-x" => FinderKey::Comment,
        _ => FinderKey::Enter,
    };
    let selection = lines.next().unwrap_or_default().to_string();
    FinderOutcome {
        query,
        key,
        selection,
    }
}

/// Single-quotes a string for use inside a finder bind command, which the
/// finder hands to `$SHELL -c`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
