//! Stamps `wb version` output with the build time and source revision.
//!
//! Exposes `WB_BUILD_TIMESTAMP` (UTC, RFC 3339 seconds) and `WB_GIT_COMMIT`
//! (`git describe` of HEAD, `-dirty` suffixed for local edits, or
//! "unknown" outside a checkout).

use std::process::Command;

const UNKNOWN: &str = "unknown";

fn main() {
    for watched in [".git/HEAD", ".git/index", ".git/refs"] {
        println!("cargo:rerun-if-changed={watched}");
    }

    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let revision = git(&["describe", "--always", "--dirty", "--abbrev=7"]).unwrap_or_else(|| UNKNOWN.into());

    println!("cargo:rustc-env=WB_BUILD_TIMESTAMP={built_at}");
    println!("cargo:rustc-env=WB_GIT_COMMIT={revision}");
}

/// Trimmed stdout of a successful, non-empty git invocation.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok().filter(|o| o.status.success())?;
    let text = String::from_utf8(out.stdout).ok()?.trim().to_owned();
    (!text.is_empty()).then_some(text)
}
