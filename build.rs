//! Build-script metadata injection for CLI/version surfaces.
//!
//! Intentionally dependency-free and resilient: when git/date tooling is
//! unavailable, stable "unknown" markers are used instead.

use std::env;
use std::fs;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=PROTOCOL_VERSION");
    emit_head_ref_watch();
    println!("cargo:rerun-if-env-changed=HEDDLE_BUILD_GIT_HASH");
    println!("cargo:rerun-if-env-changed=HEDDLE_BUILD_TIMESTAMP");

    let git_hash = env::var("HEDDLE_BUILD_GIT_HASH").unwrap_or_else(|_| git_short_hash());
    let build_timestamp =
        env::var("HEDDLE_BUILD_TIMESTAMP").unwrap_or_else(|_| build_timestamp_utc());

    println!("cargo:rustc-env=HEDDLE_BUILD_GIT_HASH={git_hash}");
    println!("cargo:rustc-env=HEDDLE_BUILD_TIMESTAMP={build_timestamp}");
}

fn emit_head_ref_watch() {
    // Track the current branch ref so commit-hash changes trigger rebuilds.
    let Ok(head) = fs::read_to_string(".git/HEAD") else {
        return;
    };
    let trimmed = head.trim();
    if let Some(reference) = trimmed.strip_prefix("ref: ") {
        println!("cargo:rerun-if-changed=.git/{reference}");
    }
}

fn git_short_hash() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "unknown".to_string(),
    }
}

fn build_timestamp_utc() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{seconds}")
}
