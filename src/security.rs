#![forbid(unsafe_code)]

//! Guards shared by the tubegrab binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;
use std::path::{Component, Path};

/// Fails fast when a binary is started as root. Downloads land in the
/// working directory, so running privileged would leave root-owned media
/// files behind.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not be run as root; start it as a regular user");
    }
    Ok(())
}

/// Accepts only a single, plain file name (no separators, no `..`, no root).
pub fn is_plain_file_name(value: &str) -> bool {
    if value.is_empty() || value.contains('/') || value.contains('\\') {
        return false;
    }
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
