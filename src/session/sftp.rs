// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! SFTP listings. The recursive walk is written against the [`DirSource`]
//! seam so its ordering and truncation contracts hold independently of the
//! transport; the live implementation adapts `russh_sftp`.

use chrono::DateTime;
use russh_sftp::client::SftpSession;

use crate::{
    errors::CoreError,
    session::{
        EntryKind, ListOptions, RecursiveListing, RemoteEntry, kind_from_mode,
        permissions_string,
    },
};

/// Anything that can enumerate one directory level. Entries must come back
/// sorted: directories first, then files, lexicographic by name within each
/// group.
pub(crate) trait DirSource {
    async fn entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>, CoreError>;
}

/// Sort contract shared by the plain and recursive listings.
pub(crate) fn sort_entries(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| {
        let a_dir = a.kind == EntryKind::Directory;
        let b_dir = b.kind == EntryKind::Directory;
        b_dir.cmp(&a_dir).then_with(|| a.name.cmp(&b.name))
    });
}

/// Joins a child name onto a remote directory path.
pub(crate) fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() || base == "/" {
        format!("/{name}")
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Depth-first walk with caps. Root entries are depth 1; a directory is
/// descended into only while its depth is below `max_depth`. `truncated` is
/// set only when the cap was hit while more entries existed.
pub(crate) async fn walk<S: DirSource>(
    source: &mut S,
    root: &str,
    opts: &ListOptions,
) -> Result<RecursiveListing, CoreError> {
    let max_files = opts.max_files.unwrap_or(usize::MAX);
    let max_depth = opts.max_depth.unwrap_or(usize::MAX);

    struct Frame {
        entries: Vec<RemoteEntry>,
        next: usize,
        depth: usize,
    }

    let mut out: Vec<RemoteEntry> = Vec::new();
    let mut truncated = false;
    let mut stack = vec![Frame {
        entries: source.entries(root).await?,
        next: 0,
        depth: 1,
    }];

    while let Some(top) = stack.last_mut() {
        if top.next >= top.entries.len() {
            stack.pop();
            continue;
        }
        let entry = top.entries[top.next].clone();
        top.next += 1;
        let depth = top.depth;

        if out.len() >= max_files {
            truncated = true;
            break;
        }
        let descend = entry.kind == EntryKind::Directory && depth < max_depth;
        let child_path = entry.absolute_path.clone();
        out.push(entry);

        if descend {
            let entries = source.entries(&child_path).await?;
            stack.push(Frame {
                entries,
                next: 0,
                depth: depth + 1,
            });
        }
    }

    Ok(RecursiveListing {
        total_files: out.len(),
        entries: out,
        truncated,
        max_depth: opts.max_depth,
    })
}

/// Lists one directory over a live SFTP session, sorted per [`sort_entries`].
pub(crate) async fn list_dir(
    sftp: &SftpSession,
    path: &str,
) -> Result<Vec<RemoteEntry>, CoreError> {
    let base = sftp
        .canonicalize(path)
        .await
        .map_err(|e| CoreError::ReadDir(e.to_string()))?;

    let mut entries = Vec::new();
    let listing = sftp
        .read_dir(path)
        .await
        .map_err(|e| CoreError::ReadDir(e.to_string()))?;
    for item in listing {
        let name = item.file_name();
        let attrs = item.metadata();
        let mode = attrs.permissions.unwrap_or(0);
        let kind = kind_from_mode(mode, attrs.is_dir());
        entries.push(RemoteEntry {
            absolute_path: join_remote(&base, &name),
            kind,
            size_bytes: attrs.size.unwrap_or(0),
            mtime: attrs
                .mtime
                .and_then(|secs| DateTime::from_timestamp(secs.into(), 0)),
            permissions: permissions_string(mode),
            name,
        });
    }
    sort_entries(&mut entries);
    Ok(entries)
}

/// Creates one directory level.
pub(crate) async fn make_dir(sftp: &SftpSession, path: &str) -> Result<(), CoreError> {
    sftp.create_dir(path)
        .await
        .map_err(|e| CoreError::Sftp(e.to_string()))
}

/// Removes a file or an (empty) directory, dispatching on the stat mode.
pub(crate) async fn remove_path(
    sftp: &SftpSession,
    path: &str,
) -> Result<(), CoreError> {
    let attrs = sftp
        .metadata(path)
        .await
        .map_err(|e| CoreError::Sftp(e.to_string()))?;
    if attrs.is_dir() {
        sftp.remove_dir(path)
            .await
            .map_err(|e| CoreError::Sftp(e.to_string()))
    } else {
        sftp.remove_file(path)
            .await
            .map_err(|e| CoreError::Sftp(e.to_string()))
    }
}

pub(crate) async fn rename_path(
    sftp: &SftpSession,
    from: &str,
    to: &str,
) -> Result<(), CoreError> {
    sftp.rename(from, to)
        .await
        .map_err(|e| CoreError::Sftp(e.to_string()))
}

/// Live adapter for the recursive walk.
pub(crate) struct SftpSource<'a> {
    pub(crate) sftp: &'a SftpSession,
}

impl DirSource for SftpSource<'_> {
    async fn entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>, CoreError> {
        list_dir(self.sftp, path).await
    }
}
