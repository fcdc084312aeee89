// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Archive extraction with a ZipSlip guard (spec §4.2 stage 6, P5).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Unpacks `zip_path` into `dest`, preserving file modes from the archive,
/// and rejects any entry whose fully-resolved destination path does not
/// begin with `dest` followed by the path separator.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::ExtractFailed(format!("bad archive: {e}")))?;

    fs::create_dir_all(dest)?;
    let dest = fs::canonicalize(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::ExtractFailed(format!("entry {i}: {e}")))?;

        let Some(enclosed) = entry.enclosed_name() else {
            return Err(Error::ExtractFailed(format!(
                "entry {i} has an unsafe path: {:?}",
                entry.name()
            )));
        };

        let out_path = resolve_destination(&dest, &enclosed)?;

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out_file = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// Joins `dest` and the archive-relative path, then verifies the result
/// still lives under `dest` — the ZipSlip check. `dest` must already be
/// canonicalized; the joined path does not need to exist yet, so we
/// reason about it lexically rather than calling `canonicalize` (which
/// requires the path to exist).
fn resolve_destination(dest: &Path, relative: &Path) -> Result<PathBuf> {
    let joined = dest.join(relative);

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(Error::ExtractFailed(format!(
                        "zip entry escapes destination: {relative:?}"
                    )));
                }
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }

    if resolved != dest && !resolved.starts_with(dest.join("")) {
        return Err(Error::ExtractFailed(format!(
            "zip entry escapes destination: {relative:?}"
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_regular_files_preserving_tree() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("artifact.zip");
        write_zip(
            &zip_path,
            &[("bin/acme", b"binary"), ("config/acme.yml", b"cfg: true")],
        );

        let dest = dir.path().join("v2025.01.15-sha.abc1234");
        extract_zip(&zip_path, &dest).unwrap();

        assert_eq!(fs::read(dest.join("bin/acme")).unwrap(), b"binary");
        assert_eq!(fs::read(dest.join("config/acme.yml")).unwrap(), b"cfg: true");
    }

    #[test]
    fn rejects_entries_that_escape_destination() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(&zip_path, &[("../../etc/passwd", b"pwned")]);

        let dest = dir.path().join("v2025.01.15-sha.abc1234");
        let result = extract_zip(&zip_path, &dest);
        assert!(result.is_err());
        assert!(!dir.path().join("etc/passwd").exists());
    }

    #[test]
    fn rejects_absolute_path_entries() {
        // zip's `enclosed_name` already refuses absolute/unsafe paths;
        // this asserts we propagate that refusal as ExtractFailed.
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("abs.zip");
        write_zip(&zip_path, &[("/etc/passwd", b"pwned")]);

        let dest = dir.path().join("v2025.01.15-sha.abc1234");
        let result = extract_zip(&zip_path, &dest);
        assert!(result.is_err());
    }
}
