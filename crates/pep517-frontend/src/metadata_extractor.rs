//! The artifact-to-metadata fallback: when a backend has no `prepare_metadata_for_build_*`
//! hook, build a throwaway wheel and lift its `.dist-info/` tree out instead.

use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::Error;

/// Find the unique `<name>-<version>` prefix among a wheel's `.dist-info/` entries.
///
/// Like pip, this asserts there is exactly one `.dist-info` directory in the archive;
/// zero or more than one is a malformed wheel.
fn find_dist_info_prefix(archive: &mut ZipArchive<impl Read + std::io::Seek>) -> Result<String, Error> {
    let mut prefixes: Vec<String> = archive
        .file_names()
        .filter_map(|name| {
            let (dir, _file) = name.split_once('/')?;
            dir.strip_suffix(".dist-info").map(ToString::to_string)
        })
        .collect();
    prefixes.sort();
    prefixes.dedup();

    match prefixes.as_slice() {
        [prefix] => Ok(prefix.clone()),
        _ => Err(Error::MissingDistInfo(PathBuf::new())),
    }
}

/// Extract the `.dist-info/` directory from `wheel_path` into `target`, which the
/// caller guarantees is an empty directory. Returns the extracted directory's path
/// (`target/<prefix>.dist-info`).
pub fn extract_dist_info(wheel_path: &Path, target: &Path) -> Result<PathBuf, Error> {
    let file = fs_err::File::open(wheel_path)?;
    let mut archive = ZipArchive::new(file)?;

    let prefix = find_dist_info_prefix(&mut archive).map_err(|_| {
        Error::MissingDistInfo(wheel_path.to_path_buf())
    })?;
    let dist_info_dir = format!("{prefix}.dist-info");

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.name().strip_prefix(&format!("{dist_info_dir}/")) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        let dest = target.join(&dist_info_dir).join(relative);
        if entry.is_dir() {
            fs_err::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut buffer = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buffer)?;
        fs_err::write(&dest, buffer)?;
    }

    Ok(target.join(dist_info_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_wheel(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs_err::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_unique_dist_info() {
        let dir = tempfile::tempdir().unwrap();
        let wheel_path = dir.path().join("demo-1.0.0-py3-none-any.whl");
        write_wheel(
            &wheel_path,
            &[
                ("demo-1.0.0.dist-info/METADATA", b"Name: demo\n"),
                ("demo/__init__.py", b""),
            ],
        );

        let target = dir.path().join("out");
        fs_err::create_dir_all(&target).unwrap();
        let extracted = extract_dist_info(&wheel_path, &target).unwrap();

        assert_eq!(extracted, target.join("demo-1.0.0.dist-info"));
        assert!(extracted.join("METADATA").is_file());
        assert!(!target.join("demo").exists());
    }

    #[test]
    fn rejects_wheel_with_no_dist_info() {
        let dir = tempfile::tempdir().unwrap();
        let wheel_path = dir.path().join("empty.whl");
        write_wheel(&wheel_path, &[("demo/__init__.py", b"")]);

        let target = dir.path().join("out");
        fs_err::create_dir_all(&target).unwrap();
        let err = extract_dist_info(&wheel_path, &target).unwrap_err();
        assert!(matches!(err, Error::MissingDistInfo(_)));
    }

    #[test]
    fn rejects_wheel_with_multiple_dist_info() {
        let dir = tempfile::tempdir().unwrap();
        let wheel_path = dir.path().join("ambiguous.whl");
        write_wheel(
            &wheel_path,
            &[
                ("a-1.dist-info/METADATA", b""),
                ("b-1.dist-info/METADATA", b""),
            ],
        );

        let target = dir.path().join("out");
        fs_err::create_dir_all(&target).unwrap();
        let err = extract_dist_info(&wheel_path, &target).unwrap_err();
        assert!(matches!(err, Error::MissingDistInfo(_)));
    }
}
