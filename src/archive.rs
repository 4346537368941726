use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tar::{Archive, Entry, EntryType, Header};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Latest mtime that still formats as a four digit year (9999-12-31 23:59:59)
const MAX_MTIME: u64 = 253_402_300_799;

/// List the members of a local layer blob as listing lines
pub fn list_layer(layer_path: &Path) -> Result<Vec<String>> {
    let file = File::open(layer_path)?;
    debug!(path = %layer_path.display(), "listing layer blob");
    list_layer_reader(file)
}

/// List a layer blob from any reader; gzip is detected by its magic bytes
pub fn list_layer_reader<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let head = reader.fill_buf()?;

    if head.starts_with(ZSTD_MAGIC) {
        return Err(Error::UnsupportedCompression("zstd".to_string()));
    }

    if head.starts_with(GZIP_MAGIC) {
        list_entries(Archive::new(GzDecoder::new(reader)))
    } else {
        list_entries(Archive::new(reader))
    }
}

fn list_entries<R: Read>(mut archive: Archive<R>) -> Result<Vec<String>> {
    archive.set_ignore_zeros(true);

    let mut lines = Vec::new();
    for entry in archive.entries()? {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                // Skip corrupted entries but continue processing
                warn!(%err, "skipping corrupted layer entry");
                continue;
            }
        };

        match format_entry(&entry) {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => {}
            Err(err) => warn!(%err, "skipping unreadable layer entry"),
        }
    }

    Ok(lines)
}

/// Render one tar member as `<perms> <uid>/<gid> <size> <date> <time> <path>`
fn format_entry<R: Read>(entry: &Entry<R>) -> Result<Option<String>> {
    let header = entry.header();
    let path = entry.path()?;
    let path_str = path.to_string_lossy();

    // Normalize path (strip leading ./ segments)
    let normalized_path = path_str
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/');

    if normalized_path.is_empty() || normalized_path == "." {
        return Ok(None);
    }

    Ok(Some(format!(
        "{} {}/{} {} {} {}",
        format_permissions(header)?,
        header.uid()?,
        header.gid()?,
        header.size()?,
        format_mtime(header.mtime()?),
        normalized_path,
    )))
}

fn format_permissions(header: &Header) -> Result<String> {
    let mode = header.mode()?;
    let file_type = match header.entry_type() {
        EntryType::Directory => 'd',
        EntryType::Symlink => 'l',
        EntryType::Char => 'c',
        EntryType::Block => 'b',
        EntryType::Fifo => 'p',
        _ => '-',
    };

    let exec = |bit: u32, special: u32, set: char, unset: char| match (mode & bit != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => unset,
        (true, false) => 'x',
        (false, false) => '-',
    };

    Ok(format!(
        "{}{}{}{}{}{}{}{}{}{}",
        file_type,
        if mode & 0o400 != 0 { 'r' } else { '-' },
        if mode & 0o200 != 0 { 'w' } else { '-' },
        exec(0o100, 0o4000, 's', 'S'),
        if mode & 0o040 != 0 { 'r' } else { '-' },
        if mode & 0o020 != 0 { 'w' } else { '-' },
        exec(0o010, 0o2000, 's', 'S'),
        if mode & 0o004 != 0 { 'r' } else { '-' },
        if mode & 0o002 != 0 { 'w' } else { '-' },
        exec(0o001, 0o1000, 't', 'T'),
    ))
}

/// UTC `YYYY-MM-DD HH:MM`
fn format_mtime(mtime: u64) -> String {
    let time: SystemTime = UNIX_EPOCH + Duration::from_secs(mtime.min(MAX_MTIME));
    // 2024-01-01T00:00:00Z
    let stamp = humantime::format_rfc3339_seconds(time).to_string();
    format!("{} {}", &stamp[..10], &stamp[11..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::LayerFileIndex;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn header(path: &str, entry_type: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_size(size);
        header.set_mtime(1_704_067_200); // 2024-01-01 00:00 UTC
        header.set_cksum();
        header
    }

    fn sample_layer() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append(&header("etc/", EntryType::Directory, 0o755, 0), std::io::empty())
            .unwrap();
        let body = b"localhost\n";
        builder
            .append(&header("etc/host name", EntryType::Regular, 0o644, body.len() as u64), &body[..])
            .unwrap();
        builder
            .append(&header("usr/bin/sudo", EntryType::Regular, 0o4755, 0), std::io::empty())
            .unwrap();
        builder
            .append(&header("etc/.wh.motd", EntryType::Regular, 0o644, 0), std::io::empty())
            .unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_list_plain_tar() {
        let lines = list_layer_reader(&sample_layer()[..]).unwrap();
        assert_eq!(
            lines,
            vec![
                "drwxr-xr-x 0/0 0 2024-01-01 00:00 etc",
                "-rw-r--r-- 0/0 10 2024-01-01 00:00 etc/host name",
                "-rwsr-xr-x 0/0 0 2024-01-01 00:00 usr/bin/sudo",
                "-rw-r--r-- 0/0 0 2024-01-01 00:00 etc/.wh.motd",
            ]
        );
    }

    #[test]
    fn test_list_gzip_blob_on_disk() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&sample_layer()).unwrap();
        let gz = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tar.gz");
        std::fs::write(&path, gz).unwrap();

        let lines = list_layer(&path).unwrap();
        let index = LayerFileIndex::from_listing(&lines);
        assert_eq!(index.len(), 4);
        assert_eq!(index.skipped(), 0);
        assert_eq!(index.children_of("etc").len(), 2);
        assert!(index.get("etc").unwrap().is_directory);
        assert_eq!(index.implicit_dirs_of(""), vec!["usr".to_string()]);
    }

    #[test]
    fn test_zstd_is_unsupported() {
        let blob: [u8; 8] = [0x28, 0xb5, 0x2f, 0xfd, 0, 0, 0, 0];
        assert!(matches!(
            list_layer_reader(&blob[..]),
            Err(Error::UnsupportedCompression(_))
        ));
    }

    #[test]
    fn test_format_mtime() {
        assert_eq!(format_mtime(0), "1970-01-01 00:00");
        assert_eq!(format_mtime(1_704_067_200 + 3_660), "2024-01-01 01:01");
        assert_eq!(format_mtime(u64::MAX), "9999-12-31 23:59");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            list_layer(Path::new("/nonexistent/layer.tar")),
            Err(Error::Io(_))
        ));
    }
}
