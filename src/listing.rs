//! Layer file listings and directory navigation over them.
//!
//! A listing is the `ls`-style text a backend produces for the members of a
//! layer blob, one member per line:
//!
//! ```text
//! drwxr-xr-x 0/0 0 2024-01-01 00:00 usr/local/bin
//! -rw-r--r-- 0/0 1234 2024-01-01 00:00 etc/my file.conf
//! ```
//!
//! The hierarchy is a view derived from the flat entry list; nothing is
//! re-parsed when navigating.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ListingError, Result};
use crate::utils;
use crate::whiteout::{self, Whiteout};

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub permissions: String,
    pub owner: String,
    pub size_bytes: u64,
    /// `YYYY-MM-DD HH:MM`
    pub modified_at: String,
    /// Slash separated, relative to the layer root.
    pub path: String,
    /// Parent directory with its trailing slash, `""` at the root.
    pub directory: String,
    pub name: String,
    pub is_directory: bool,
}

impl FileEntry {
    /// Parse `<perms> <owner> <size> <YYYY-MM-DD> <HH:MM> <path>`.
    ///
    /// The path is the remainder of the line after the fifth field, so
    /// embedded spaces survive. Leading `./` and `/` are stripped; a line for
    /// the layer root itself is rejected with [`ListingError::RootEntry`].
    pub fn parse(line: &str) -> std::result::Result<Self, ListingError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let (permissions, rest) = next_field(line, "permissions")?;
        let (owner, rest) = next_field(rest, "owner")?;
        let (size, rest) = next_field(rest, "size")?;
        let (date, rest) = next_field(rest, "date")?;
        let (time, rest) = next_field(rest, "time")?;

        let size_bytes = size
            .parse::<u64>()
            .map_err(|_| ListingError::InvalidSize(size.to_string()))?;
        if !is_date(date) {
            return Err(ListingError::InvalidDate(date.to_string()));
        }
        if !is_time(time) {
            return Err(ListingError::InvalidTime(time.to_string()));
        }

        let raw_path = rest.trim_start();
        if raw_path.is_empty() {
            return Err(ListingError::MissingField("path"));
        }
        let path = utils::strip_root_prefix(raw_path);
        if path.trim_matches('/').is_empty() {
            return Err(ListingError::RootEntry);
        }

        let (directory, name) = utils::split_entry_path(path);
        let is_directory = permissions.starts_with('d') || path.ends_with('/');

        Ok(FileEntry {
            permissions: permissions.to_string(),
            owner: owner.to_string(),
            size_bytes,
            modified_at: format!("{} {}", date, time),
            path: path.to_string(),
            directory: directory.to_string(),
            name: name.to_string(),
            is_directory,
        })
    }

    pub fn is_symlink(&self) -> bool {
        self.permissions.starts_with('l')
    }

    pub fn is_executable(&self) -> bool {
        !self.is_directory && self.permissions.chars().skip(1).any(|c| matches!(c, 'x' | 's' | 't'))
    }

    pub fn whiteout(&self) -> Option<Whiteout> {
        whiteout::classify(&self.name)
    }

    /// The `directory` value this entry's children carry.
    pub fn child_dir(&self) -> String {
        utils::normalize_dir(&self.path)
    }
}

impl FromStr for FileEntry {
    type Err = ListingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split off the next whitespace-delimited field.
fn next_field<'a>(
    input: &'a str,
    field: &'static str,
) -> std::result::Result<(&'a str, &'a str), ListingError> {
    let input = input.trim_start();
    if input.is_empty() {
        return Err(ListingError::MissingField(field));
    }
    Ok(match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    })
}

fn is_date(s: &str) -> bool {
    s.len() == 10
        && s.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        })
}

fn is_time(s: &str) -> bool {
    s.len() == 5
        && s.char_indices().all(|(i, c)| match i {
            2 => c == ':',
            _ => c.is_ascii_digit(),
        })
}

/// Response body of the layer listing endpoint: `{ "files": [...] }`
#[derive(Debug, Deserialize)]
pub struct LayerListing {
    #[serde(default)]
    pub files: Vec<String>,
}

/// One segment of the navigation trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Empty for the root crumb; callers render it as "Home" or similar.
    pub label: String,
    pub path: String,
}

/// Flat index of a layer's files with a navigation cursor.
#[derive(Debug, Clone, Default)]
pub struct LayerFileIndex {
    entries: Vec<FileEntry>,
    current_path: String,
    skipped: usize,
}

impl LayerFileIndex {
    /// Build an index from listing lines. Unparsable lines are dropped and
    /// counted; the root entry is dropped silently.
    pub fn from_listing<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        let mut skipped = 0;

        for (line_no, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            match FileEntry::parse(line) {
                Ok(entry) => entries.push(entry),
                Err(ListingError::RootEntry) => {}
                Err(err) => {
                    debug!(line = line_no + 1, %err, "skipping unparsable listing line");
                    skipped += 1;
                }
            }
        }

        LayerFileIndex {
            entries,
            current_path: String::new(),
            skipped,
        }
    }

    /// Wrap already parsed entries, e.g. the files embedded in a manifest.
    pub fn from_entries(entries: Vec<FileEntry>) -> Self {
        LayerFileIndex {
            entries,
            current_path: String::new(),
            skipped: 0,
        }
    }

    /// Build an index from a `{ "files": [...] }` JSON body.
    pub fn from_response_json(bytes: &[u8]) -> Result<Self> {
        let listing: LayerListing = serde_json::from_slice(bytes)?;
        Ok(Self::from_listing(listing.files))
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lines dropped while parsing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    /// Entries whose directory is `path`, in listing order.
    ///
    /// `""`, `"/"`, `"usr"` and `"/usr/"` are all accepted.
    pub fn children_of(&self, path: &str) -> Vec<&FileEntry> {
        let dir = utils::normalize_dir(path);
        self.entries.iter().filter(|e| e.directory == dir).collect()
    }

    /// Like `children_of`, sorted case-insensitively by name.
    pub fn sorted_children_of(&self, path: &str) -> Vec<&FileEntry> {
        let mut children = self.children_of(path);
        children.sort_by_cached_key(|e| e.name.to_lowercase());
        children
    }

    /// Subdirectory names under `path` that only exist through deeper
    /// entries. Tar streams often omit parent directory members.
    pub fn implicit_dirs_of(&self, path: &str) -> Vec<String> {
        let dir = utils::normalize_dir(path);
        let explicit: BTreeSet<&str> = self
            .children_of(&dir)
            .into_iter()
            .filter(|e| e.is_directory)
            .map(|e| e.name.as_str())
            .collect();

        let implied: BTreeSet<&str> = self
            .entries
            .iter()
            .filter_map(|e| e.directory.strip_prefix(dir.as_str()))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty() && !explicit.contains(name))
            .collect();

        implied.into_iter().map(str::to_string).collect()
    }

    /// Find an entry by its path, ignoring leading and trailing slashes.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        let wanted = path.trim_matches('/');
        self.entries
            .iter()
            .find(|e| e.path.trim_matches('/') == wanted)
    }

    /// Root crumb followed by one crumb per segment of `path`, each carrying
    /// the accumulated path: `usr/local` gives `["", "usr", "usr/local"]`.
    pub fn breadcrumbs(&self, path: &str) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            label: String::new(),
            path: "/".to_string(),
        }];

        let mut accumulated = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !accumulated.is_empty() {
                accumulated.push('/');
            }
            accumulated.push_str(segment);
            crumbs.push(Breadcrumb {
                label: segment.to_string(),
                path: accumulated.clone(),
            });
        }

        crumbs
    }

    /// The navigation cursor, in `directory` form (`""` or `"usr/local/"`).
    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn cd(&mut self, path: &str) {
        self.current_path = utils::normalize_dir(path);
    }

    /// Move the cursor to the parent directory. Returns false at the root.
    pub fn up(&mut self) -> bool {
        if self.current_path.is_empty() {
            return false;
        }
        let (parent, _) = utils::split_entry_path(&self.current_path);
        self.current_path = parent.to_string();
        true
    }

    pub fn current_children(&self) -> Vec<&FileEntry> {
        self.children_of(&self.current_path)
    }

    pub fn current_breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs(&self.current_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(perms: &str, path: &str) -> String {
        format!("{} 0/0 10 2024-01-01 00:00 {}", perms, path)
    }

    #[test]
    fn test_parse_directory_line() {
        let entry = FileEntry::parse("drwxr-xr-x root 4096 2024-01-01 00:00 usr/local/bin").unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.directory, "usr/local/");
        assert_eq!(entry.name, "bin");
        assert_eq!(entry.owner, "root");
        assert_eq!(entry.size_bytes, 4096);
        assert_eq!(entry.modified_at, "2024-01-01 00:00");
        assert_eq!(format!("{}{}", entry.directory, entry.name), entry.path);
    }

    #[test]
    fn test_path_with_spaces_is_kept() {
        let entry = FileEntry::parse("-rw-r--r-- 0/0 12 2023-06-30 14:05 etc/my file  name.conf").unwrap();
        assert_eq!(entry.path, "etc/my file  name.conf");
        assert_eq!(entry.name, "my file  name.conf");
        assert!(!entry.is_directory);
    }

    #[test]
    fn test_trailing_slash_marks_directory() {
        let entry = FileEntry::parse(&line("-rw-r--r--", "b/")).unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.directory, "");
        assert_eq!(entry.name, "b");
        assert_eq!(entry.child_dir(), "b/");
    }

    #[test]
    fn test_directory_plus_name_reconstructs_path() {
        for path in ["a", "etc/passwd", "usr/share/doc/README", "x y/z w"] {
            let entry = FileEntry::parse(&line("-rw-r--r--", path)).unwrap();
            assert_eq!(format!("{}{}", entry.directory, entry.name), path);
        }
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            FileEntry::parse("-rw-r--r-- 0/0 12 2024-01-01 etc/passwd"),
            Err(ListingError::InvalidTime("etc/passwd".to_string()))
        );
        assert_eq!(
            FileEntry::parse("-rw-r--r-- 0/0 big 2024-01-01 00:00 etc/passwd"),
            Err(ListingError::InvalidSize("big".to_string()))
        );
        assert_eq!(
            FileEntry::parse("-rw-r--r-- 0/0 12 2024/01/01 00:00 etc/passwd"),
            Err(ListingError::InvalidDate("2024/01/01".to_string()))
        );
        assert_eq!(
            FileEntry::parse("-rw-r--r-- 0/0 12 2024-01-01 00:00   "),
            Err(ListingError::MissingField("path"))
        );
        assert_eq!(FileEntry::parse(""), Err(ListingError::MissingField("permissions")));
    }

    #[test]
    fn test_malformed_line_is_dropped_not_fatal() {
        let index = LayerFileIndex::from_listing([
            "-rw-r--r-- 0/0 12 2024-01-01 00:00 etc/passwd",
            "-rw-r--r-- 0/0 12 2024-01-01 etc/shadow",
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.skipped(), 1);
        assert_eq!(index.entries()[0].path, "etc/passwd");
    }

    #[test]
    fn test_children_of_root() {
        let index = LayerFileIndex::from_listing([
            line("-rw-r--r--", "a"),
            line("drwxr-xr-x", "b/"),
            line("-rw-r--r--", "b/c"),
        ]);
        let names: Vec<_> = index.children_of("").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let names: Vec<_> = index.children_of("b").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
        assert_eq!(index.children_of("/b/").len(), 1);
        assert_eq!(index.children_of("/").len(), 2);
    }

    #[test]
    fn test_sorted_children_ignore_case() {
        let index = LayerFileIndex::from_listing([
            line("-rw-r--r--", "zeta"),
            line("-rw-r--r--", "Alpha"),
            line("-rw-r--r--", "beta"),
        ]);
        let names: Vec<_> = index.sorted_children_of("").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zeta"]);
        let names: Vec<_> = index.children_of("").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "Alpha", "beta"]);
    }

    #[test]
    fn test_implicit_dirs() {
        let index = LayerFileIndex::from_listing([
            line("drwxr-xr-x", "etc"),
            line("-rw-r--r--", "etc/hosts"),
            line("-rwxr-xr-x", "usr/bin/env"),
            line("-rw-r--r--", "usr/lib/os-release"),
        ]);
        assert_eq!(index.implicit_dirs_of(""), vec!["usr".to_string()]);
        assert_eq!(index.implicit_dirs_of("usr"), vec!["bin".to_string(), "lib".to_string()]);
        assert!(index.implicit_dirs_of("etc").is_empty());
    }

    #[test]
    fn test_breadcrumbs() {
        let index = LayerFileIndex::default();
        let crumbs = index.breadcrumbs("usr/local");
        assert_eq!(
            crumbs,
            vec![
                Breadcrumb { label: "".to_string(), path: "/".to_string() },
                Breadcrumb { label: "usr".to_string(), path: "usr".to_string() },
                Breadcrumb { label: "local".to_string(), path: "usr/local".to_string() },
            ]
        );
        assert_eq!(index.breadcrumbs("").len(), 1);
        assert_eq!(index.breadcrumbs("/usr/local/").len(), 3);
    }

    #[test]
    fn test_cursor_navigation() {
        let mut index = LayerFileIndex::from_listing([
            line("drwxr-xr-x", "usr"),
            line("drwxr-xr-x", "usr/local"),
            line("-rwxr-xr-x", "usr/local/tool"),
        ]);
        assert_eq!(index.current_path(), "");
        index.cd("usr/local");
        assert_eq!(index.current_path(), "usr/local/");
        assert_eq!(index.current_children()[0].name, "tool");
        assert_eq!(index.current_breadcrumbs().len(), 3);
        assert!(index.up());
        assert_eq!(index.current_path(), "usr/");
        assert!(index.up());
        assert_eq!(index.current_path(), "");
        assert!(!index.up());
    }

    #[test]
    fn test_get_and_totals() {
        let index = LayerFileIndex::from_listing([
            "-rw-r--r-- 0/0 100 2024-01-01 00:00 etc/hosts",
            "lrwxrwxrwx 0/0 0 2024-01-01 00:00 bin",
            "-rwxr-xr-x 0/0 50 2024-01-01 00:00 usr/bin/env",
            "-rw-r--r-- 0/0 0 2024-01-01 00:00 etc/.wh.motd",
        ]);
        assert_eq!(index.total_size(), 150);
        assert!(index.get("/etc/hosts").is_some());
        assert!(index.get("etc/missing").is_none());
        assert!(index.get("bin").unwrap().is_symlink());
        assert!(index.get("usr/bin/env").unwrap().is_executable());
        assert_eq!(index.get("etc/.wh.motd").unwrap().whiteout(), Some(Whiteout::File));
    }

    #[test]
    fn test_rooted_paths_are_relative() {
        for (raw, dir, name) in [
            ("/etc/hosts", "etc/", "hosts"),
            ("./etc/hosts", "etc/", "hosts"),
            ("./.wh..wh..opq", "", ".wh..wh..opq"),
            ("/bin", "", "bin"),
        ] {
            let entry = FileEntry::parse(&line("-rw-r--r--", raw)).unwrap();
            assert_eq!(entry.directory, dir);
            assert_eq!(entry.name, name);
            assert_eq!(format!("{}{}", entry.directory, entry.name), entry.path);
        }
    }

    #[test]
    fn test_root_entry_is_rejected() {
        for raw in ["/", ".", "./", "//"] {
            assert_eq!(FileEntry::parse(&line("drwxr-xr-x", raw)), Err(ListingError::RootEntry));
        }
    }

    #[test]
    fn test_rooted_listing_is_navigable() {
        for prefix in ["/", "./"] {
            let index = LayerFileIndex::from_listing([
                line("drwxr-xr-x", prefix),
                line("drwxr-xr-x", &format!("{}etc", prefix)),
                line("-rw-r--r--", &format!("{}etc/hosts", prefix)),
                line("-rw-r--r--", &format!("{}usr/bin/env", prefix)),
            ]);
            assert_eq!(index.len(), 3);
            assert_eq!(index.skipped(), 0);

            let names: Vec<_> = index.children_of("/").iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["etc"]);
            assert_eq!(index.children_of("etc")[0].path, "etc/hosts");
            assert_eq!(index.implicit_dirs_of(""), vec!["usr".to_string()]);
            assert!(index.get("/etc/hosts").is_some());
        }
    }

    #[test]
    fn test_from_response_json() {
        let body = br#"{"files": ["-rw-r--r-- 0/0 1 2024-01-01 00:00 f", "garbage"]}"#;
        let index = LayerFileIndex::from_response_json(body).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.skipped(), 1);
    }
}
