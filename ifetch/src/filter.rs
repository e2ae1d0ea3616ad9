//! Path legality and skip lists
//!
//! Every path the analyzer considers (as a trigger or as a prefetch item) has to be legal.
//! Triggers are further restricted by an administrative skip list

use std::collections::HashMap;

/// Pseudo filesystems, never prefetched or watched
pub const PSEUDO_FS_PREFIXES: [&str; 3] = ["/proc/", "/sys/", "/dev/"];

/// Prefixes that are never legal
const DENIED_PREFIXES: [&str; 3] = [
    "/usr/share/drirc.d/",
    "/usr/share/fonts/",
    "/usr/share/locale/",
];

/// Substrings that are never legal (ids, telemetry and safe-browsing databases)
const DENIED_FRAGMENTS: [&str; 3] = [".uuid", "datareporting/glean/", "safebrowsing/"];

/// Extensions of configuration files, which churn more than they predict
const DENIED_EXTENSIONS: [&str; 4] = [".ini", ".conf", ".txt", ".vlpset"];

/// Legal paths have to live under one of these (or under the data directory)
const ALLOWED_PREFIXES: [&str; 3] = ["/usr/", "/lib/", "/tmp/"];
const ALLOWED_FRAGMENT: &str = "/maps/";

/// Executables are opened at startup and say nothing about what follows
const TRIGGER_SKIPPED_PREFIXES: [&str; 2] = ["/usr/bin/", "/bin/"];

pub fn is_pseudo_fs(path: &str) -> bool {
    PSEUDO_FS_PREFIXES.iter().any(|p| path.starts_with(p))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    /// Application data directory; everything beneath it is legal
    pub data_dir: Option<String>,

    /// Extra prefixes skipped for triggers and prefetch items
    pub skip_prefixes: Vec<String>,

    /// Extra extensions that make a path illegal
    pub skip_extensions: Vec<String>,
}

impl PathFilter {
    pub fn is_legal(&self, path: &str) -> bool {
        if !path.starts_with('/') || is_pseudo_fs(path) || self.is_denied(path) {
            return false;
        }

        if self.has_skipped_extension(path) {
            return false;
        }

        self.data_dir
            .as_deref()
            .is_some_and(|dir| !dir.is_empty() && path.starts_with(dir))
            || ALLOWED_PREFIXES.iter().any(|p| path.starts_with(p))
            || path.contains(ALLOWED_FRAGMENT)
    }

    /// Whether the path may not be chosen as a trigger, regardless of its legality
    pub fn skips_trigger(&self, path: &str) -> bool {
        !path.starts_with('/')
            || TRIGGER_SKIPPED_PREFIXES.iter().any(|p| path.starts_with(p))
            || self.is_denied(path)
            || self.has_skipped_prefix(path)
    }

    /// Whether the path may not become a prefetch item, regardless of its legality
    pub fn skips_item(&self, path: &str) -> bool {
        self.has_skipped_prefix(path)
    }

    fn is_denied(&self, path: &str) -> bool {
        DENIED_PREFIXES.iter().any(|p| path.starts_with(p))
            || DENIED_FRAGMENTS.iter().any(|f| path.contains(f))
    }

    fn has_skipped_prefix(&self, path: &str) -> bool {
        self.skip_prefixes
            .iter()
            .any(|p| !p.is_empty() && path.starts_with(p.as_str()))
    }

    fn has_skipped_extension(&self, path: &str) -> bool {
        DENIED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
            || self
                .skip_extensions
                .iter()
                .any(|ext| !ext.is_empty() && path.ends_with(ext.as_str()))
    }
}

/// Symlink-resolved absolute path, or the path itself if it cannot be resolved
pub fn canonical_path(path: &str) -> String {
    std::fs::canonicalize(path)
        .ok()
        .and_then(|p| p.into_os_string().into_string().ok())
        .unwrap_or_else(|| path.to_string())
}

/// Memoized [`canonical_path`]
#[derive(Debug, Default)]
pub struct Canonicalizer {
    enabled: bool,
    cache: HashMap<String, String>,
}

impl Canonicalizer {
    pub fn new(enabled: bool) -> Self {
        Canonicalizer {
            enabled,
            cache: HashMap::new(),
        }
    }

    pub fn canonical(&mut self, path: &str) -> String {
        if !self.enabled {
            return path.to_string();
        }

        self.cache
            .entry(path.to_string())
            .or_insert_with(|| canonical_path(path))
            .clone()
    }
}

/// Parse a comma-separated list, dropping empty entries
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legality() {
        let filter = PathFilter::default();
        assert!(filter.is_legal("/tmp/data/a.bin"));
        assert!(filter.is_legal("/usr/lib/libc.so.6"));
        assert!(filter.is_legal("/lib/x86_64-linux-gnu/libm.so.6"));
        assert!(filter.is_legal("/home/me/game/maps/level1.pak"));

        assert!(!filter.is_legal("relative/path"));
        assert!(!filter.is_legal("/proc/self/maps/x"));
        assert!(!filter.is_legal("/sys/block/sda/stat"));
        assert!(!filter.is_legal("/dev/null"));
        assert!(!filter.is_legal("/usr/share/fonts/truetype/a.ttf"));
        assert!(!filter.is_legal("/usr/share/locale/pt/LC_MESSAGES/a.mo"));
        assert!(!filter.is_legal("/tmp/profile/datareporting/glean/db"));
        assert!(!filter.is_legal("/tmp/profile/safebrowsing/list.vlpset"));
        assert!(!filter.is_legal("/tmp/profile/install.uuid"));
        assert!(!filter.is_legal("/tmp/app/settings.ini"));
        assert!(!filter.is_legal("/tmp/app/app.conf"));
        assert!(!filter.is_legal("/tmp/app/notes.txt"));
        assert!(!filter.is_legal("/home/me/data/a.bin"));
        assert!(!filter.is_legal("/opt/app/a.bin"));
    }

    #[test]
    fn data_dir_and_extensions() {
        let filter = PathFilter {
            data_dir: Some("/home/me/data/".to_string()),
            skip_prefixes: Vec::new(),
            skip_extensions: vec![".png".to_string()],
        };
        assert!(filter.is_legal("/home/me/data/a.bin"));
        assert!(!filter.is_legal("/home/me/data/a.png"));
        assert!(!filter.is_legal("/tmp/a.png"));
        assert!(!filter.is_legal("/home/me/data/a.conf"));
    }

    #[test]
    fn trigger_skips() {
        let filter = PathFilter {
            skip_prefixes: split_list("/tmp/cache/, ,"),
            ..Default::default()
        };
        assert!(filter.skips_trigger("/usr/bin/app"));
        assert!(filter.skips_trigger("/bin/sh"));
        assert!(filter.skips_trigger("/tmp/cache/blob"));
        assert!(filter.skips_trigger("/tmp/x/.uuid"));
        assert!(filter.skips_trigger("relative"));
        assert!(!filter.skips_trigger("/usr/lib/libx.so"));
        assert!(!filter.skips_trigger("/tmp/data/a.bin"));

        assert!(filter.skips_item("/tmp/cache/blob"));
        assert!(!filter.skips_item("/usr/bin/app"));
    }

    #[test]
    fn canonicalization() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.bin");
        let link = dir.path().join("link.bin");
        std::fs::write(&target, b"data").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let resolved = std::fs::canonicalize(&target).unwrap();
        let link = link.to_str().unwrap();
        assert_eq!(canonical_path(link), resolved.to_str().unwrap());
        assert_eq!(canonical_path("/no/such/file"), "/no/such/file");

        let mut on = Canonicalizer::new(true);
        assert_eq!(on.canonical(link), resolved.to_str().unwrap());
        let mut off = Canonicalizer::new(false);
        assert_eq!(off.canonical(link), link);
    }

    #[test]
    fn lists() {
        assert_eq!(split_list("a, b,,c "), ["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
