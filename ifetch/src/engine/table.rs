//! Watch table: which prefetch list each watch descriptor fires

use crate::engine::watch::Watcher;
use crate::filter::{canonical_path, is_pseudo_fs};
use crate::policy::{Policy, PrefetchItem};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Files inside a cache-entry directory get replaced rather than modified
const CACHE_ENTRIES_DIR: &str = "/cache2/entries";

/// How the policy is filtered on load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Items kept per trigger (`0` keeps them all)
    pub top_n: usize,

    /// Items under these prefixes are dropped
    pub skip_prefixes: Vec<String>,

    /// Resolve symlinks in trigger paths before watching them
    pub canonicalize: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            top_n: 0,
            skip_prefixes: Vec::new(),
            canonicalize: true,
        }
    }
}

impl LoadOptions {
    fn keeps(&self, item: &PrefetchItem) -> bool {
        !item.path.is_empty()
            && !is_pseudo_fs(&item.path)
            && !self
                .skip_prefixes
                .iter()
                .any(|p| !p.is_empty() && item.path.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub wd: i32,

    /// Trigger path as it was watched (canonical when resolution succeeded)
    pub trigger: String,

    /// What is actually watched: the trigger itself or a fallback directory
    pub watched: PathBuf,

    /// Shared with every dispatch of this watch
    pub items: Arc<[PrefetchItem]>,

    pub last_fire: Option<Instant>,
}

impl WatchEntry {
    /// Whether the watch fired less than `cooldown` before `now`
    pub fn cooling_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_fire
            .is_some_and(|last| now.saturating_duration_since(last) < cooldown)
    }

    pub fn fire(&mut self, now: Instant) {
        self.last_fire = Some(now);
    }

    /// Fold another trigger's items into this entry, without duplicates
    fn absorb(&mut self, items: Vec<PrefetchItem>) {
        let mut merged = self.items.to_vec();
        for item in items {
            if !merged.contains(&item) {
                merged.push(item);
            }
        }
        self.items = merged.into();
    }
}

#[derive(Debug, Default)]
pub struct WatchTable {
    entries: HashMap<i32, WatchEntry>,
}

impl WatchTable {
    /// Watch every trigger of `policy` that has something to prefetch
    ///
    /// Triggers that cannot be watched (even through their directory) or whose segment ends up
    /// empty are dropped with a warning
    pub fn install<W: Watcher>(policy: &Policy, watcher: &mut W, options: &LoadOptions) -> Self {
        let mut table = WatchTable::default();

        for trigger in &policy.triggers {
            if trigger.path.is_empty() || is_pseudo_fs(&trigger.path) {
                tracing::debug!(path = %trigger.path, "not watching trigger");
                continue;
            }

            let canonical = if options.canonicalize {
                canonical_path(&trigger.path)
            } else {
                trigger.path.clone()
            };

            let items = segment_items(policy, &canonical, &trigger.path, options);
            if items.is_empty() {
                tracing::warn!(path = %trigger.path, "no prefetch segment for trigger, skipping it");
                continue;
            }

            let Some((wd, watched)) = watch_trigger(watcher, &canonical) else {
                tracing::warn!(path = %trigger.path, "cannot watch trigger, skipping it");
                continue;
            };

            tracing::debug!(wd, watched = %watched.display(), items = items.len(), "watching trigger");
            match table.entries.get_mut(&wd) {
                Some(entry) => entry.absorb(items),
                None => {
                    table.entries.insert(
                        wd,
                        WatchEntry {
                            wd,
                            trigger: canonical,
                            watched,
                            items: items.into(),
                            last_fire: None,
                        },
                    );
                }
            }
        }

        table
    }

    pub fn get(&self, wd: i32) -> Option<&WatchEntry> {
        self.entries.get(&wd)
    }

    pub fn get_mut(&mut self, wd: i32) -> Option<&mut WatchEntry> {
        self.entries.get_mut(&wd)
    }

    pub fn entries(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items watched across all entries
    pub fn item_count(&self) -> usize {
        self.entries.values().map(|e| e.items.len()).sum()
    }

    /// Remove every watch
    pub fn teardown<W: Watcher>(self, watcher: &mut W) {
        for wd in self.entries.into_keys() {
            if let Err(error) = watcher.remove_watch(wd) {
                tracing::debug!(wd, %error, "failed to remove watch");
            }
        }
    }
}

/// Items of the segment whose trigger is `canonical` (or, failing that, the literal `path`)
fn segment_items(
    policy: &Policy,
    canonical: &str,
    path: &str,
    options: &LoadOptions,
) -> Vec<PrefetchItem> {
    let Some(segment) = policy
        .segment_for(canonical)
        .or_else(|| policy.segment_for(path))
    else {
        return Vec::new();
    };

    let items = segment.items.iter().filter(|item| options.keeps(item)).cloned();
    match options.top_n {
        0 => items.collect(),
        n => items.take(n).collect(),
    }
}

/// Directory to watch when the trigger itself cannot be watched
pub fn fallback_dir(path: &str) -> Option<PathBuf> {
    if let Some(idx) = path.find(CACHE_ENTRIES_DIR) {
        let dir = &path[..idx + CACHE_ENTRIES_DIR.len()];
        if path[dir.len()..].starts_with('/') {
            return Some(PathBuf::from(dir));
        }
    }

    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn watch_trigger<W: Watcher>(watcher: &mut W, path: &str) -> Option<(i32, PathBuf)> {
    let error = match watcher.add_watch(Path::new(path)) {
        Ok(wd) => return Some((wd, PathBuf::from(path))),
        Err(error) => error,
    };

    let dir = fallback_dir(path)?;
    tracing::debug!(path, %error, dir = %dir.display(), "watching the directory instead");
    match watcher.add_watch(&dir) {
        Ok(wd) => Some((wd, dir)),
        Err(error) => {
            tracing::debug!(dir = %dir.display(), %error, "failed to watch the directory");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::policy::TriggerSegment;

    use std::collections::HashSet;
    use std::io;

    /// Watches anything but the paths in `unwatchable`; the same path keeps its descriptor
    #[derive(Debug, Default)]
    pub(crate) struct FakeWatcher {
        pub(crate) unwatchable: HashSet<PathBuf>,
        pub(crate) watched: HashMap<PathBuf, i32>,
        pub(crate) removed: Vec<i32>,
    }

    impl Watcher for FakeWatcher {
        fn add_watch(&mut self, path: &Path) -> io::Result<i32> {
            if self.unwatchable.contains(path) {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            let next = self.watched.len() as i32 + 1;
            Ok(*self.watched.entry(path.to_path_buf()).or_insert(next))
        }

        fn remove_watch(&mut self, wd: i32) -> io::Result<()> {
            self.removed.push(wd);
            Ok(())
        }
    }

    fn item(path: &str) -> PrefetchItem {
        PrefetchItem::new(path, 0, 4096)
    }

    fn segment(trigger: &str, items: &[&str]) -> TriggerSegment {
        TriggerSegment {
            trigger: item(trigger).into(),
            items: items.iter().map(|p| item(p)).collect(),
        }
    }

    pub(crate) fn options() -> LoadOptions {
        LoadOptions {
            canonicalize: false,
            ..Default::default()
        }
    }

    #[test]
    fn installs_watches() {
        let policy = Policy::new(
            None,
            vec![
                segment("/tmp/data/a.bin", &["/tmp/data/b.bin", "/tmp/data/c.bin"]),
                segment("/tmp/data/d.bin", &["/tmp/data/e.bin"]),
            ],
        );
        let mut watcher = FakeWatcher::default();
        let table = WatchTable::install(&policy, &mut watcher, &options());

        assert_eq!(table.len(), 2);
        assert_eq!(table.item_count(), 3);
        let wd = watcher.watched[Path::new("/tmp/data/a.bin")];
        let entry = table.get(wd).unwrap();
        assert_eq!(entry.trigger, "/tmp/data/a.bin");
        assert_eq!(entry.watched, Path::new("/tmp/data/a.bin"));
        assert_eq!(&entry.items[..], [item("/tmp/data/b.bin"), item("/tmp/data/c.bin")]);
        assert!(entry.last_fire.is_none());

        table.teardown(&mut watcher);
        assert_eq!(watcher.removed.len(), 2);
    }

    #[test]
    fn filters_items() {
        let policy = Policy::new(
            None,
            vec![
                segment(
                    "/tmp/data/a.bin",
                    &["/proc/self/maps", "/tmp/cache/x", "/tmp/data/b.bin", "/tmp/data/c.bin", "/tmp/data/d.bin"],
                ),
                segment("/tmp/data/only-skipped.bin", &["/dev/shm/x", "/sys/kernel/y"]),
                segment("/proc/self/stat", &["/tmp/data/b.bin"]),
            ],
        );
        let options = LoadOptions {
            top_n: 2,
            skip_prefixes: vec!["/tmp/cache/".to_string()],
            canonicalize: false,
        };
        let mut watcher = FakeWatcher::default();
        let table = WatchTable::install(&policy, &mut watcher, &options);

        assert_eq!(table.len(), 1);
        let entry = table.entries().next().unwrap();
        assert_eq!(&entry.items[..], [item("/tmp/data/b.bin"), item("/tmp/data/c.bin")]);
        assert!(!watcher.watched.contains_key(Path::new("/tmp/data/only-skipped.bin")));
        assert!(!watcher.watched.contains_key(Path::new("/proc/self/stat")));
    }

    #[test]
    fn triggers_without_segment() {
        let mut policy = Policy::new(None, vec![segment("/tmp/data/a.bin", &["/tmp/data/b.bin"])]);
        policy.triggers.push(item("/tmp/data/orphan.bin"));

        let mut watcher = FakeWatcher::default();
        let table = WatchTable::install(&policy, &mut watcher, &options());
        assert_eq!(table.len(), 1);
        assert!(!watcher.watched.contains_key(Path::new("/tmp/data/orphan.bin")));
    }

    #[test]
    fn directory_fallback() {
        assert_eq!(
            fallback_dir("/home/me/.cache/app/cache2/entries/ABCDEF"),
            Some(PathBuf::from("/home/me/.cache/app/cache2/entries"))
        );
        assert_eq!(fallback_dir("/tmp/data/a.bin"), Some(PathBuf::from("/tmp/data")));
        assert_eq!(fallback_dir("/"), None);
        assert_eq!(fallback_dir("relative"), None);

        let entry = "/tmp/profile/cache2/entries/ABCDEF";
        let policy = Policy::new(
            None,
            vec![
                segment(entry, &["/tmp/data/b.bin"]),
                segment("/tmp/profile/cache2/entries/012345", &["/tmp/data/c.bin", "/tmp/data/b.bin"]),
                segment("/tmp/gone/x.bin", &["/tmp/data/d.bin"]),
            ],
        );
        let mut watcher = FakeWatcher {
            unwatchable: [
                entry,
                "/tmp/profile/cache2/entries/012345",
                "/tmp/gone/x.bin",
                "/tmp/gone",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            ..Default::default()
        };
        let table = WatchTable::install(&policy, &mut watcher, &options());

        // both cache entries share the directory watch, and their item lists merge
        assert_eq!(table.len(), 1);
        let entry = table.entries().next().unwrap();
        assert_eq!(entry.watched, Path::new("/tmp/profile/cache2/entries"));
        assert_eq!(&entry.items[..], [item("/tmp/data/b.bin"), item("/tmp/data/c.bin")]);
    }

    #[test]
    fn canonical_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.bin");
        let link = dir.path().join("link.bin");
        std::fs::write(&target, b"data").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let target = std::fs::canonicalize(&target).unwrap();

        // the policy names the symlink, the segment the resolved path
        let mut policy = Policy::new(
            None,
            vec![segment(target.to_str().unwrap(), &["/tmp/data/b.bin"])],
        );
        policy.triggers = vec![item(link.to_str().unwrap())];

        let mut watcher = FakeWatcher::default();
        let table = WatchTable::install(&policy, &mut watcher, &LoadOptions::default());
        assert_eq!(table.len(), 1);
        assert!(watcher.watched.contains_key(&target));
        assert_eq!(table.entries().next().unwrap().trigger, target.to_str().unwrap());
    }

    #[test]
    fn cooldown() {
        let mut entry = WatchEntry {
            wd: 1,
            trigger: "/tmp/data/a.bin".to_string(),
            watched: PathBuf::from("/tmp/data/a.bin"),
            items: vec![item("/tmp/data/b.bin")].into(),
            last_fire: None,
        };
        let now = Instant::now();
        assert!(!entry.cooling_down(now, Duration::from_secs(60)));

        entry.fire(now);
        assert!(entry.cooling_down(now, Duration::from_secs(60)));
        assert!(!entry.cooling_down(now, Duration::ZERO));
        assert!(!entry.cooling_down(now + Duration::from_secs(61), Duration::from_secs(60)));
    }
}
