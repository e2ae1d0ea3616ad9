//! Prefetch set building
//!
//! The items of a segment are the accesses that followed its trigger, within budget

use crate::config::AnalyzerConfig;
use crate::filter::Canonicalizer;
use crate::policy::{PrefetchItem, TriggerRecord};

use std::collections::HashSet;
use std::ops::Bound;
use std::path::Path;
use trace_format::{AccessEvent, Timeline};

/// Collect the items accessed in `(trigger, window_end]`
///
/// `trigger_event` is the raw event the trigger was taken from, `trigger` its canonical record
pub fn build_segment(
    timeline: &Timeline,
    config: &AnalyzerConfig,
    trigger_event: &AccessEvent,
    trigger: &TriggerRecord,
    window_end: f64,
    canon: &mut Canonicalizer,
) -> Vec<PrefetchItem> {
    let trigger_item = trigger.item();
    let trigger_dir = Path::new(&trigger_event.path).parent();

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut bytes = 0u64;

    let window = timeline.between(
        Bound::Excluded(trigger_event.timestamp),
        config.boundary.upper(window_end),
    );
    for ev in window {
        if !config.filter.is_legal(&ev.path) || config.filter.skips_item(&ev.path) {
            continue;
        }
        if ev.length == 0
            || ev.same_range(&trigger_event.path, trigger_event.offset, trigger_event.length)
        {
            continue;
        }
        if config.same_dir_only && Path::new(&ev.path).parent() != trigger_dir {
            continue;
        }

        let length = ev.length.min(config.max_item_len);
        let item = PrefetchItem::new(canon.canonical(&ev.path), ev.offset, length);
        if item == trigger_item || seen.contains(&item) {
            continue;
        }

        if config.max_items > 0 && items.len() >= config.max_items {
            break;
        }
        if config.max_bytes > 0 && bytes + length > config.max_bytes {
            break;
        }

        bytes += length;
        seen.insert(item.clone());
        items.push(item);
    }

    if config.merge {
        items = merge_items(items);
        items.retain(|item| *item != trigger_item);
    }

    items
}

/// Sort by `(path, offset)` and coalesce ranges of the same file that touch end to start
///
/// Merging an already merged list changes nothing
pub fn merge_items(mut items: Vec<PrefetchItem>) -> Vec<PrefetchItem> {
    items.sort();
    items.dedup();

    let mut merged: Vec<PrefetchItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.last_mut() {
            Some(last) if last.precedes(&item) => last.length += item.length,
            _ => merged.push(item),
        }
    }

    merged
}
