use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexRange {
    LeftOpen { end: usize },
    RightOpen { start: usize },
    Closed { start: usize, end: usize },
    Index(usize),
    None,
}

impl IndexRange {
    pub(crate) fn is_some(&self) -> bool {
        !matches!(self, IndexRange::None)
    }

    /// The part of `items` in the range (out of bounds parts are dropped)
    pub(crate) fn select<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len();
        let (start, end) = match *self {
            IndexRange::None => (0, len),
            IndexRange::LeftOpen { end } => (0, end.min(len)),
            IndexRange::RightOpen { start } => (start.min(len), len),
            IndexRange::Closed { start, end } => (start.min(len), end.min(len)),
            IndexRange::Index(idx) => (idx.min(len), (idx + 1).min(len)),
        };

        if start < end {
            &items[start..end]
        } else {
            &[]
        }
    }
}

/// Finds if multiple options are selected
/// Returns indices into options
pub(crate) fn find_multiple_option(
    original: &str,
    suffix: &str,
    options: &[&str],
) -> anyhow::Result<HashSet<usize>> {
    // sanity: only one empty option please
    if options.iter().filter(|x| x.is_empty()).count() > 1 {
        return Err(anyhow::anyhow!(
            "invalid options: multiple empty patterns: {:?}",
            options
        ));
    }

    // the empty option only matches an empty suffix
    if suffix.is_empty() {
        if let Some(eidx) = options.iter().position(|opt| opt.is_empty()) {
            return Ok(HashSet::from([eidx]));
        }
    }

    let mut found_options = HashSet::new();
    let mut cursor = 0;
    while cursor < suffix.len() {
        let old_cursor = cursor;

        // longest match first, so that `.items` is not taken for `.item`
        let matched = options
            .iter()
            .enumerate()
            .filter(|(_, opt)| !opt.is_empty() && suffix[cursor..].starts_with(*opt))
            .max_by_key(|(_, opt)| opt.len());
        if let Some((idx, opt)) = matched {
            found_options.insert(idx);
            cursor += opt.len();
        }

        if cursor == old_cursor {
            return Err(anyhow::anyhow!(
                "unknown option in `{}` (suffix: {}): {:?}",
                original,
                &suffix[cursor..],
                options
            ));
        }
    }

    Ok(found_options)
}

/// Finds if `suffix` starts with a range
/// if the range is [..], counts as no range
/// returns the suffix after the `]` codepoint
pub(crate) fn find_range<'a>(
    original: &str,
    suffix: &'a str,
) -> anyhow::Result<(IndexRange, &'a str)> {
    let Some(suffix) = suffix.strip_prefix('[') else {
        return Ok((IndexRange::None, suffix));
    };

    let Some((range, suffix)) = suffix.split_once(']') else {
        return Err(anyhow::anyhow!(
            "failed to find range in {}: unmatched bracket",
            original
        ));
    };

    let parse_bound = |bound: &str, which: &str| {
        (!bound.is_empty())
            .then(|| {
                bound.trim().parse::<usize>().map_err(|e| {
                    anyhow::anyhow!(
                        "failed to parse {} of the interval {} ({}): {}",
                        which,
                        range,
                        bound,
                        e
                    )
                })
            })
            .transpose()
    };

    let range = match range.split_once("..") {
        Some((start_str, end_str)) => {
            match (parse_bound(start_str, "start")?, parse_bound(end_str, "end")?) {
                (None, None) => IndexRange::None,
                (Some(start), None) => IndexRange::RightOpen { start },
                (None, Some(end)) => IndexRange::LeftOpen { end },
                (Some(start), Some(end)) => IndexRange::Closed { start, end },
            }
        }
        None => IndexRange::Index(
            range
                .trim()
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("failed to parse index {}: {}", range, e))?,
        ),
    };

    Ok((range, suffix))
}
