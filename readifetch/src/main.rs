//! # `readifetch`
//!
//! A tool to read and query prefetch policies
//!
//! Example usage:
//! ```sh
//! $ readifetch # reads ./trigger_log.txt and ./prefetch_log.txt, dumps the whole policy
//! $ readifetch -t policy/trigger_log.txt -p policy/prefetch_log.txt segment.len
//! $ readifetch segment[..2].bytes.files # size and files of the first two segments
//! ```
//!
//! The selectors are:
//! - `app`: the `APP=` header
//! - `trigger`: select all the triggers
//! - `trigger[<range>]`: select the triggers in the range
//! - `trigger.len`: number of triggers (incompatible with the range selector)
//! - `segment`: select all the segments
//! - `segment[<range>]`: select the segments in the range
//! - `segment.len`: number of segments (incompatible with the range and field selectors)
//! - `segment.items`: items of each segment (mixable with range and other selectors)
//! - `segment.bytes`: bytes to prefetch per segment (mixable with range and other selectors)
//! - `segment.files`: distinct files per segment (mixable with range and other selectors)

use ifetch::*;
use json::JsonValue;

mod selectors;
mod utils;

use crate::selectors::*;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(version)]
/// readifetch: read and query prefetch policies
///
/// This tool parses a trigger list and its prefetch list and allows for querying them
struct Cli {
    /// Trigger list to read from
    #[arg(short, long, default_value = TRIGGER_LIST, value_hint = clap::ValueHint::FilePath)]
    triggers: std::path::PathBuf,

    /// Prefetch list to read from
    #[arg(short, long, default_value = PREFETCH_LIST, value_hint = clap::ValueHint::FilePath)]
    prefetch: std::path::PathBuf,

    /// Selector commands
    ///
    /// For help, type `help` as the subcommand
    commands: Vec<String>,

    /// Just check
    #[arg(short, long)]
    check: bool,
}

fn item_json(item: &PrefetchItem) -> JsonValue {
    json::object! {
        path: item.path.as_str(),
        offset: item.offset,
        length: item.length,
    }
}

fn select(policy: &Policy, cmds: Vec<Command>) -> Result<JsonValue, json::Error> {
    let mut json_value = JsonValue::new_object();
    for cmd in cmds {
        match cmd {
            Command::App => {
                json_value.insert("app", policy.app_header.as_deref())?;
            }
            Command::Trigger(TriggerCmd::Len) => {
                json_value.insert("trigger.len", policy.triggers.len())?;
            }
            Command::Trigger(TriggerCmd::Range(range)) => {
                let triggers = range
                    .select(&policy.triggers)
                    .iter()
                    .map(item_json)
                    .collect::<Vec<_>>();
                json_value.insert("trigger", triggers)?;
            }
            Command::Segment(SegmentCmd::Len) => {
                json_value.insert("segment.len", policy.segments.len())?;
            }
            Command::Segment(SegmentCmd::Select { range, selector }) => {
                let mut segments = JsonValue::new_array();
                for segment in range.select(&policy.segments) {
                    let mut segment_json = JsonValue::new_object();
                    segment_json.insert("trigger", item_json(&segment.trigger.item()))?;
                    if selector.items {
                        segment_json.insert(
                            "items",
                            segment.items.iter().map(item_json).collect::<Vec<_>>(),
                        )?;
                    }
                    if selector.bytes {
                        segment_json.insert("bytes", segment.total_bytes())?;
                    }
                    if selector.files {
                        segment_json.insert("files", segment.files())?;
                    }
                    segments.push(segment_json)?;
                }
                json_value.insert("segment", segments)?;
            }
        }
    }

    Ok(json_value)
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if args.commands.iter().any(|c| c == "help") {
        print!("{}", COMMAND_USAGE);
        return Ok(());
    }

    let policy = Policy::open(&args.triggers, &args.prefetch).with_context(|| {
        format!(
            "failed to read policy: {}, {}",
            args.triggers.display(),
            args.prefetch.display()
        )
    })?;

    if args.check {
        return Ok(());
    }

    let cmds: Vec<Command> = args
        .commands
        .into_iter()
        .map(|x| x.try_into())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("failed to parse selector command: {}\n{}", e, COMMAND_USAGE))?;

    let cmds = if cmds.is_empty() {
        vec![
            Command::App,
            Command::Trigger(TriggerCmd::Range(utils::IndexRange::None)),
            Command::Segment(SegmentCmd::Select {
                range: utils::IndexRange::None,
                selector: SegmentSelector::all(),
            }),
        ]
    } else {
        cmds
    };

    let json_value = select(&policy, cmds).map_err(|e| anyhow::anyhow!("json error: {e:?}"))?;
    println!("{}", json_value.pretty(4));

    Ok(())
}
