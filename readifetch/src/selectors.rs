use crate::utils::*;

pub(crate) const COMMAND_USAGE: &str = "selector command: selection over the policy

app                                the application header (`APP=...`)

trigger                            select all the triggers in the trigger list
trigger[<range>]                   select the triggers in the range
trigger.len                        number of triggers

segment                            select all the segments in the prefetch list
segment[<range>]                   select the segments in the range
segment.len                        number of segments
segment.items                      items of each segment (mixable with range and other selectors)
segment.bytes                      bytes to prefetch per segment (mixable with range and other selectors)
segment.files                      distinct files per segment (mixable with range and other selectors)
";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    App,
    Trigger(TriggerCmd),
    Segment(SegmentCmd),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TriggerCmd {
    Range(IndexRange),
    Len,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SegmentSelector {
    pub(crate) items: bool,
    pub(crate) bytes: bool,
    pub(crate) files: bool,
}

impl SegmentSelector {
    pub(crate) fn all() -> Self {
        SegmentSelector {
            items: true,
            bytes: true,
            files: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SegmentCmd {
    Select {
        range: IndexRange,
        selector: SegmentSelector,
    },
    Len,
}

impl TryFrom<String> for Command {
    type Error = anyhow::Error;
    fn try_from(cmd: String) -> Result<Self, Self::Error> {
        let trimmed = cmd.trim();
        Ok({
            if trimmed == "app" {
                Command::App
            } else if let Some(suffix) = trimmed.strip_prefix("trigger") {
                if suffix == ".len" {
                    Command::Trigger(TriggerCmd::Len)
                } else {
                    let (range, suffix) = find_range(trimmed, suffix)?;
                    if !suffix.is_empty() {
                        return Err(anyhow::anyhow!(
                            "trailing data after range in {}: {}",
                            trimmed,
                            suffix
                        ));
                    }

                    Command::Trigger(TriggerCmd::Range(range))
                }
            } else if let Some(suffix) = trimmed.strip_prefix("segment") {
                let (range, suffix) = find_range(trimmed, suffix)?;

                let options = [
                    "",       // 0
                    ".len",   // 1
                    ".items", // 2
                    ".bytes", // 3
                    ".files", // 4
                ];
                let found_options = find_multiple_option(trimmed, suffix, &options)?;

                if found_options.contains(&1) {
                    if found_options.len() > 1 || range.is_some() {
                        return Err(anyhow::anyhow!(
                            "len option is incompatible with ranges and the other options"
                        ));
                    }

                    Command::Segment(SegmentCmd::Len)
                } else if found_options.contains(&0) {
                    Command::Segment(SegmentCmd::Select {
                        range,
                        selector: SegmentSelector::all(),
                    })
                } else {
                    Command::Segment(SegmentCmd::Select {
                        range,
                        selector: SegmentSelector {
                            items: found_options.contains(&2),
                            bytes: found_options.contains(&3),
                            files: found_options.contains(&4),
                        },
                    })
                }
            } else {
                return Err(anyhow::anyhow!("unknown selector: {}", trimmed));
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(cmd: &str) -> anyhow::Result<Command> {
        cmd.to_string().try_into()
    }

    #[test]
    fn ok_parse() {
        assert_eq!(parse("app").unwrap(), Command::App);
        assert_eq!(
            parse("trigger").unwrap(),
            Command::Trigger(TriggerCmd::Range(IndexRange::None))
        );
        assert_eq!(
            parse(" trigger[1..] ").unwrap(),
            Command::Trigger(TriggerCmd::Range(IndexRange::RightOpen { start: 1 }))
        );
        assert_eq!(parse("trigger.len").unwrap(), Command::Trigger(TriggerCmd::Len));
        assert_eq!(parse("segment.len").unwrap(), Command::Segment(SegmentCmd::Len));
        assert_eq!(
            parse("segment").unwrap(),
            Command::Segment(SegmentCmd::Select {
                range: IndexRange::None,
                selector: SegmentSelector::all(),
            })
        );
        assert_eq!(
            parse("segment[0].bytes.files").unwrap(),
            Command::Segment(SegmentCmd::Select {
                range: IndexRange::Index(0),
                selector: SegmentSelector {
                    items: false,
                    bytes: true,
                    files: true,
                },
            })
        );
    }

    #[test]
    fn err_parse() {
        assert!(parse("policy").is_err());
        assert!(parse("trigger[0].len").is_err());
        assert!(parse("trigger.items").is_err());
        assert!(parse("segment[0].len").is_err());
        assert!(parse("segment.len.items").is_err());
        assert!(parse("segment.size").is_err());
    }
}
