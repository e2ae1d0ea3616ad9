use crate::error::ParseLineError;
use crate::fields::Fields;

use std::str::FromStr;

/// One disk-activity sample from the `stat_log`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSample {
    /// Seconds
    pub timestamp: f64,

    /// I/O busy time during this sampling period (ms)
    pub delta_io: f64,

    /// I/O busy time accumulated since the start of the log (ms)
    pub cumulative_io: f64,
}

impl FromStr for DiskSample {
    type Err = ParseLineError;

    /// parse a line in the disk-activity log
    ///
    /// `[<date> <time>] Device:<name> | ... | io_time_ms:<int> | ...`
    ///
    /// A lone line carries no history, so `cumulative_io` equals `delta_io`:
    /// the log reader accumulates it
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = Fields::new(s);
        fields.get("Device").ok_or(ParseLineError::NotARecord)?;

        let delta_io = fields.int("io_time_ms")? as f64;
        Ok(DiskSample {
            timestamp: fields.timestamp()?,
            delta_io,
            cumulative_io: delta_io,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_parse() {
        let sample: DiskSample = "[2025-11-12 21:54:13] Device:sda | reads:3 | sectors_read:24 | read_time_ms:4 | writes:0 | sectors_written:0 | write_time_ms:0 | io_time_ms:17 | in_flight:0"
            .parse()
            .unwrap();
        assert_eq!(sample.delta_io, 17.0);
        assert_eq!(sample.cumulative_io, 17.0);
    }

    #[test]
    fn err_parse() {
        assert!(matches!(
            "===== Disk Stats Log Started at 2025-11-12 21:54:13 =====".parse::<DiskSample>(),
            Err(ParseLineError::NotARecord)
        ));
        assert!(matches!(
            "[2025-11-12 21:54:13] Device:sda | reads:3".parse::<DiskSample>(),
            Err(ParseLineError::MissingField("io_time_ms"))
        ));
        assert!(matches!(
            "Device:sda | io_time_ms:4".parse::<DiskSample>(),
            Err(ParseLineError::MissingField("timestamp"))
        ));
    }
}
