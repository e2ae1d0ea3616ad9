use crate::error::*;
use crate::policy::{Policy, TRIGGER_DELIMITER};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

impl Policy {
    /// Write the trigger list: one `path,offset,length` line per trigger
    pub fn write_trigger_list<W: Write>(&self, w: &mut W) -> PolicyResult<()> {
        self.write_header(w)?;
        for trigger in &self.triggers {
            writeln!(w, "{}", trigger)?;
        }

        Ok(())
    }

    /// Write the prefetch list: per segment, the delimiter, the trigger line and the items
    pub fn write_prefetch_list<W: Write>(&self, w: &mut W) -> PolicyResult<()> {
        self.write_header(w)?;
        for segment in &self.segments {
            writeln!(w, "{}", TRIGGER_DELIMITER)?;
            writeln!(w, "{}", segment.trigger.item())?;
            for item in &segment.items {
                writeln!(w, "{}", item)?;
            }
        }

        Ok(())
    }

    pub fn to_writers<T: Write, P: Write>(&self, triggers: &mut T, prefetch: &mut P) -> PolicyResult<()> {
        self.write_trigger_list(triggers)?;
        self.write_prefetch_list(prefetch)
    }

    /// Create (or truncate) both policy files and write them
    ///
    /// Both files are created before anything is written
    pub fn write_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        trigger_path: P,
        prefetch_path: Q,
    ) -> PolicyResult<()> {
        let create = |path: &Path| {
            File::create(path)
                .map(BufWriter::new)
                .map_err(|error| PolicyError::Open {
                    path: path.to_path_buf(),
                    error,
                })
        };

        let mut triggers = create(trigger_path.as_ref())?;
        let mut prefetch = create(prefetch_path.as_ref())?;
        self.to_writers(&mut triggers, &mut prefetch)?;
        triggers.flush()?;
        prefetch.flush()?;

        Ok(())
    }

    fn write_header<W: Write>(&self, w: &mut W) -> PolicyResult<()> {
        if let Some(header) = &self.app_header {
            writeln!(w, "{}", header.trim_end())?;
        }

        Ok(())
    }
}
