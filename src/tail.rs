//! Polling file follower with rotation handling
//!
//! Pure-std tailing: seek to the end, poll for appended lines, and reopen
//! from the start when the file shrinks under the cursor (rotation or
//! truncation). Partial lines at EOF are held back until their newline
//! arrives.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::info;

/// Incremental reader over a growing (and occasionally rotated) file
pub struct LogFollower {
    path: PathBuf,
    reader: BufReader<File>,
    pos: u64,
    partial: String,
}

impl LogFollower {
    /// Open `path`, starting at the end (`from_end`) or the beginning
    pub fn open(path: &Path, from_end: bool) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let pos = if from_end {
            file.seek(SeekFrom::End(0))?
        } else {
            0
        };
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            pos,
            partial: String::new(),
        })
    }

    /// Read every complete line currently available
    pub fn drain(&mut self) -> io::Result<Vec<String>> {
        if fs::metadata(&self.path)?.len() < self.pos {
            info!(path = %self.path.display(), "file shrank; reopening from start");
            self.reopen()?;
        }

        let mut lines = Vec::new();
        loop {
            let mut buf = String::new();
            let n = self.reader.read_line(&mut buf)?;
            if n == 0 {
                break;
            }
            self.pos += n as u64;
            if buf.ends_with('\n') {
                let mut line = std::mem::take(&mut self.partial);
                line.push_str(buf.trim_end_matches(['\n', '\r']));
                lines.push(line);
            } else {
                // Incomplete tail; hold it until the newline shows up
                self.partial.push_str(&buf);
            }
        }
        Ok(lines)
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = File::open(&self.path)?;
        self.reader = BufReader::new(file);
        self.pos = 0;
        self.partial.clear();
        Ok(())
    }
}
