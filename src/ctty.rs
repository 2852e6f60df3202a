//! Cross-platform lookup of a process's controlling TTY (ctty).
//!
//! Vendored from ctty-rs (Shawn Anastasio, MIT). Conduit uses this to answer
//! "which terminal owns me right now", needed to confirm the front end has
//! regained terminal ownership after a delegated child exits (spec §8
//! invariant 4).

//
// Copyright 2017 Shawn Anastasio
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
//

use std::fs::File;
use std::io::prelude::*;

use glob::glob;
use nix::sys::stat::stat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CttyError {
    #[error("controlling TTY for this process not found")]
    NotFound,

    #[error("system returned invalid data when looking up CTTY")]
    SystemDataParseFailure,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Returns the dev_t corresponding to the current process's controlling tty.
pub fn get_ctty_dev() -> Result<u64, CttyError> {
    let mut stat_f = File::open("/proc/self/stat")?;
    let mut stat = String::new();
    stat_f.read_to_string(&mut stat)?;

    // The comm field in parens may itself contain spaces, so start looking
    // two characters after the last ')'.
    let mut start_idx = stat.rfind(')').unwrap_or(0);
    if start_idx == 0 {
        return Err(CttyError::SystemDataParseFailure);
    }
    start_idx += 2;

    let values_str = &stat[start_idx..];
    let mut values = values_str.split_whitespace();

    let dev = values.nth(4).ok_or(CttyError::SystemDataParseFailure)?;
    let dev_int = dev
        .parse::<i32>()
        .map_err(|_| CttyError::SystemDataParseFailure)?;

    Ok(dev_int as u64)
}

/// Returns a full path to a tty or pseudo-tty matching the given dev_t.
pub fn get_path_for_dev(dev: u64) -> Result<String, CttyError> {
    let patterns = ["/dev/pts/*", "/dev/tty"];

    for pattern in patterns {
        for entry in glob(pattern).unwrap() {
            let path = match entry {
                Ok(p) => p,
                Err(_) => continue,
            };
            let stat = match stat(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if dev == stat.st_rdev {
                return Ok(String::from(path.to_str().unwrap()));
            }
        }
    }

    Err(CttyError::NotFound)
}

/// The pts number of the controlling terminal, e.g. `/dev/pts/4` -> `4`.
pub fn session_id() -> Result<i32, CttyError> {
    let dev = get_ctty_dev()?;
    let path = get_path_for_dev(dev)?;
    path.replace("/dev/pts/", "")
        .parse::<i32>()
        .map_err(|_| CttyError::SystemDataParseFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctty_lookup_does_not_panic() {
        // In a sandboxed/non-interactive test runner there may be no
        // controlling TTY at all; this must fail cleanly, not panic.
        let _ = get_ctty_dev();
    }
}
