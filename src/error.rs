/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::io;

use thiserror::Error;

/* -------------------------------------------------------------------------- */

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Generic(String),
    #[error("{0}")]
    IO(#[from] io::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid file: {0}")]
    InvalidFile(String),
    #[error("{what} at offset {offset} needs {needed} bytes but only {available} are available")]
    Truncated {
        what     : &'static str,
        offset   : usize,
        needed   : usize,
        available: usize,
    },
    #[error("inflating block at file offset {offset} failed: {source}")]
    Decompress {
        offset: u64,
        source: io::Error,
    },
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/* -------------------------------------------------------------------------- */

impl From<String> for Error {
    fn from(str : String) -> Self {
        Error::Generic(str)
    }
}

/* -------------------------------------------------------------------------- */

pub type Result<T> = std::result::Result<T, Error>;
