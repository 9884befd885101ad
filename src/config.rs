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

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/* -------------------------------------------------------------------------- */

/// Query and transport policy of a bbi reader.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BbiParameters {
    /// Maximum number of points a region query should return before a
    /// coarser zoom level is used.
    pub max_points           : u32,
    /// Timeout of the very first request of a session, used to detect
    /// unreachable or misconfigured servers early.
    pub first_read_timeout_ms: Option<u64>,
    /// Timeout of every later request.
    pub request_timeout_ms   : Option<u64>,
    /// Skip undecodable data blocks with a warning instead of failing.
    pub lenient              : bool,
    /// Number of bytes fetched when opening a file.
    pub header_prefetch      : u32,
    /// Initial window used when reading the AutoSQL schema.
    pub autosql_prefetch     : u32,
}

/* -------------------------------------------------------------------------- */

impl Default for BbiParameters {
    fn default() -> Self {
        BbiParameters {
            max_points           : 25_000,
            first_read_timeout_ms: Some(5_000),
            request_timeout_ms   : None,
            lenient              : false,
            header_prefetch      : 512,
            autosql_prefetch     : 2048,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl BbiParameters {

    pub fn first_read_timeout(&self) -> Option<Duration> {
        self.first_read_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn import<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let file = File::open(filename.as_ref())?;
        Self::read(BufReader::new(file))
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
