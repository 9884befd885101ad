
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

/* -------------------------------------------------------------------------- */

pub mod autosql;
pub mod bbi;
pub mod block;
pub mod bptree;
pub mod codec;
pub mod config;
pub mod decode;
pub mod error;
pub mod extra_index;
pub mod feature;
pub mod genome;
pub mod nearest;
pub mod netfile;
pub mod rtree;
pub mod threshold;
pub mod zoom;

/* -------------------------------------------------------------------------- */

pub use bbi::{BbiFile, BbiFileType, BbiView};
pub use config::BbiParameters;
pub use error::{Error, Result};
pub use feature::{Feature, FeatureData};
pub use nearest::Direction;
pub use netfile::{ByteRangeSource, HttpFile, LocalFile, MemoryFile, NetFile};
