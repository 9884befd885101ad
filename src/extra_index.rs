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

use crate::autosql::AutoSqlSchema;
use crate::bbi::BbiFile;
use crate::block::Block;
use crate::bptree::{BPlusTreeHeader, BPT_HEADER_SIZE};
use crate::codec;
use crate::decode::FeatureFilter;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::netfile::ByteRangeSource;

/* -------------------------------------------------------------------------- */

const EXT_HEADER_SIZE  : u64   = 64;
const INDEX_ENTRY_SIZE : usize = 20;
const MAX_DEPTH        : usize = 64;

/* -------------------------------------------------------------------------- */

/// A B+ tree over the values of one bigBed column, mapping each value to
/// the data block holding the records with that value.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtraIndex {
    pub index_type : u16,
    pub field_count: u16,
    pub offset     : u64,
    /// Column of the indexed field, counting `chrom` as column 0.
    pub field_id   : u16,
    pub name       : String,
}

/* -------------------------------------------------------------------------- */

/// Read the list of extra indices from the extension header at
/// `ext_offset`. Index names are taken from the AutoSQL schema.
pub async fn read_extra_indices<S: ByteRangeSource>(
    source    : &S,
    ext_offset: u64,
    schema    : Option<&AutoSqlSchema>,
) -> Result<Vec<ExtraIndex>> {

    let buffer = source.fetch(ext_offset, EXT_HEADER_SIZE).await?;

    let count       = codec::read_u16(&buffer, 2)? as usize;
    let list_offset = codec::read_u64(&buffer, 4)?;

    if count == 0 || list_offset == 0 {
        return Ok(Vec::new());
    }
    let buffer = source.fetch(list_offset, (count * INDEX_ENTRY_SIZE) as u64).await?;

    let mut indices = Vec::with_capacity(count);

    for i in 0..count {
        let p = i * INDEX_ENTRY_SIZE;

        let field_id = codec::read_u16(&buffer, p + 16)?;
        let name     = schema
            .and_then(|s| s.field_name(field_id as usize))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("field{}", field_id));

        indices.push(ExtraIndex {
            index_type : codec::read_u16(&buffer, p    )?,
            field_count: codec::read_u16(&buffer, p + 2)?,
            offset     : codec::read_u64(&buffer, p + 4)?,
            field_id,
            name,
        });
    }
    log::debug!("found {} extra indices", indices.len());

    Ok(indices)
}

/* -------------------------------------------------------------------------- */

impl ExtraIndex {

    /// Descend the B+ tree to the leaf that would contain `value` and return
    /// the data block stored for it.
    pub async fn find_block<S: ByteRangeSource>(&self, source: &S, value: &str) -> Result<Option<Block>> {

        let buffer = source.fetch(self.offset, BPT_HEADER_SIZE as u64).await?;
        let header = BPlusTreeHeader::read(&buffer, 0)?;

        if header.val_size != 16 {
            return Err(Error::InvalidFile(format!("extra index `{}` has invalid value size `{}`", self.name, header.val_size)));
        }
        let key_size = header.key_size as usize;

        if value.len() > key_size {
            return Ok(None);
        }
        let mut node = self.offset.saturating_add(BPT_HEADER_SIZE as u64);

        for _ in 0..MAX_DEPTH {
            let buffer  = source.fetch(node, header.max_node_size()).await?;
            let is_leaf = codec::read_u8 (&buffer, 0)? != 0;
            let count   = codec::read_u16(&buffer, 2)? as usize;

            if is_leaf {
                for i in 0..count {
                    let p = 4 + i * (key_size + 16);
                    if codec::read_padded_str(&buffer, p, key_size)? == value {
                        return Ok(Some(Block::new(
                            codec::read_u64(&buffer, p + key_size    )?,
                            codec::read_u64(&buffer, p + key_size + 8)?)));
                    }
                }
                return Ok(None);
            }
            // last child whose key does not exceed the value
            let mut child = None;
            for i in 0..count {
                let p   = 4 + i * (key_size + 8);
                let key = codec::read_padded_str(&buffer, p, key_size)?;
                if i > 0 && key.as_str() > value {
                    break;
                }
                child = Some(codec::read_u64(&buffer, p + key_size)?);
            }
            match child {
                Some(offset) => node = offset,
                None         => return Ok(None),
            }
        }
        Err(Error::InvalidFile(format!("extra index `{}` is deeper than {} levels", self.name, MAX_DEPTH)))
    }
}

/* -------------------------------------------------------------------------- */

/// Accepts bigBed records whose column `column` equals `value`.
struct FieldFilter<'a> {
    column: usize,
    value : &'a str,
}

impl FeatureFilter for FieldFilter<'_> {
    fn accept(&self, _chrom_id: u32, _min: u32, _max: u32, fields: &[&str]) -> bool {
        self.column >= 3 && fields.get(self.column - 3) == Some(&self.value)
    }
}

/* -------------------------------------------------------------------------- */

impl<S: ByteRangeSource> BbiFile<S> {

    pub fn extra_index(&self, field: &str) -> Option<&ExtraIndex> {
        self.extra_indices().iter().find(|x| x.name == field)
    }

    /// All records whose `field` column equals `value`, found through the
    /// extra index on that column.
    pub async fn lookup(&self, field: &str, value: &str) -> Result<Vec<Feature>> {

        let index = self.extra_index(field)
            .ok_or_else(|| Error::Generic(format!("file has no index on field `{}`", field)))?;

        let block = match index.find_block(self.source(), value).await? {
            Some(block) => block,
            None        => return Ok(Vec::new()),
        };
        let filter = FieldFilter { column: index.field_id as usize, value };

        let mut features = self.decode_blocks(vec![block], false, &filter).await?;

        features.sort_by(|a, b| (a.chrom_id, a.min, a.max).cmp(&(b.chrom_id, b.min, b.max)));

        Ok(features)
    }
}
