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

use std::fmt;

use regex::Regex;

use crate::error::Result;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq)]
pub struct AutoSqlField {
    pub ty     : String,
    pub name   : String,
    pub comment: Option<String>,
}

/* -------------------------------------------------------------------------- */

/// Column description embedded in bigBed files. Only the subset needed to
/// name columns is understood.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoSqlSchema {
    pub decl_type: String,
    pub name     : String,
    pub comment  : Option<String>,
    pub fields   : Vec<AutoSqlField>,
}

/* -------------------------------------------------------------------------- */

impl AutoSqlSchema {

    /// Parse an AutoSQL declaration. Text without a recognizable header
    /// yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>> {

        let header = Regex::new(r#"(\w+)\s+(\w+)\s+("([^"]+)")?\s+\(\s*"#)?;
        let field  = Regex::new(r#"([\w\[\]]+)\s+(\w+)\s*;\s*("([^"]+)")?\s*"#)?;

        let caps = match header.captures(text) {
            Some(caps) => caps,
            None       => return Ok(None),
        };

        let mut schema = AutoSqlSchema {
            decl_type: caps[1].to_string(),
            name     : caps[2].to_string(),
            comment  : caps.get(4).map(|m| m.as_str().to_string()),
            fields   : Vec::new(),
        };

        let rest = &text[caps.get(0).map_or(0, |m| m.end())..];

        for caps in field.captures_iter(rest) {
            schema.fields.push(AutoSqlField {
                ty     : caps[1].to_string(),
                name   : caps[2].to_string(),
                comment: caps.get(4).map(|m| m.as_str().to_string()),
            });
        }
        Ok(Some(schema))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.fields.get(i).map(|f| f.name.as_str())
    }
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for AutoSqlSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.decl_type, self.name)?;
        for field in &self.fields {
            write!(f, "  {:<16} {:<16}", field.ty, field.name)?;
            if let Some(comment) = &field.comment {
                write!(f, " \"{}\"", comment)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
