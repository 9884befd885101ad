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

use std::io::{self, Read, Seek, SeekFrom};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use reqwest::header::RANGE;

use crate::config::BbiParameters;
use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

/// Random access to the bytes of a (possibly remote) file. Reads beyond the
/// end of the file are clamped, i.e. the returned buffer may be shorter than
/// requested.
#[allow(async_fn_in_trait)]
pub trait ByteRangeSource {
    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>>;
}

/* -------------------------------------------------------------------------- */

fn clamp_range(len: usize, offset: u64, size: u64) -> (usize, usize) {
    let from = (offset.min(len as u64)) as usize;
    let to   = (offset.saturating_add(size).min(len as u64)) as usize;
    (from, to)
}

/* -------------------------------------------------------------------------- */

// HTTP reader that fetches byte ranges using Range requests
#[derive(Debug)]
pub struct HttpFile {
    client            : Client,
    url               : String,
    first_read        : AtomicBool,
    first_read_timeout: Option<Duration>,
    request_timeout   : Option<Duration>,
    // complete body, if the server does not support range requests
    whole_file        : Mutex<Option<Arc<Vec<u8>>>>,
}

/* -------------------------------------------------------------------------- */

impl HttpFile {

    pub fn new(url: &str, parameters: &BbiParameters) -> Self {
        HttpFile {
            client            : Client::new(),
            url               : url.to_string(),
            first_read        : AtomicBool::new(true),
            first_read_timeout: parameters.first_read_timeout(),
            request_timeout   : parameters.request_timeout(),
            whole_file        : Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn whole_file(&self) -> Result<Option<Arc<Vec<u8>>>> {
        self.whole_file
            .lock()
            .map(|body| body.clone())
            .map_err(|_| Error::Generic("http body lock poisoned".to_string()))
    }

    fn set_whole_file(&self, body: Arc<Vec<u8>>) -> Result<()> {
        let mut guard = self.whole_file
            .lock()
            .map_err(|_| Error::Generic("http body lock poisoned".to_string()))?;
        *guard = Some(body);
        Ok(())
    }

}

/* -------------------------------------------------------------------------- */

impl ByteRangeSource for HttpFile {

    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        if let Some(body) = self.whole_file()? {
            let (from, to) = clamp_range(body.len(), offset, size);
            return Ok(body[from..to].to_vec());
        }
        let range_header = format!("bytes={}-{}", offset, offset.saturating_add(size) - 1);

        let timeout = if self.first_read.swap(false, Ordering::SeqCst) {
            self.first_read_timeout
        } else {
            self.request_timeout
        };

        log::debug!("GET {} Range: {}", self.url, range_header);

        let mut request = self.client
            .get(&self.url)
            .header(RANGE, range_header);

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?.error_for_status()?;
        let status   = response.status();
        let bytes    = response.bytes().await?;

        if status == StatusCode::PARTIAL_CONTENT {
            let n = bytes.len().min(size as usize);
            Ok(bytes[..n].to_vec())
        } else {
            // Server ignored the range header and sent the whole file, which
            // answers all further reads
            log::warn!("server at {} ignored range request (status {}), keeping {} bytes in memory",
                self.url, status, bytes.len());
            let (from, to) = clamp_range(bytes.len(), offset, size);
            let result     = bytes[from..to].to_vec();
            self.set_whole_file(Arc::new(bytes.to_vec()))?;
            Ok(result)
        }
    }

}

/* -------------------------------------------------------------------------- */

#[derive(Debug)]
pub struct LocalFile {
    file: Mutex<File>,
}

/* -------------------------------------------------------------------------- */

impl LocalFile {

    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let path = filename.as_ref();

        if path.exists() && path.is_file() {
            Ok(LocalFile { file: Mutex::new(File::open(path)?) })
        } else {
            Err(Error::IO(io::Error::new(io::ErrorKind::NotFound, format!("file `{}` not found", path.display()))))
        }
    }

}

/* -------------------------------------------------------------------------- */

impl ByteRangeSource for LocalFile {

    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut file = self.file
            .lock()
            .map_err(|_| Error::Generic("local file lock poisoned".to_string()))?;

        // header fields may ask for more than the file holds
        let size       = size.min(file.metadata()?.len().saturating_sub(offset));
        let mut buffer = Vec::with_capacity(size as usize);

        file.seek(SeekFrom::Start(offset))?;
        (&mut *file).take(size).read_to_end(&mut buffer)?;

        Ok(buffer)
    }

}

/* -------------------------------------------------------------------------- */

/// A file that is already held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFile {
    data: Vec<u8>,
}

/* -------------------------------------------------------------------------- */

impl MemoryFile {

    pub fn new(data: Vec<u8>) -> Self {
        MemoryFile { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

}

/* -------------------------------------------------------------------------- */

impl ByteRangeSource for MemoryFile {

    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let (from, to) = clamp_range(self.data.len(), offset, size);
        Ok(self.data[from..to].to_vec())
    }

}

/* -------------------------------------------------------------------------- */

// Wrapper for a local file, an HTTP resource or an in-memory buffer
#[derive(Debug)]
pub enum NetFile {
    File(LocalFile),
    Http(HttpFile),
    Memory(MemoryFile),
}

/* -------------------------------------------------------------------------- */

impl NetFile {

    pub fn open(filename: &str, parameters: &BbiParameters) -> Result<NetFile> {
        if filename.starts_with("http://") || filename.starts_with("https://") {
            Ok(NetFile::Http(HttpFile::new(filename, parameters)))
        } else {
            Ok(NetFile::File(LocalFile::open(filename)?))
        }
    }

}

/* -------------------------------------------------------------------------- */

impl ByteRangeSource for NetFile {

    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        match self {
            NetFile::File  (file) => file.fetch(offset, size).await,
            NetFile::Http  (file) => file.fetch(offset, size).await,
            NetFile::Memory(file) => file.fetch(offset, size).await,
        }
    }

}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
