// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Streaming file transfer over a session.
//!
//! Data moves in [`TRANSFER_CHUNK_SIZE`] chunks through a pooled buffer, so
//! memory use does not grow with file size.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, TransferDirection};
use crate::ssh::Session;
use crate::utils::buffer_pool::{global, TRANSFER_CHUNK_SIZE};

/// Local content to upload.
pub enum UploadSource {
    /// A file on the local machine.
    Path(PathBuf),
    /// Bytes held in memory.
    Bytes(Vec<u8>),
    /// Any asynchronous reader, consumed to its end.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl UploadSource {
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        UploadSource::Reader(Box::new(reader))
    }

    async fn open(self) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(match self {
            UploadSource::Path(path) => Box::new(tokio::fs::File::open(path).await?),
            UploadSource::Bytes(bytes) => Box::new(io::Cursor::new(bytes)),
            UploadSource::Reader(reader) => reader,
        })
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            UploadSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadSource::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::Path(path)
    }
}

impl From<&PathBuf> for UploadSource {
    fn from(path: &PathBuf) -> Self {
        UploadSource::Path(path.clone())
    }
}

impl From<&str> for UploadSource {
    fn from(path: &str) -> Self {
        UploadSource::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Bytes(bytes)
    }
}

impl From<&[u8]> for UploadSource {
    fn from(bytes: &[u8]) -> Self {
        UploadSource::Bytes(bytes.to_vec())
    }
}

/// Copy `reader` into `writer` chunk by chunk, then flush and shut the writer down.
pub(crate) async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = global::get_transfer_buffer();
    buffer.resize(TRANSFER_CHUNK_SIZE, 0);

    let mut total = 0u64;
    loop {
        let n = reader.read(buffer.as_mut_slice()).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer.as_slice()[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(total)
}

/// Upload `source` to `destination`, returning the number of bytes written.
pub(crate) async fn upload(
    session: &dyn Session,
    source: UploadSource,
    destination: &str,
) -> Result<u64, Error> {
    let failed = |source: io::Error| Error::Transfer {
        direction: TransferDirection::Upload,
        path: destination.to_string(),
        source,
    };

    debug!("Uploading {:?} to {}", source, destination);
    let mut reader = source.open().await.map_err(failed)?;
    let mut writer = session.open_writer(destination).await.map_err(failed)?;
    let written = copy_chunked(&mut reader, &mut writer).await.map_err(failed)?;
    debug!("Uploaded {} bytes to {}", written, destination);
    Ok(written)
}

/// Stream the remote file at `path` into `writer`.
pub(crate) async fn download_into<W>(
    session: &dyn Session,
    path: &str,
    writer: &mut W,
) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let failed = |source: io::Error| Error::Transfer {
        direction: TransferDirection::Download,
        path: path.to_string(),
        source,
    };

    debug!("Downloading {}", path);
    let mut reader = session.open_reader(path).await.map_err(failed)?;
    let read = copy_chunked(&mut reader, writer).await.map_err(failed)?;
    debug!("Downloaded {} bytes from {}", read, path);
    Ok(read)
}

/// Stream the remote file at `path` into a new local file.
pub(crate) async fn download_to_file(
    session: &dyn Session,
    path: &str,
    local: &Path,
) -> Result<u64, Error> {
    let mut file = tokio::fs::File::create(local)
        .await
        .map_err(|source| Error::Transfer {
            direction: TransferDirection::Download,
            path: path.to_string(),
            source,
        })?;
    download_into(session, path, &mut file).await
}
