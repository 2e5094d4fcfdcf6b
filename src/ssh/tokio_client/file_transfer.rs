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

//! SFTP file streams.
//!
//! Each open file gets its own SFTP subsystem channel. Some sshd_config files
//! do not enable sftp by default; a line like `Subsystem sftp internal-sftp`
//! is needed on the remote machine.

use russh_sftp::client::fs::File;
use russh_sftp::{client::SftpSession, protocol::OpenFlags};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::connection::Client;

/// A remote file together with the SFTP session that serves it.
pub struct SftpFile {
    file: File,
    _sftp: Arc<SftpSession>,
}

impl Client {
    /// Open `path` over a fresh SFTP session, for writing (create/truncate)
    /// or for reading.
    pub async fn open_remote_file(&self, path: &str, write: bool) -> io::Result<SftpFile> {
        let channel = self.get_channel().await.map_err(io::Error::other)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(io::Error::other)?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(io::Error::other)?;

        let flags = if write {
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE
        } else {
            OpenFlags::READ
        };
        let file = sftp
            .open_with_flags(path, flags)
            .await
            .map_err(sftp_error_to_io)?;

        Ok(SftpFile {
            file,
            _sftp: Arc::new(sftp),
        })
    }
}

fn sftp_error_to_io(error: russh_sftp::client::error::Error) -> io::Error {
    use russh_sftp::client::error::Error as SftpError;
    use russh_sftp::protocol::StatusCode;

    let kind = match &error {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => io::ErrorKind::NotFound,
            StatusCode::PermissionDenied => io::ErrorKind::PermissionDenied,
            _ => io::ErrorKind::Other,
        },
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, error.to_string())
}

impl AsyncRead for SftpFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

impl AsyncWrite for SftpFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().file).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}
