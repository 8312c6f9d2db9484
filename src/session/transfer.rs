//! SFTP upload and download with optional progress callbacks.

use std::io::{self, Read, Write};

use camino::Utf8Path;
use ssh2::Session;
use tracing::debug;

use super::{ProgressCallback, SessionError};
use crate::local_fs;

/// Size of each chunk streamed between the local and remote file.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Copies `reader` into `writer` in [`CHUNK_SIZE`] chunks, reporting
/// `(bytes_so_far, total)` after each chunk.
///
/// # Errors
///
/// Returns the first read or write error. Bytes already written stay written.
pub fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    mut progress: Option<ProgressCallback<'_>>,
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = buffer
            .get(..read)
            .ok_or_else(|| io::Error::other("reader reported more bytes than the buffer holds"))?;
        writer.write_all(chunk)?;
        copied = copied.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));

        if let Some(report) = progress.as_deref_mut() {
            report(copied, total);
        }
    }

    writer.flush()?;
    Ok(copied)
}

pub(super) fn upload(
    session: &Session,
    local: &Utf8Path,
    remote: &Utf8Path,
    progress: Option<ProgressCallback<'_>>,
) -> Result<u64, SessionError> {
    let local_error = |err: io::Error| transfer_error(local, &err);
    let remote_error = |err: ssh2::Error| SessionError::Transfer {
        path: remote.to_string(),
        message: err.to_string(),
    };

    let mut source = local_fs::open(local).map_err(local_error)?;
    let total = source.metadata().map_err(local_error)?.len();
    let sftp = session.sftp().map_err(remote_error)?;
    let mut destination = sftp.create(remote.as_std_path()).map_err(remote_error)?;

    debug!(%local, %remote, total, "uploading file");
    copy_with_progress(&mut source, &mut destination, total, progress)
        .map_err(|err| transfer_error(remote, &err))
}

pub(super) fn download(
    session: &Session,
    remote: &Utf8Path,
    local: &Utf8Path,
    progress: Option<ProgressCallback<'_>>,
) -> Result<u64, SessionError> {
    let remote_error = |err: ssh2::Error| SessionError::Transfer {
        path: remote.to_string(),
        message: err.to_string(),
    };

    let sftp = session.sftp().map_err(remote_error)?;
    let mut source = sftp.open(remote.as_std_path()).map_err(remote_error)?;
    let total = source.stat().map_err(remote_error)?.size.unwrap_or(0);
    let mut destination = local_fs::create(local).map_err(|err| transfer_error(local, &err))?;

    debug!(%remote, %local, total, "downloading file");
    copy_with_progress(&mut source, &mut destination, total, progress)
        .map_err(|err| transfer_error(local, &err))
}

fn transfer_error(path: &Utf8Path, err: &io::Error) -> SessionError {
    SessionError::Transfer {
        path: path.to_string(),
        message: err.to_string(),
    }
}
