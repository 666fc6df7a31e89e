//! Streaming multipart download.
//!
//! Parts are written chunk by chunk as they arrive; no part is ever held in
//! memory as a whole. Tar parts can be staged in a temporary file and
//! unpacked into the destination directory.

use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::{is_archive_part, sanitize_part_name, validate_transfer_encoding};
use crate::data::{DownloadOptions, DownloadTarget, TransferPhase, TransferProgress};
use crate::effects::response::Response;
use crate::error::{Error, Result};

/// Declared byte total of all parts.
pub const TOTAL_PAYLOADS_HEADER: &str = "x-total-payloads-length";

struct Reporter<'a> {
    options: &'a DownloadOptions,
    progress: TransferProgress,
}

impl Reporter<'_> {
    fn emit(&self) {
        if let Some(callback) = &self.options.on_progress {
            callback(&self.progress);
        }
    }

    fn phase(&mut self, phase: TransferPhase) {
        self.progress.phase = phase;
        self.progress.delta = 0;
        self.emit();
    }

    fn advance(&mut self, delta: u64) {
        self.progress.phase = TransferPhase::Transferring;
        self.progress.delta = delta;
        self.progress.bytes_transferred += delta;
        self.emit();
    }
}

/// Write every part of a multipart `response` to `options.target`.
///
/// Returns the written paths in part order; an expanded archive is reported
/// as the directory it was unpacked into.
pub async fn save_multipart(response: Response, options: &DownloadOptions) -> Result<Vec<PathBuf>> {
    let content_type = response
        .content_type()
        .ok_or_else(|| Error::protocol("download response has no Content-Type"))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::transport("download response is not multipart", e))?;
    let total_bytes = response
        .header(TOTAL_PAYLOADS_HEADER)
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| response.content_length());

    let mut reporter = Reporter {
        options,
        progress: TransferProgress {
            total_bytes,
            ..Default::default()
        },
    };
    reporter.phase(TransferPhase::Connecting);

    let mut multipart = multer::Multipart::new(response.bytes_stream(), boundary);
    let mut written = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::transport("malformed multipart response", e))?
    {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .map(str::to_owned)
            .ok_or_else(|| Error::protocol("multipart part has no filename"))?;
        let encoding = field
            .headers()
            .get("content-transfer-encoding")
            .and_then(|v| v.to_str().ok());
        validate_transfer_encoding(&name, encoding)?;
        let part_type = field.content_type().map(|m| m.to_string());
        reporter.progress.part = Some(name.clone());

        match &options.target {
            DownloadTarget::File(path) => {
                if !written.is_empty() {
                    return Err(Error::protocol("expected a single part for a file download"));
                }
                create_parent(path).await?;
                let mut file = File::create(path).await?;
                write_field(&mut field, &mut file, &mut reporter).await?;
                written.push(path.clone());
            }
            DownloadTarget::Directory(dir) => {
                let relative = sanitize_part_name(&name)?;
                if options.expand_archives && is_archive_part(&name, part_type.as_deref()) {
                    let staging = File::from_std(tempfile::tempfile()?);
                    let staging = write_field(&mut field, staging, &mut reporter).await?;
                    reporter.phase(TransferPhase::Expanding);
                    expand_archive(staging, dir.clone()).await?;
                    written.push(dir.clone());
                } else {
                    let path = dir.join(relative);
                    create_parent(&path).await?;
                    let mut file = File::create(&path).await?;
                    write_field(&mut field, &mut file, &mut reporter).await?;
                    written.push(path);
                }
            }
        }
        debug!(part = %name, "download part written");
    }

    reporter.progress.part = None;
    // the declared total can exceed the counted part bytes; report it as reached
    if let Some(total) = reporter.progress.total_bytes {
        let remaining = total.saturating_sub(reporter.progress.bytes_transferred);
        if remaining > 0 {
            reporter.advance(remaining);
        }
    }
    reporter.phase(TransferPhase::Completed);
    Ok(written)
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn write_field<W>(
    field: &mut multer::Field<'_>,
    mut out: W,
    reporter: &mut Reporter<'_>,
) -> Result<W>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| Error::transport("multipart part ended unexpectedly", e))?
    {
        out.write_all(&chunk).await?;
        reporter.advance(chunk.len() as u64);
    }
    out.flush().await?;
    Ok(out)
}

async fn expand_archive(staging: File, dest: PathBuf) -> Result<()> {
    let mut staging = staging.into_std().await;
    tokio::task::spawn_blocking(move || -> Result<()> {
        staging.seek(SeekFrom::Start(0))?;
        std::fs::create_dir_all(&dest)?;
        tar::Archive::new(staging).unpack(&dest)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::client(format!("archive extraction task failed: {e}")))?
}

