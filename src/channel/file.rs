//! File delivery channel
//!
//! Renders the batch to a timestamped file in the output directory and, when
//! FTP is enabled, uploads it in binary passive mode. The FTP session is
//! blocking, so it runs on a blocking worker; transport stays synchronous
//! per batch either way. FTP failures are transport-fatal: no retry at this
//! layer.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::PathBuf;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{info, warn};

use crate::channel::{delivery_error, DeliveryChannel};
use crate::config::FtpConfig;
use crate::domain::{BatchResult, LedgerEntry};
use crate::error::{RelayError, Result};
use crate::export::{batch_file_name, render, FileFormat};

/// Status string for the file channel, which has no remote side to poll
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

pub struct FileChannel {
    output_dir: PathBuf,
    format: FileFormat,
    ftp: Option<FtpConfig>,
}

impl FileChannel {
    pub fn new(output_dir: PathBuf, format: FileFormat, ftp: Option<FtpConfig>) -> Self {
        Self {
            output_dir,
            format,
            ftp,
        }
    }

    /// Render and write the batch file, creating the output directory if
    /// absent. Returns the full path.
    fn write_batch_file(&self, batch: &[LedgerEntry]) -> Result<PathBuf> {
        let body = render(batch, self.format)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(batch_file_name(self.format));
        std::fs::write(&path, body)?;

        Ok(path)
    }

    /// Binary passive-mode upload: connect, login, store, quit. The quit runs
    /// on every path so the connection never lingers after a failure.
    fn ftp_upload(config: &FtpConfig, remote_name: &str, bytes: Vec<u8>) -> Result<()> {
        let address = format!("{}:{}", config.host, config.port);
        let mut ftp = FtpStream::connect(&address)
            .map_err(|e| RelayError::Ftp(format!("connect to {address}: {e}")))?;
        ftp.set_mode(Mode::Passive);

        let transfer = (|| -> std::result::Result<(), suppaftp::FtpError> {
            ftp.login(&config.user, &config.password)?;
            ftp.transfer_type(FileType::Binary)?;
            let mut reader = Cursor::new(bytes);
            ftp.put_file(remote_name, &mut reader)?;
            Ok(())
        })();

        if let Err(e) = ftp.quit() {
            warn!("FTP disconnect failed: {}", e);
        }

        transfer.map_err(|e| RelayError::Ftp(e.to_string()))
    }
}

#[async_trait]
impl DeliveryChannel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, batch: &[LedgerEntry]) -> BatchResult {
        let path = match self.write_batch_file(batch) {
            Ok(path) => path,
            Err(e) => {
                warn!("Batch file generation failed: {}", e);
                return BatchResult::failed(delivery_error(self.name(), e));
            }
        };

        if let Some(ftp) = &self.ftp {
            let remote_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    return BatchResult::failed(delivery_error(
                        self.name(),
                        "generated file has no valid name",
                    ))
                }
            };

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => return BatchResult::failed(delivery_error(self.name(), e)),
            };

            let ftp = ftp.clone();
            let upload = tokio::task::spawn_blocking(move || {
                Self::ftp_upload(&ftp, &remote_name, bytes)
            })
            .await;

            match upload {
                Ok(Ok(())) => {
                    info!("Batch file uploaded via FTP: {}", path.display());
                }
                Ok(Err(e)) => {
                    warn!("FTP upload failed: {}", e);
                    return BatchResult::failed(delivery_error(self.name(), e))
                        .with_reference(path.display().to_string());
                }
                Err(e) => {
                    return BatchResult::failed(delivery_error(
                        self.name(),
                        format!("upload task panicked: {e}"),
                    ))
                    .with_reference(path.display().to_string());
                }
            }
        } else {
            info!("Batch file generated: {}", path.display());
        }

        BatchResult::ok().with_reference(path.display().to_string())
    }

    async fn batch_status(&self, _batch_id: &str) -> String {
        // A response file or other out-of-band mechanism would be needed here
        STATUS_UNKNOWN.to_string()
    }
}
