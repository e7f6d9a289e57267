//! Append-only TLS key log
//!
//! Writes session secrets in the NSS key-log format understood by packet
//! analysers. The file is opened once per process and only ever appended to.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// `rustls::KeyLog` sink backed by a single append-mode file
#[derive(Debug)]
pub struct KeyLogAppender {
    path: PathBuf,
    file: Mutex<File>,
}

impl KeyLogAppender {
    /// Open (creating if needed) the key-log file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create key-log directory {}", parent.display()))?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options
            .open(&path)
            .with_context(|| format!("Failed to open key-log file {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl rustls::KeyLog for KeyLogAppender {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let line = format!(
            "{} {} {}\n",
            label,
            hex::encode(client_random),
            hex::encode(secret)
        );

        let mut file = self.file.lock();
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "Failed to append key-log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::KeyLog;

    #[test]
    fn test_appends_nss_lines() {
        let dir = std::env::temp_dir().join(format!("quictun-keylog-{}", std::process::id()));
        let path = dir.join("nested").join("sslkeys.log");

        let log = KeyLogAppender::open(&path).unwrap();
        log.log("CLIENT_HANDSHAKE_TRAFFIC_SECRET", &[0xab, 0x01], &[0xff]);
        drop(log);

        // A second open keeps what was written before
        let log = KeyLogAppender::open(&path).unwrap();
        log.log("SERVER_TRAFFIC_SECRET_0", &[0x02], &[0x10, 0x20]);
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "CLIENT_HANDSHAKE_TRAFFIC_SECRET ab01 ff\nSERVER_TRAFFIC_SECRET_0 02 1020\n"
        );

        std::fs::remove_dir_all(dir).unwrap();
    }
}
