//! Console process utilities

use crate::result::ExpectError;
use std::io::Read;
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;

/// Check if a child process is still alive
pub fn is_alive(child: &mut Box<dyn portable_pty::Child + Send>) -> Result<bool, ExpectError> {
    match child.try_wait() {
        Ok(Some(_)) => Ok(false),
        Ok(None) => Ok(true),
        Err(e) => Err(ExpectError::IoError(e)),
    }
}

/// Pump PTY output into a channel from a dedicated thread.
///
/// The channel closes when the PTY reports end of stream. On Linux a
/// closed slave side shows up as `EIO` rather than a zero-length read, so
/// read errors also end the stream.
pub fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, ExpectError> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("console-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!("console reader stopped: {}", e);
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}
