//! JSONL log file sink for the relay.
//!
//! Every line is flushed as soon as it is written so `tail -f` and `jq` see
//! it immediately. The file is opened in append mode; a server and one-shot
//! operator commands can share it.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Append-only handle on the relay's JSONL log file.
///
/// Clones share one buffered file, so it doubles as its own `MakeWriter`.
#[derive(Clone)]
pub struct JsonlFileWriter {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlFileWriter {
    /// Open `path` for appending, creating it and its directory if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

impl Write for JsonlFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        let written = file.write(buf)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for JsonlFileWriter {
    type Writer = JsonlFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the JSONL file layer plus, if asked, compact stderr output.
///
/// Fails without installing anything when the file cannot be opened.
pub(crate) fn init_file_subscriber(config: &LogConfig, log_path: &Path) -> io::Result<()> {
    let writer = JsonlFileWriter::open(log_path)?;
    let filter = crate::env_filter(&config.default_level);

    let stderr = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(filter.clone())
    });

    tracing_subscriber::registry()
        .with(JsonLayer::new(config.service_name.clone(), writer).with_filter(filter))
        .with(stderr)
        .init();

    tracing::info!(log_path = %log_path.display(), "Logging to file");
    Ok(())
}
