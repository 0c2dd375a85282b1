//! Once-only initialization of the global `tracing` subscriber.

use std::sync::OnceLock;

use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LogLevel, LogWriter};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber from the first client's log settings.
/// Later calls are no-ops: `tracing` has exactly one global subscriber,
/// so the first configuration wins.
pub(crate) fn init(level: LogLevel, writer: &LogWriter) {
    let writer = writer.clone();
    INIT.get_or_init(|| {
        let make_writer = match writer {
            LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogWriter::File(file) => BoxMakeWriter::new(file),
        };
        // A test harness may have installed a subscriber already.
        let _ = tracing_subscriber::fmt()
            .with_max_level(level.as_filter())
            .with_writer(make_writer)
            .with_ansi(false)
            .try_init();
    });
}
