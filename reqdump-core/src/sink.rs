//! Output sinks for dump records.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Destination for rendered dump records.
///
/// Implementations are shared by every in-flight request and must not
/// interleave two records.
pub trait DumpSink: Send + Sync {
    fn write_dump(&self, record: &str) -> io::Result<()>;

    /// Short name for startup logs.
    fn name(&self) -> &'static str;
}

/// Writes each record, followed by a newline, to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl DumpSink for StdoutSink {
    fn write_dump(&self, record: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(record.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Emits each record as an `info` event on the `reqdump::dump` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DumpSink for TracingSink {
    fn write_dump(&self, record: &str) -> io::Result<()> {
        info!(target: "reqdump::dump", dump = %record, "Request dump");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<String> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DumpSink for MemorySink {
    fn write_dump(&self, record: &str) -> io::Result<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?;
        guard.push(record.to_owned());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl<S: DumpSink + ?Sized> DumpSink for Arc<S> {
    fn write_dump(&self, record: &str) -> io::Result<()> {
        (**self).write_dump(record)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
