//! Accumulated results of a run.

use parking_lot::Mutex;

use passive_core::{CapturedRequest, RemoteOutput};

use crate::collector::CollectorClient;
use crate::error::Result;

/// Collects the serialized records of admitted requests.
///
/// With a collector configured each record is POSTed wrapped in a
/// [`RemoteOutput`] envelope and the envelope is what gets stored. Without
/// one the record is printed to stdout and stored as is.
#[derive(Debug)]
pub struct ResultSink {
    id: String,
    collector: Option<CollectorClient>,
    results: Mutex<Vec<String>>,
}

impl ResultSink {
    /// Creates an empty sink for run `id`.
    pub fn new(id: impl Into<String>, collector: Option<CollectorClient>) -> Self {
        Self {
            id: id.into(),
            collector,
            results: Mutex::new(Vec::new()),
        }
    }

    /// Builds the sink for a run, with a collector when `remote_output_addr`
    /// is set.
    pub fn for_run(id: impl Into<String>, remote_output_addr: Option<&str>) -> Result<Self> {
        let collector = remote_output_addr.map(CollectorClient::new).transpose()?;
        Ok(Self::new(id, collector))
    }

    /// Appends an already serialized entry.
    pub fn emit(&self, serialized: String) {
        self.results.lock().push(serialized);
    }

    /// Forwards or prints an admitted record, then stores it.
    ///
    /// A failed POST is logged; the entry is stored regardless.
    pub async fn emit_record(&self, record: CapturedRequest) -> Result<()> {
        let entry = match &self.collector {
            Some(collector) => {
                let envelope = RemoteOutput::single(&self.id, record).to_json()?;
                if let Err(e) = collector.post_json(envelope.clone()).await {
                    tracing::error!("Failed to send result to {}: {}", collector.url(), e);
                }
                envelope
            }
            None => {
                let json = record.to_json()?;
                print!("{}\r\n", json);
                json
            }
        };

        self.emit(entry);
        Ok(())
    }

    /// Removes and returns every stored entry.
    pub fn drain_all(&self) -> Vec<String> {
        let mut results = self.results.lock();
        let mut drained = Vec::with_capacity(results.len());
        while let Some(entry) = results.pop() {
            drained.push(entry);
        }
        drained
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}
