//! Deferred remote operations.
//!
//! A [`Bundle`] collects fetches and saves from many label rows and runs them
//! in order against a [`LabelClient`] when executed. The transport behind the
//! client is opaque to this crate; [`MemoryClient`] keeps documents in a map.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{LabelError, Result};

/// The transport that loads and stores label documents.
pub trait LabelClient {
    fn fetch_label_row(&self, label_hash: &str) -> Result<Value>;

    fn save_label_row(&mut self, label_hash: &str, document: Value) -> Result<()>;
}

/// An operation queued on a [`Bundle`].
#[derive(Clone, Debug, PartialEq)]
pub enum BundleOperation {
    /// Store a document that was serialized when the operation was queued.
    Save { label_hash: String, document: Value },
    Fetch { label_hash: String },
}

impl BundleOperation {
    pub fn label_hash(&self) -> &str {
        match self {
            BundleOperation::Save { label_hash, .. } | BundleOperation::Fetch { label_hash } => {
                label_hash
            }
        }
    }
}

/// An ordered queue of deferred operations.
#[derive(Clone, Debug, Default)]
pub struct Bundle {
    operations: Vec<BundleOperation>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, operation: BundleOperation) {
        tracing::debug!(label_hash = operation.label_hash(), "queued bundle operation");
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[BundleOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Runs every queued operation in order, stopping at the first failure.
    #[tracing::instrument(skip_all, fields(operations = self.operations.len()))]
    pub fn execute(self, client: &mut dyn LabelClient) -> Result<BundleResults> {
        let mut results = BundleResults::default();
        for operation in self.operations {
            match operation {
                BundleOperation::Save {
                    label_hash,
                    document,
                } => {
                    client.save_label_row(&label_hash, document)?;
                    results.saved.push(label_hash);
                }
                BundleOperation::Fetch { label_hash } => {
                    let document = client.fetch_label_row(&label_hash)?;
                    results.fetched.insert(label_hash, document);
                }
            }
        }
        Ok(results)
    }
}

/// What an executed bundle produced.
#[derive(Clone, Debug, Default)]
pub struct BundleResults {
    fetched: HashMap<String, Value>,
    saved: Vec<String>,
}

impl BundleResults {
    /// The document fetched for `label_hash`, if the bundle fetched it.
    pub fn fetched(&self, label_hash: &str) -> Option<&Value> {
        self.fetched.get(label_hash)
    }

    /// Label hashes saved, in execution order.
    pub fn saved(&self) -> &[String] {
        &self.saved
    }
}

/// Keeps label documents in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryClient {
    rows: HashMap<String, Value>,
    save_count: usize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, label_hash: impl Into<String>, document: Value) -> Self {
        self.rows.insert(label_hash.into(), document);
        self
    }

    pub fn get(&self, label_hash: &str) -> Option<&Value> {
        self.rows.get(label_hash)
    }

    /// Number of saves received so far.
    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl LabelClient for MemoryClient {
    fn fetch_label_row(&self, label_hash: &str) -> Result<Value> {
        self.rows.get(label_hash).cloned().ok_or_else(|| {
            LabelError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("label row '{label_hash}' not found"),
            ))
        })
    }

    fn save_label_row(&mut self, label_hash: &str, document: Value) -> Result<()> {
        self.rows.insert(label_hash.to_string(), document);
        self.save_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operations_run_in_order() {
        let mut client = MemoryClient::new().with_row("a", json!({"label_hash": "a"}));
        let mut bundle = Bundle::new();
        bundle.enqueue(BundleOperation::Save {
            label_hash: "b".into(),
            document: json!({"label_hash": "b"}),
        });
        bundle.enqueue(BundleOperation::Fetch {
            label_hash: "b".into(),
        });
        bundle.enqueue(BundleOperation::Fetch {
            label_hash: "a".into(),
        });
        assert_eq!(bundle.len(), 3);

        let results = bundle.execute(&mut client).unwrap();
        assert_eq!(results.saved(), ["b".to_string()]);
        assert_eq!(results.fetched("b"), Some(&json!({"label_hash": "b"})));
        assert!(results.fetched("a").is_some());
        assert_eq!(client.save_count(), 1);
    }

    #[test]
    fn test_missing_row_stops_execution() {
        let mut client = MemoryClient::new();
        let mut bundle = Bundle::new();
        bundle.enqueue(BundleOperation::Fetch {
            label_hash: "missing".into(),
        });
        bundle.enqueue(BundleOperation::Save {
            label_hash: "x".into(),
            document: json!({}),
        });
        let err = bundle.execute(&mut client).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
        assert_eq!(client.save_count(), 0);
    }
}
