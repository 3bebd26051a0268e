// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::MetricRecord;
use std::sync::Arc;

/// An ordered, immutable group of records shipped in one `PutRecordBatch` call.
///
/// Cloning is cheap, so a batch can be held by the retry loop and handed to
/// failure listeners at the same time.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Arc<[MetricRecord]>,
}

impl Batch {
    pub fn new(records: Vec<MetricRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes every record into its wire form.
    pub fn encode(&self) -> Result<Vec<Vec<u8>>, serde_json::Error> {
        self.records.iter().map(MetricRecord::to_bytes).collect()
    }
}

/// Splits `records` into consecutive batches of at most `limit` records.
///
/// Order is preserved and nothing is dropped or duplicated. A `limit` of zero
/// is treated as one.
pub fn make_batches(records: Vec<MetricRecord>, limit: usize) -> Vec<Batch> {
    let limit = limit.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(limit));
    let mut records = records.into_iter().peekable();

    while records.peek().is_some() {
        batches.push(Batch::new(records.by_ref().take(limit).collect()));
    }

    batches
}
