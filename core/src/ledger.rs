use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chunk crossing one hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub chunk_id: u32,
    pub file_name: String,
    pub hash: String,
    /// Sender label.
    pub from: String,
    /// Receiver label.
    pub to: String,
    /// Milliseconds.
    pub transfer_time: f64,
}

impl Block {
    pub fn new(
        block_number: u64,
        chunk_id: u32,
        file_name: impl Into<String>,
        hash: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        transfer_time: f64,
    ) -> Self {
        Self {
            block_number,
            timestamp: Utc::now(),
            chunk_id,
            file_name: file_name.into(),
            hash: hash.into(),
            from: from.into(),
            to: to.into(),
            transfer_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("block number {got} out of sequence, expected {expected}")]
    OutOfSequence { expected: u64, got: u64 },
}

/// Append-only block sequence. Block numbers equal insertion positions.
/// Only serialized; loading goes through `Snapshot::from_json`, which checks
/// the numbering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn next_block_number(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn append(&mut self, block: Block) -> Result<(), LedgerError> {
        let expected = self.next_block_number();
        if block.block_number != expected {
            return Err(LedgerError::OutOfSequence {
                expected,
                got: block.block_number,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Append a block stamped with the next block number.
    pub fn record(
        &mut self,
        chunk_id: u32,
        file_name: &str,
        hash: &str,
        from: &str,
        to: &str,
        transfer_time: f64,
    ) -> &Block {
        let block = Block::new(
            self.next_block_number(),
            chunk_id,
            file_name,
            hash,
            from,
            to,
            transfer_time,
        );
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    /// Replace the whole ledger.
    pub fn reset(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
    }

    pub fn sent_by<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.from == label)
    }

    pub fn received_by<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.to == label)
    }

    /// Distinct file names sent by a node, in first-seen order.
    pub fn files_sent_by(&self, label: &str) -> Vec<&str> {
        distinct(
            self.blocks
                .iter()
                .filter(|b| b.from == label)
                .map(|b| b.file_name.as_str()),
        )
    }

    pub fn files_received_by(&self, label: &str) -> Vec<&str> {
        distinct(
            self.blocks
                .iter()
                .filter(|b| b.to == label)
                .map(|b| b.file_name.as_str()),
        )
    }

    /// Distinct (file name, chunk id) pairs a node sent or received.
    pub fn chunks_touching(&self, label: &str) -> Vec<(&str, u32)> {
        distinct(
            self.blocks
                .iter()
                .filter(|b| b.from == label || b.to == label)
                .map(|b| (b.file_name.as_str(), b.chunk_id)),
        )
    }

    pub fn total_transfer_time(&self) -> f64 {
        self.blocks.iter().map(|b| b.transfer_time).sum()
    }
}

fn distinct<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
