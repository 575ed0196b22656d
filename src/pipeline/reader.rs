//! Chunk reader
//!
//! Producer/slicer threads feeding record-aligned chunks to the caller.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;

use bytes::BytesMut;
use crossbeam::channel::{bounded, Receiver, Sender};

use crate::config::Config;
use crate::error::{Result, StoreError};

/// A run of whole records read from the file
#[derive(Debug)]
pub struct Chunk {
    first_record: u64,
    record_size: usize,
    data: BytesMut,
}

impl Chunk {
    /// Position (record number) of the first record in this chunk
    pub fn first_record(&self) -> u64 {
        self.first_record
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.record_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn record(&self, i: usize) -> &[u8] {
        &self.data[i * self.record_size..(i + 1) * self.record_size]
    }

    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.record_size)
    }
}

struct Block {
    data: BytesMut,
}

/// Consumer end of the scan pipeline
pub struct ChunkReader {
    chunks: Receiver<Result<Chunk>>,
    chunk_pool: Sender<BytesMut>,
}

impl ChunkReader {
    /// Start scanning `record_count` records of `record_size` bytes that
    /// begin at byte `offset` of the file at `path`
    pub fn spawn(
        path: &Path,
        offset: u64,
        record_size: usize,
        record_count: u64,
        config: &Config,
    ) -> Result<Self> {
        if record_size == 0 {
            return Err(StoreError::Config("record size must be non-zero".to_string()));
        }
        config.validate()?;

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;

        let depth = config.pipeline_queue_depth;
        let block_size = config.pipeline_block_size;
        let chunk_bytes = config.pipeline_chunk_records * record_size;
        let total = record_count * record_size as u64;

        let (block_tx, block_rx) = bounded::<Result<Block>>(depth);
        let (block_pool_tx, block_pool_rx) = bounded::<BytesMut>(depth);
        let (chunk_tx, chunk_rx) = bounded::<Result<Chunk>>(depth);
        let (chunk_pool_tx, chunk_pool_rx) = bounded::<BytesMut>(depth);

        for _ in 0..depth {
            // Pools start full; capacity equals depth so these never block
            let _ = block_pool_tx.send(BytesMut::with_capacity(block_size));
            let _ = chunk_pool_tx.send(BytesMut::with_capacity(chunk_bytes));
        }

        tracing::debug!(
            path = %path.display(),
            record_size,
            record_count,
            "starting scan pipeline"
        );

        thread::Builder::new()
            .name("rowstore-scan-producer".to_string())
            .spawn(move || produce(file, total, block_size, block_pool_rx, block_tx))?;

        thread::Builder::new()
            .name("rowstore-scan-slicer".to_string())
            .spawn(move || {
                slice(
                    record_size,
                    chunk_bytes,
                    block_rx,
                    block_pool_tx,
                    chunk_pool_rx,
                    chunk_tx,
                )
            })?;

        Ok(Self {
            chunks: chunk_rx,
            chunk_pool: chunk_pool_tx,
        })
    }

    /// Hand a consumed chunk buffer back to the pool
    pub fn recycle(&self, chunk: Chunk) {
        let mut data = chunk.data;
        data.clear();
        let _ = self.chunk_pool.send(data);
    }

    /// Iterate record by record, recycling chunks automatically
    pub fn records(self) -> RecordIter {
        RecordIter {
            reader: self,
            current: None,
            position: 0,
        }
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.recv().ok()
    }
}

/// Record-at-a-time view over a [`ChunkReader`]; yields
/// `(record number, record bytes)`
pub struct RecordIter {
    reader: ChunkReader,
    current: Option<Chunk>,
    position: usize,
}

impl Iterator for RecordIter {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = &self.current {
                if self.position < chunk.len() {
                    let record = chunk.record(self.position).to_vec();
                    let number = chunk.first_record + self.position as u64;
                    self.position += 1;
                    return Some(Ok((number, record)));
                }
            }
            if let Some(done) = self.current.take() {
                self.reader.recycle(done);
            }
            match self.reader.next()? {
                Ok(chunk) => {
                    self.current = Some(chunk);
                    self.position = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Read raw blocks until `total` bytes have been read. Exits when the slicer
/// has gone away.
fn produce(
    mut file: File,
    total: u64,
    block_size: usize,
    pool: Receiver<BytesMut>,
    out: Sender<Result<Block>>,
) {
    let mut remaining = total;
    while remaining > 0 {
        let Ok(mut data) = pool.recv() else {
            return;
        };
        let len = (block_size as u64).min(remaining) as usize;
        data.resize(len, 0);
        if let Err(e) = file.read_exact(&mut data[..]) {
            let _ = out.send(Err(e.into()));
            return;
        }
        remaining -= len as u64;
        if out.send(Ok(Block { data })).is_err() {
            return;
        }
    }
}

/// Repack blocks into record-aligned chunks. Exits when the consumer has
/// gone away or the producer is done.
fn slice(
    record_size: usize,
    chunk_bytes: usize,
    blocks: Receiver<Result<Block>>,
    block_pool: Sender<BytesMut>,
    chunk_pool: Receiver<BytesMut>,
    out: Sender<Result<Chunk>>,
) {
    let mut next_record = 0u64;
    let mut current: Option<BytesMut> = None;

    for block in blocks.iter() {
        let block = match block {
            Ok(block) => block,
            Err(e) => {
                let _ = out.send(Err(e));
                return;
            }
        };

        let mut input = &block.data[..];
        while !input.is_empty() {
            if current.is_none() {
                match chunk_pool.recv() {
                    Ok(buf) => current = Some(buf),
                    Err(_) => return,
                }
            }
            let Some(chunk) = current.as_mut() else {
                return;
            };
            let take = (chunk_bytes - chunk.len()).min(input.len());
            chunk.extend_from_slice(&input[..take]);
            input = &input[take..];

            if chunk.len() == chunk_bytes {
                if let Some(data) = current.take() {
                    let records = (data.len() / record_size) as u64;
                    let chunk = Chunk {
                        first_record: next_record,
                        record_size,
                        data,
                    };
                    next_record += records;
                    if out.send(Ok(chunk)).is_err() {
                        return;
                    }
                }
            }
        }

        let mut spent = block.data;
        spent.clear();
        let _ = block_pool.send(spent);
    }

    if let Some(data) = current.take() {
        if !data.is_empty() {
            let _ = out.send(Ok(Chunk {
                first_record: next_record,
                record_size,
                data,
            }));
        }
    }
}
