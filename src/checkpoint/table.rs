//! Immutable sorted string table, the LevelDB-derived container used for
//! a checkpoint's `.index` file.
//!
//! ```text
//! [data block 0][trailer] ... [data block n][trailer]
//! [metaindex block][trailer]
//! [index block][trailer]
//! [footer: metaindex handle, index handle, zero padding to 40 bytes, magic (8 bytes)]
//! ```
//!
//! Each block holds prefix-compressed entries followed by an array of
//! restart offsets; each trailer is a compression byte and a masked CRC32C.

use anyhow::{bail, Context, Result};

use super::coding::{
    get_bytes, get_fixed32, get_fixed64, get_varint, get_varint32, masked_crc32c, put_fixed32,
    put_fixed64, put_varint,
};

pub const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;
pub const FOOTER_LEN: usize = 48;
const HANDLE_AREA_LEN: usize = 40;
const BLOCK_TRAILER_LEN: usize = 5;
const NO_COMPRESSION: u8 = 0;
const SNAPPY_COMPRESSION: u8 = 1;

pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;
pub const DEFAULT_RESTART_INTERVAL: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        put_varint(buf, self.offset);
        put_varint(buf, self.size);
    }

    pub fn decode_from(buf: &mut &[u8]) -> Result<BlockHandle> {
        let offset = get_varint(buf).context("block handle offset")?;
        let size = get_varint(buf).context("block handle size")?;
        Ok(BlockHandle { offset, size })
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

struct BlockBuilder {
    buf: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    restart_interval: usize,
    last_key: Vec<u8>,
    entries: usize,
}

impl BlockBuilder {
    fn new(restart_interval: usize) -> BlockBuilder {
        BlockBuilder {
            buf: Vec::new(),
            restarts: vec![0],
            counter: 0,
            restart_interval: restart_interval.max(1),
            last_key: Vec::new(),
            entries: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn estimated_size(&self) -> usize {
        self.buf.len() + 4 * self.restarts.len() + 4
    }

    fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buf.len() as u32);
            self.counter = 0;
            0
        };
        put_varint(&mut self.buf, shared as u64);
        put_varint(&mut self.buf, (key.len() - shared) as u64);
        put_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
        self.entries += 1;
    }

    /// Appends the restart array and returns the block contents.
    fn finish(mut self) -> Vec<u8> {
        for &r in &self.restarts {
            put_fixed32(&mut self.buf, r);
        }
        put_fixed32(&mut self.buf, self.restarts.len() as u32);
        self.buf
    }
}

/// Decodes every entry of a block, in stored order.
fn parse_block(block: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if block.len() < 4 {
        bail!("block of {} bytes is too short", block.len());
    }
    let num_restarts = get_fixed32(&mut &block[block.len() - 4..])? as usize;
    let restarts_len = num_restarts
        .checked_add(1)
        .and_then(|n| n.checked_mul(4))
        .filter(|&n| n <= block.len())
        .with_context(|| format!("block declares {num_restarts} restart points"))?;
    let mut rd = &block[..block.len() - restarts_len];

    let mut entries = Vec::new();
    let mut key: Vec<u8> = Vec::new();
    while !rd.is_empty() {
        let shared = get_varint32(&mut rd)? as usize;
        let non_shared = get_varint32(&mut rd)? as usize;
        let value_len = get_varint32(&mut rd)? as usize;
        if shared > key.len() {
            bail!("entry shares {shared} bytes with a {}-byte key", key.len());
        }
        key.truncate(shared);
        key.extend_from_slice(get_bytes(&mut rd, non_shared)?);
        let value = get_bytes(&mut rd, value_len)?;
        entries.push((key.clone(), value.to_vec()));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a table in memory. Keys must be added in strictly increasing
/// byte order.
pub struct TableBuilder {
    out: Vec<u8>,
    block: BlockBuilder,
    index: Vec<(Vec<u8>, BlockHandle)>,
    block_size: usize,
    restart_interval: usize,
    last_key: Option<Vec<u8>>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder::with_options(DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_INTERVAL)
    }

    pub fn with_options(block_size: usize, restart_interval: usize) -> TableBuilder {
        TableBuilder {
            out: Vec::new(),
            block: BlockBuilder::new(restart_interval),
            index: Vec::new(),
            block_size,
            restart_interval,
            last_key: None,
        }
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                bail!(
                    "table keys must be strictly increasing: {:?} after {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                );
            }
        }
        self.block.add(key, value);
        self.last_key = Some(key.to_vec());
        if self.block.estimated_size() >= self.block_size {
            self.flush();
        }
        Ok(())
    }

    fn flush(&mut self) {
        if self.block.is_empty() {
            return;
        }
        let block = std::mem::replace(&mut self.block, BlockBuilder::new(self.restart_interval));
        let last_key = block.last_key.clone();
        let handle = self.write_block(&block.finish());
        self.index.push((last_key, handle));
    }

    fn write_block(&mut self, contents: &[u8]) -> BlockHandle {
        let handle = BlockHandle {
            offset: self.out.len() as u64,
            size: contents.len() as u64,
        };
        self.out.extend_from_slice(contents);
        self.out.push(NO_COMPRESSION);
        let crc = masked_crc32c(&[contents, &[NO_COMPRESSION][..]]);
        put_fixed32(&mut self.out, crc);
        handle
    }

    /// Writes the metaindex, index and footer and returns the table bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();

        let metaindex = BlockBuilder::new(self.restart_interval).finish();
        let metaindex_handle = self.write_block(&metaindex);

        // One index entry per data block; the block's last key bounds it.
        let mut index = BlockBuilder::new(1);
        for (key, handle) in std::mem::take(&mut self.index) {
            let mut value = Vec::new();
            handle.encode_to(&mut value);
            index.add(&key, &value);
        }
        let index_handle = self.write_block(&index.finish());

        let mut footer = Vec::with_capacity(FOOTER_LEN);
        metaindex_handle.encode_to(&mut footer);
        index_handle.encode_to(&mut footer);
        footer.resize(HANDLE_AREA_LEN, 0);
        put_fixed64(&mut footer, TABLE_MAGIC);
        self.out.extend_from_slice(&footer);
        self.out
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        TableBuilder::new()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A fully decoded table: every entry, in key order.
#[derive(Debug)]
pub struct Table {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Table {
    pub fn parse(file: &[u8]) -> Result<Table> {
        if file.len() < FOOTER_LEN {
            bail!("file of {} bytes is too short to hold a table footer", file.len());
        }
        let footer = &file[file.len() - FOOTER_LEN..];
        let magic = get_fixed64(&mut &footer[HANDLE_AREA_LEN..])?;
        if magic != TABLE_MAGIC {
            bail!("bad table magic number {magic:#018x}");
        }
        let mut rd = &footer[..HANDLE_AREA_LEN];
        let _metaindex = BlockHandle::decode_from(&mut rd)?;
        let index_handle = BlockHandle::decode_from(&mut rd)?;

        let index = read_block(file, index_handle).context("reading index block")?;
        let mut entries = Vec::new();
        for (_, handle_bytes) in parse_block(index)? {
            let handle = BlockHandle::decode_from(&mut handle_bytes.as_slice())?;
            let block = read_block(file, handle)
                .with_context(|| format!("reading data block at offset {}", handle.offset))?;
            entries.extend(parse_block(block)?);
        }

        if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
            bail!("table keys are not in increasing order");
        }
        Ok(Table { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|i| self.entries[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

/// Returns a block's contents after checking its trailer.
fn read_block(file: &[u8], handle: BlockHandle) -> Result<&[u8]> {
    let start = usize::try_from(handle.offset)?;
    let size = usize::try_from(handle.size)?;
    let end = start
        .checked_add(size)
        .and_then(|e| e.checked_add(BLOCK_TRAILER_LEN))
        .filter(|&e| e <= file.len())
        .with_context(|| {
            format!("block {handle:?} extends past end of file ({} bytes)", file.len())
        })?;

    let contents = &file[start..start + size];
    let compression = file[start + size];
    let stored_crc = get_fixed32(&mut &file[start + size + 1..end])?;
    let actual_crc = masked_crc32c(&[contents, &[compression][..]]);
    if stored_crc != actual_crc {
        bail!(
            "block checksum mismatch at offset {}: stored {stored_crc:#010x}, computed {actual_crc:#010x}",
            handle.offset
        );
    }
    match compression {
        NO_COMPRESSION => Ok(contents),
        SNAPPY_COMPRESSION => bail!("snappy-compressed table blocks are not supported"),
        other => bail!("unknown block compression type {other}"),
    }
}
