//! Tensor bundle: the V2 checkpoint layout.
//!
//! A bundle with prefix `P` is made of `P.index`, a sorted table mapping
//! tensor names to `BundleEntryProto`s (plus the `BundleHeaderProto` under
//! the empty key), and data shards `P.data-00000-of-0000N` holding the raw
//! tensor bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use prost::Message;

use super::coding::masked_crc32c;
use super::table::{Table, TableBuilder};
use crate::math::tensor::{num_elements, Tensor};
use crate::proto::{
    BundleEntryProto, BundleHeaderProto, DataType, Endianness, TensorShapeProto, VersionDef,
};

/// Bundle format version this crate reads and writes.
pub const BUNDLE_VERSION: i32 = 1;

const HEADER_KEY: &[u8] = b"";

pub fn index_path(prefix: &Path) -> PathBuf {
    append_to_path(prefix, ".index")
}

pub fn data_path(prefix: &Path, shard_id: i32, num_shards: i32) -> PathBuf {
    append_to_path(prefix, &format!(".data-{:05}-of-{:05}", shard_id, num_shards))
}

fn append_to_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BundleReader {
    prefix: PathBuf,
    header: BundleHeaderProto,
    entries: BTreeMap<String, BundleEntryProto>,
}

impl BundleReader {
    /// Reads and validates the bundle index. Data shards are opened lazily
    /// by `read_tensor`.
    pub fn open(prefix: impl AsRef<Path>) -> Result<BundleReader> {
        let prefix = prefix.as_ref().to_path_buf();
        let index = index_path(&prefix);
        let bytes = std::fs::read(&index)
            .with_context(|| format!("failed to read checkpoint index {}", index.display()))?;
        let table = Table::parse(&bytes)
            .with_context(|| format!("malformed checkpoint index {}", index.display()))?;

        let header_bytes = table
            .get(HEADER_KEY)
            .ok_or_else(|| anyhow!("checkpoint index {} has no bundle header", index.display()))?;
        let header = BundleHeaderProto::decode(header_bytes).context("decoding bundle header")?;
        check_header(&header)?;

        let mut entries = BTreeMap::new();
        for (key, value) in table.iter().filter(|(k, _)| !k.is_empty()) {
            let name = std::str::from_utf8(key)
                .with_context(|| format!("tensor name {:?} is not UTF-8", key))?
                .to_owned();
            let entry = BundleEntryProto::decode(value)
                .with_context(|| format!("decoding bundle entry for {name:?}"))?;
            entries.insert(name, entry);
        }
        debug!("opened checkpoint {} with {} tensors", prefix.display(), entries.len());

        Ok(BundleReader { prefix, header, entries })
    }

    pub fn num_shards(&self) -> i32 {
        self.header.num_shards
    }

    /// Tensor names in key order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Stored dtype and shape of a tensor, without reading its data.
    pub fn metadata(&self, name: &str) -> Result<(DataType, Vec<usize>)> {
        let entry = self.entry(name)?;
        Ok((entry.dtype(), entry_shape(name, entry)?))
    }

    /// Reads a float tensor, checking its size and checksum.
    pub fn read_tensor(&self, name: &str) -> Result<Tensor> {
        let entry = self.entry(name)?;
        if !entry.slices.is_empty() {
            bail!("tensor {name:?} is stored as partitioned slices, which is not supported");
        }
        if entry.dtype() != DataType::DtFloat {
            bail!("tensor {name:?} has dtype {:?}, expected DtFloat", entry.dtype());
        }
        let shape = entry_shape(name, entry)?;
        let expected_size = num_elements(&shape)
            .with_context(|| format!("sizing tensor {name:?}"))?
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| anyhow!("tensor {name:?} of shape {shape:?} is too large"))?;
        let size = usize::try_from(entry.size)
            .with_context(|| format!("tensor {name:?} has negative size {}", entry.size))?;
        if size != expected_size {
            bail!("tensor {name:?} of shape {shape:?} should occupy {expected_size} bytes, entry says {size}");
        }
        if entry.shard_id < 0 || entry.shard_id >= self.header.num_shards {
            bail!(
                "tensor {name:?} refers to shard {} of {}",
                entry.shard_id, self.header.num_shards
            );
        }
        let offset = u64::try_from(entry.offset)
            .with_context(|| format!("tensor {name:?} has negative offset {}", entry.offset))?;

        let path = data_path(&self.prefix, entry.shard_id, self.header.num_shards);
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open checkpoint shard {}", path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size];
        file.read_exact(&mut buf).with_context(|| {
            format!("checkpoint shard {} is truncated reading {name:?}", path.display())
        })?;

        let crc = masked_crc32c(&[buf.as_slice()]);
        if crc != entry.crc32c {
            bail!(
                "checksum mismatch for tensor {name:?}: stored {:#010x}, computed {crc:#010x}",
                entry.crc32c
            );
        }
        Tensor::from_le_bytes(shape, &buf)
    }

    fn entry(&self, name: &str) -> Result<&BundleEntryProto> {
        self.entries.get(name).ok_or_else(|| {
            anyhow!("tensor {name:?} not found in checkpoint {}", self.prefix.display())
        })
    }
}

fn check_header(header: &BundleHeaderProto) -> Result<()> {
    if header.num_shards < 1 {
        bail!("bundle header declares {} shards", header.num_shards);
    }
    if header.endianness() != Endianness::Little {
        bail!("big-endian checkpoints are not supported");
    }
    if let Some(v) = &header.version {
        if v.min_consumer > BUNDLE_VERSION {
            bail!(
                "checkpoint requires bundle reader version {} (this reader is {})",
                v.min_consumer, BUNDLE_VERSION
            );
        }
        if v.bad_consumers.contains(&BUNDLE_VERSION) {
            bail!("checkpoint explicitly rejects bundle reader version {BUNDLE_VERSION}");
        }
    }
    Ok(())
}

fn entry_shape(name: &str, entry: &BundleEntryProto) -> Result<Vec<usize>> {
    let shape = entry.shape.clone().unwrap_or_default();
    if shape.unknown_rank {
        bail!("tensor {name:?} has unknown rank");
    }
    shape
        .dims()
        .into_iter()
        .map(|d| usize::try_from(d).map_err(|_| anyhow!("tensor {name:?} has dimension {d}")))
        .collect()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes a single-shard bundle. Tensors are appended to the data shard in
/// the order they are added; the index is written by `finish`.
pub struct BundleWriter {
    prefix: PathBuf,
    data: Vec<u8>,
    entries: BTreeMap<String, BundleEntryProto>,
}

impl BundleWriter {
    pub fn new(prefix: impl AsRef<Path>) -> BundleWriter {
        BundleWriter {
            prefix: prefix.as_ref().to_path_buf(),
            data: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, name: &str, tensor: &Tensor) -> Result<()> {
        if name.is_empty() {
            bail!("tensor name must not be empty");
        }
        if self.entries.contains_key(name) {
            bail!("tensor {name:?} added twice");
        }
        let bytes = tensor.to_le_bytes();
        let dims: Vec<i64> = tensor.shape.iter().map(|&d| d as i64).collect();
        let entry = BundleEntryProto {
            dtype: DataType::DtFloat as i32,
            shape: Some(TensorShapeProto::from_dims(&dims)),
            shard_id: 0,
            offset: self.data.len() as i64,
            size: bytes.len() as i64,
            crc32c: masked_crc32c(&[bytes.as_slice()]),
            slices: Vec::new(),
        };
        self.data.extend_from_slice(&bytes);
        self.entries.insert(name.to_owned(), entry);
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let data = data_path(&self.prefix, 0, 1);
        write_file(&data, &self.data)?;

        let header = BundleHeaderProto {
            num_shards: 1,
            endianness: Endianness::Little as i32,
            version: Some(VersionDef {
                producer: BUNDLE_VERSION,
                min_consumer: 0,
                bad_consumers: Vec::new(),
            }),
        };
        let mut table = TableBuilder::new();
        table.add(HEADER_KEY, &header.encode_to_vec())?;
        for (name, entry) in &self.entries {
            table.add(name.as_bytes(), &entry.encode_to_vec())?;
        }
        write_file(&index_path(&self.prefix), &table.finish())?;

        debug!(
            "wrote checkpoint {} with {} tensors",
            self.prefix.display(),
            self.entries.len()
        );
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle(dir: &Path) -> PathBuf {
        let prefix = dir.join("model.ckpt-100");
        let mut writer = BundleWriter::new(&prefix);
        writer
            .add("Variable", &Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap())
            .unwrap();
        writer
            .add("Variable_1", &Tensor::new(vec![3], vec![-1.0, 0.5, 0.25]).unwrap())
            .unwrap();
        writer.finish().unwrap();
        prefix
    }

    #[test]
    fn shard_file_names_follow_convention() {
        let p = data_path(Path::new("/tmp/model.ckpt-5"), 0, 1);
        assert_eq!(p, PathBuf::from("/tmp/model.ckpt-5.data-00000-of-00001"));
        assert_eq!(index_path(Path::new("ckpt")), PathBuf::from("ckpt.index"));
    }

    #[test]
    fn reads_back_written_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = sample_bundle(dir.path());

        let reader = BundleReader::open(&prefix).unwrap();
        assert_eq!(reader.num_shards(), 1);
        assert_eq!(reader.names().collect::<Vec<_>>(), vec!["Variable", "Variable_1"]);
        assert_eq!(reader.metadata("Variable").unwrap(), (DataType::DtFloat, vec![2, 3]));

        let bias = reader.read_tensor("Variable_1").unwrap();
        assert_eq!(bias.shape, vec![3]);
        assert_eq!(bias.data, vec![-1.0, 0.5, 0.25]);
        assert!(reader.read_tensor("Variable_2").is_err());
    }

    #[test]
    fn detects_corrupted_shard() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = sample_bundle(dir.path());
        let shard = data_path(&prefix, 0, 1);
        let mut bytes = std::fs::read(&shard).unwrap();
        bytes[5] ^= 0x01;
        std::fs::write(&shard, bytes).unwrap();

        let reader = BundleReader::open(&prefix).unwrap();
        let err = reader.read_tensor("Variable").unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(reader.read_tensor("Variable_1").is_ok());
    }

    #[test]
    fn detects_truncated_shard() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = sample_bundle(dir.path());
        let shard = data_path(&prefix, 0, 1);
        let bytes = std::fs::read(&shard).unwrap();
        std::fs::write(&shard, &bytes[..30]).unwrap();

        let reader = BundleReader::open(&prefix).unwrap();
        assert!(reader.read_tensor("Variable_1").is_err());
    }

    #[test]
    fn oversized_entry_shape_is_an_error() {
        let entry = BundleEntryProto {
            dtype: DataType::DtFloat as i32,
            shape: Some(TensorShapeProto::from_dims(&[1 << 33, 1 << 33])),
            size: 4,
            ..Default::default()
        };
        let reader = BundleReader {
            prefix: PathBuf::from("unused"),
            header: BundleHeaderProto { num_shards: 1, ..Default::default() },
            entries: BTreeMap::from([("huge".to_owned(), entry)]),
        };
        let err = reader.read_tensor("huge").unwrap_err();
        assert!(format!("{err:#}").contains("too many elements"));
    }

    #[test]
    fn missing_index_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleReader::open(dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("nope.index"));
    }

    #[test]
    fn rejects_duplicate_and_empty_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path().join("x"));
        let t = Tensor::new(vec![1], vec![0.0]).unwrap();
        writer.add("a", &t).unwrap();
        assert!(writer.add("a", &t).is_err());
        assert!(writer.add("", &t).is_err());
    }
}
