use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use prost::Message;

use crate::proto::GraphDef;

/// Writes `graph` in binary wire format and returns the number of bytes
/// written.
///
/// The bytes go to a sibling temporary file that is renamed over `path`
/// once complete, so a failed write never leaves a partial graph behind.
/// The parent directory must already exist.
pub fn write_graph(graph: &GraphDef, path: &Path) -> Result<u64> {
    let bytes = graph.encode_to_vec();
    let tmp = temp_sibling(path);

    let result = (|| -> Result<()> {
        let file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move graph into place at {}", path.display()))?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.context(format!("writing graph to {}", path.display())));
    }
    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len() as u64)
}

/// Reads a binary GraphDef file.
pub fn read_graph(path: &Path) -> Result<GraphDef> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read graph {}", path.display()))?;
    GraphDef::decode(bytes.as_slice())
        .with_context(|| format!("{} is not a binary GraphDef", path.display()))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
