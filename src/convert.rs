use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::checkpoint::{resolve_prefix, BundleReader};
use crate::graph::runtime::Session;
use crate::math::matrix::Matrix;
use crate::network::frozen::FrozenGraph;
use crate::network::params::ParamName;
use crate::network::topology::Topology;
use crate::network::variables::VariableGraph;

const CHECK_BATCH: usize = 4;
const OUTPUT_TOLERANCE: f32 = 1e-4;

/// What a conversion restored and wrote; printed by the CLI as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub checkpoint: String,
    pub output: String,
    pub topology: Topology,
    pub parameters: Vec<ParameterReport>,
    pub input_node: String,
    pub output_node: String,
    pub nodes: usize,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReport {
    pub name: ParamName,
    pub variable: String,
    pub shape: Vec<usize>,
}

/// Restores the Q-network from the checkpoint at `restore` and writes it to
/// `out` as a frozen binary GraphDef.
///
/// Every failure happens before the output is touched, except for the
/// final write itself, which never leaves a partial file.
pub fn convert(restore: &Path, out: &Path) -> Result<ConversionReport> {
    let prefix = resolve_prefix(restore)?;
    info!("restoring {} from {}", describe(&Topology::QNET), prefix.display());

    // Source graph: variables restored from the checkpoint, then read out.
    let mut source = VariableGraph::new(Topology::QNET);
    {
        let reader = BundleReader::open(&prefix)?;
        source
            .restore(&reader)
            .with_context(|| format!("failed to restore checkpoint {}", prefix.display()))?;
    }
    let params = source.extract()?;
    info!("restored {} tensors", ParamName::ALL.len());

    // Target graph: same computation with the values baked in.
    let frozen = FrozenGraph::build(&params);
    let graph_def = frozen.graph_def();
    let session = Session::new(graph_def).context("frozen graph failed validation")?;
    info!(
        "built frozen graph with {} nodes ({} -> {})",
        graph_def.node.len(),
        frozen.input_name(),
        frozen.output_name()
    );
    check_outputs_agree(&source, &session, &frozen)?;

    let bytes_written = frozen.write(out)?;
    info!("wrote {} bytes to {}", bytes_written, out.display());

    let parameters = params
        .iter()
        .map(|(name, tensor)| {
            debug!("{} -> {:?}", name.label(), tensor.shape);
            ParameterReport {
                name,
                variable: name.variable_name().to_owned(),
                shape: tensor.shape.clone(),
            }
        })
        .collect();

    Ok(ConversionReport {
        checkpoint: prefix.display().to_string(),
        output: out.display().to_string(),
        topology: params.topology(),
        parameters,
        input_node: frozen.input_name().to_owned(),
        output_node: frozen.output_name().to_owned(),
        nodes: graph_def.node.len(),
        bytes_written,
    })
}

/// Feeds one random batch through both graphs and fails if any Q-value
/// differs by more than `OUTPUT_TOLERANCE`, relative to its magnitude.
fn check_outputs_agree(
    source: &VariableGraph,
    session: &Session<'_>,
    frozen: &FrozenGraph,
) -> Result<()> {
    let batch = Matrix::random_normal(CHECK_BATCH, Topology::QNET.n_inputs);
    let expected = source.forward(&batch)?;
    let actual = session
        .run(&[(frozen.input_name(), &batch)], frozen.output_name())
        .context("evaluating frozen graph")?;
    if actual.shape() != expected.shape() {
        bail!(
            "frozen graph produced shape {:?}, source graph {:?}",
            actual.shape(),
            expected.shape()
        );
    }
    let diff = expected
        .data
        .iter()
        .flatten()
        .zip(actual.data.iter().flatten())
        .map(|(a, b)| (a - b).abs() / (1.0 + a.abs()))
        .fold(0.0f32, f32::max);
    if diff > OUTPUT_TOLERANCE {
        bail!("frozen graph disagrees with source graph by {diff}");
    }
    debug!("frozen graph agrees with source graph (max relative diff {diff:e})");
    Ok(())
}

fn describe(t: &Topology) -> String {
    format!("{}-{}-{}-{} Q-network", t.n_inputs, t.n_hidden_1, t.n_hidden_2, t.n_actions)
}
