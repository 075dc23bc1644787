#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use qnet_freeze::{BundleWriter, Matrix, ParamName, Tensor, Topology};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn known_params(topology: Topology, seed: u64) -> BTreeMap<ParamName, Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    ParamName::ALL
        .into_iter()
        .map(|p| {
            let shape = topology.shape_of(p);
            let n: usize = shape.iter().product();
            let data = (0..n).map(|_| rng.gen_range(-0.2f32..0.2)).collect();
            (p, Tensor::new(shape, data).unwrap())
        })
        .collect()
}

pub fn save(prefix: &Path, params: &BTreeMap<ParamName, Tensor>, extra: &[&str]) {
    let mut writer = BundleWriter::new(prefix);
    for (p, t) in params {
        writer.add(p.variable_name(), t).unwrap();
    }
    for name in extra {
        writer.add(name, &Tensor::new(vec![1], vec![0.9]).unwrap()).unwrap();
    }
    writer.finish().unwrap();
}

/// Two ReLU affine layers and a linear output, written out longhand.
pub fn manual_forward(params: &BTreeMap<ParamName, Tensor>, x: &[f32]) -> Vec<f32> {
    let affine = |input: &[f32], w: &Tensor, b: &Tensor, relu: bool| -> Vec<f32> {
        let (rows, cols) = (w.shape[0], w.shape[1]);
        assert_eq!(input.len(), rows);
        (0..cols)
            .map(|j| {
                let z = b.data[j] + (0..rows).map(|i| input[i] * w.data[i * cols + j]).sum::<f32>();
                if relu { z.max(0.0) } else { z }
            })
            .collect()
    };
    let h1 = affine(x, &params[&ParamName::WeightH1], &params[&ParamName::BiasH1], true);
    let h2 = affine(&h1, &params[&ParamName::WeightH2], &params[&ParamName::BiasH2], true);
    affine(&h2, &params[&ParamName::WeightOut], &params[&ParamName::BiasOut], false)
}

pub fn inputs(batch: usize, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    Matrix::from_data(
        (0..batch)
            .map(|_| (0..26).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect(),
    )
}

/// A QNET checkpoint at `<tmp>/model.ckpt-4000`.
pub fn setup(seed: u64) -> (tempfile::TempDir, PathBuf, BTreeMap<ParamName, Tensor>) {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("model.ckpt-4000");
    let params = known_params(Topology::QNET, seed);
    save(&prefix, &params, &[]);
    (dir, prefix, params)
}
