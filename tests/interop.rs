mod common;

use tract_tensorflow::prelude::*;

use common::{inputs, manual_forward, setup};

#[test_log::test]
fn converted_graph_runs_in_tract() -> TractResult<()> {
    let (dir, prefix, params) = setup(21);
    let out = dir.path().join("qnet.pb");
    let report = qnet_freeze::convert(&prefix, &out)?;

    let model = tract_tensorflow::tensorflow()
        .model_for_path(&out)?
        .with_input_fact(0, f32::fact([2, 26]).into())?
        .with_output_names([report.output_node.as_str()])?
        .into_optimized()?
        .into_runnable()?;

    let x = inputs(2, 13);
    let flat: Vec<f32> = x.data.iter().flatten().copied().collect();
    let input = tract_ndarray::Array2::from_shape_vec((2, 26), flat)?.into_tensor();
    let outputs = model.run(tvec!(input.into()))?;

    assert_eq!(outputs[0].shape(), &[2, 12]);
    let q = outputs[0].as_slice::<f32>()?;
    for (row, got) in x.data.iter().zip(q.chunks(12)) {
        let expected = manual_forward(&params, row);
        for (a, b) in expected.iter().zip(got) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }
    Ok(())
}
