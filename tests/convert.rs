mod common;

use qnet_freeze::checkpoint::bundle::data_path;
use qnet_freeze::{convert, read_graph, ParamName, ParameterSet, Session, Topology};

use common::{inputs, known_params, manual_forward, save, setup};

#[test_log::test]
fn frozen_graph_reproduces_checkpoint_forward_pass() {
    let (dir, prefix, params) = setup(7);
    let out = dir.path().join("qnet.pb");

    let report = convert(&prefix, &out).unwrap();
    assert_eq!(report.output_node, "Add_2");
    assert_eq!(report.parameters.len(), 6);

    let graph = read_graph(&out).unwrap();
    let session = Session::new(&graph).unwrap();
    let x = inputs(5, 11);
    let q = session.run(&[("Placeholder", &x)], "Add_2").unwrap();
    assert_eq!(q.shape(), (5, 12));

    for (row, expected) in x.data.iter().zip(&q.data) {
        let manual = manual_forward(&params, row);
        for (a, b) in manual.iter().zip(expected) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }
}

#[test_log::test]
fn frozen_graph_matches_host_network() {
    let (dir, prefix, params) = setup(3);
    let out = dir.path().join("qnet.pb");
    convert(&prefix, &out).unwrap();

    let set = ParameterSet::new(Topology::QNET, params).unwrap();
    let network = qnet_freeze::Network::from_params(&set).unwrap();
    let graph = read_graph(&out).unwrap();
    let session = Session::new(&graph).unwrap();

    let x = inputs(3, 5);
    assert_eq!(session.run(&[("Placeholder", &x)], "Add_2").unwrap(), network.forward(&x));
}

#[test_log::test]
fn mismatched_input_width_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("narrow");
    let narrow = Topology { n_inputs: 10, ..Topology::QNET };
    save(&prefix, &known_params(narrow, 1), &[]);
    let out = dir.path().join("qnet.pb");

    let err = convert(&prefix, &out).unwrap_err();
    assert!(format!("{err:#}").contains("shape mismatch"));
    assert!(!out.exists());
}

#[test_log::test]
fn missing_checkpoint_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("qnet.pb");
    assert!(convert(&dir.path().join("does-not-exist"), &out).is_err());
    assert!(!out.exists());
}

#[test_log::test]
fn missing_variable_is_reported_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("partial");
    let mut params = known_params(Topology::QNET, 2);
    params.remove(&ParamName::BiasH2);
    save(&prefix, &params, &[]);
    let out = dir.path().join("qnet.pb");

    let err = convert(&prefix, &out).unwrap_err();
    assert!(format!("{err:#}").contains("Variable_4"));
    assert!(!out.exists());
}

#[test_log::test]
fn repeated_conversion_is_byte_identical() {
    let (dir, prefix, _) = setup(9);
    let out = dir.path().join("qnet.pb");

    convert(&prefix, &out).unwrap();
    let first = std::fs::read(&out).unwrap();
    convert(&prefix, &out).unwrap();
    let second = std::fs::read(&out).unwrap();
    assert_eq!(first, second);
}

#[test_log::test]
fn optimizer_slots_in_checkpoint_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("adam");
    let params = known_params(Topology::QNET, 4);
    save(&prefix, &params, &["Variable/Adam", "Variable/Adam_1", "beta1_power"]);
    let out = dir.path().join("qnet.pb");

    convert(&prefix, &out).unwrap();
    let graph = read_graph(&out).unwrap();
    let session = Session::new(&graph).unwrap();
    let x = inputs(1, 1);
    let q = session.run(&[("Placeholder", &x)], "Add_2").unwrap();
    let manual = manual_forward(&params, &x.data[0]);
    assert!(manual.iter().zip(&q.data[0]).all(|(a, b)| (a - b).abs() < 1e-4));
}

#[test_log::test]
fn checkpoint_directory_resolves_latest_prefix() {
    let (dir, _prefix, _) = setup(5);
    std::fs::write(
        dir.path().join("checkpoint"),
        "model_checkpoint_path: \"model.ckpt-4000\"\n\
         all_model_checkpoint_paths: \"model.ckpt-4000\"\n",
    )
    .unwrap();
    let out = dir.path().join("qnet.pb");

    let report = convert(dir.path(), &out).unwrap();
    assert!(report.checkpoint.ends_with("model.ckpt-4000"));
    assert!(out.exists());
}

#[test_log::test]
fn corrupted_shard_fails_checksum() {
    let (dir, prefix, _) = setup(6);
    let shard = data_path(&prefix, 0, 1);
    let mut bytes = std::fs::read(&shard).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x10;
    std::fs::write(&shard, bytes).unwrap();
    let out = dir.path().join("qnet.pb");

    let err = convert(&prefix, &out).unwrap_err();
    assert!(format!("{err:#}").contains("checksum mismatch"));
    assert!(!out.exists());
}

#[test_log::test]
fn unwritable_output_path_fails() {
    let (dir, prefix, _) = setup(8);
    let out = dir.path().join("missing-dir").join("qnet.pb");
    assert!(convert(&prefix, &out).is_err());
    assert!(!out.exists());
}
