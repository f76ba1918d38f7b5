use std::{env, fs};

use assert_matches::assert_matches;

use nvmft::subsys::{Config, ConfigError, NvmfTgtConfig, NvmfTransportOpts};

pub mod common;

fn scratch_file(name: &str) -> String {
    let mut path = env::temp_dir();
    path.push(format!("nvmft-{}-{}", std::process::id(), name));
    path.display().to_string()
}

#[test]
fn read_missing_file_yields_defaults() {
    common::test_init();
    let path = scratch_file("missing.yaml");

    let config = Config::read(path.as_str()).unwrap();
    assert_eq!(config.nvmf_tgt_conf, NvmfTgtConfig::default());
    // the path is remembered so a later export lands there
    assert_eq!(config.source, Some(path));
}

#[test]
fn read_empty_file_yields_defaults() {
    common::test_init();
    let path = scratch_file("empty.yaml");
    fs::write(&path, "").unwrap();

    let config = Config::read(path.as_str()).unwrap();
    assert_eq!(config.nvmf_tgt_conf, NvmfTgtConfig::default());
    assert_eq!(config.source, Some(path.clone()));

    fs::remove_file(path).ok();
}

#[test]
fn read_partial_file_fills_in_defaults() {
    common::test_init();
    let path = scratch_file("partial.yaml");
    fs::write(&path, "nvmf_tgt_conf:\n  max_queues_per_session: 8\n").unwrap();

    let config = Config::read(path.as_str()).unwrap();
    assert_eq!(config.nvmf_tgt_conf.max_queues_per_session, 8);
    // groups the file does not mention keep their defaults
    assert_eq!(config.nvmf_tgt_conf.opts, NvmfTransportOpts::default());
    assert!(!config.sync_disable);

    fs::remove_file(path).ok();
}

#[test]
fn read_rejects_unknown_options() {
    common::test_init();
    let path = scratch_file("unknown.yaml");
    fs::write(&path, "no_such_option: true\n").unwrap();

    assert_matches!(
        Config::read(path.as_str()),
        Err(ConfigError::ParseFile { .. })
    );

    fs::remove_file(path).ok();
}

#[test]
fn read_rejects_malformed_yaml() {
    common::test_init();
    let path = scratch_file("malformed.yaml");
    fs::write(&path, "nvmf_tgt_conf: [not, a, mapping\n").unwrap();

    assert_matches!(
        Config::read(path.as_str()),
        Err(ConfigError::ParseFile { .. })
    );

    fs::remove_file(path).ok();
}

#[test]
fn write_and_read_round_trip() {
    common::test_init();
    let path = scratch_file("round-trip.yaml");

    let mut config = Config::default();
    config.nvmf_tgt_conf.name = "round-trip".to_string();
    config.nvmf_tgt_conf.max_queues_per_session = 16;

    config.refresh().write(path.as_str()).unwrap();
    let read_back = Config::read(path.as_str()).unwrap();

    assert_eq!(read_back.nvmf_tgt_conf, config.nvmf_tgt_conf);
    assert_eq!(read_back.source, Some(path.clone()));

    fs::remove_file(path).ok();
}
