use std::path::PathBuf;

use super::types::{ParallelConfig, RunConfig};
use crate::error::ConfigError;

#[test]
fn parse_empty_toml_uses_defaults() {
    let cfg = RunConfig::from_toml("").unwrap();
    assert_eq!(cfg.batch_size, 1);
    assert_eq!(cfg.num_mpi, 1);
    assert_eq!(cfg.num_threads, 1);
    assert!(cfg.parallel_command.is_empty());
    assert!(!cfg.delete_successful_logs);
    assert!(!cfg.parallel.internal_parallel);
    assert_eq!(cfg.working_dir, PathBuf::from("."));
}

#[test]
fn parse_full_toml() {
    let toml = r#"
batch_size = 4
num_mpi = 2
parallel_command = "mpiexec -n"
num_threads = 8
threading_command = "--n-threads="
precommand = "time "
postcommand = "> /dev/null"
script_dir = "/opt/scripts"
framework_dir = "/opt/framework"
working_dir = "/scratch/run"
delete_successful_logs = true
delete_out_extensions = ["e", ".rst"]

[parallel]
internal_parallel = true
nodes = ["node1", "node1", "node2"]
"#;
    let cfg = RunConfig::from_toml(toml).unwrap();
    assert_eq!(cfg.num_mpi, 2);
    assert_eq!(cfg.parallel_command, "mpiexec -n");
    assert_eq!(cfg.threading_command, "--n-threads=");
    assert_eq!(cfg.precommand, "time ");
    assert_eq!(cfg.framework_dir, PathBuf::from("/opt/framework"));
    assert_eq!(cfg.delete_out_extensions, vec!["e", ".rst"]);
    assert!(cfg.parallel.internal_parallel);
    assert_eq!(cfg.parallel.nodes.len(), 3);
    assert_eq!(cfg.parallel.total_cores, 1); // default
}

#[test]
fn zero_batch_size_rejected() {
    let err = RunConfig::from_toml("batch_size = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("batch_size"));
}

#[test]
fn empty_extension_rejected() {
    let mut cfg = RunConfig::default();
    cfg.delete_out_extensions = vec![".".to_string()];
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn zero_cores_rejected_only_with_internal_parallel() {
    let mut cfg = RunConfig::default();
    cfg.parallel.total_cores = 0;
    assert!(cfg.validate().is_ok());

    cfg.parallel.internal_parallel = true;
    assert!(cfg.validate().is_err());

    cfg.parallel.nodes = vec!["localhost".to_string()];
    assert!(cfg.validate().is_ok());
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = RunConfig::from_toml("batch_size = \"many\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn unique_nodes_keeps_first_seen_order() {
    let parallel = ParallelConfig {
        internal_parallel: true,
        nodes: vec![
            "b ".to_string(),
            "a".to_string(),
            "b".to_string(),
            " a".to_string(),
        ],
        total_cores: 1,
    };
    assert_eq!(parallel.unique_nodes(), vec!["b", "a"]);
}

#[test]
fn with_batch_size_sets_slots() {
    let cfg = RunConfig::with_batch_size(3);
    assert_eq!(cfg.batch_size, 3);
    assert!(cfg.validate().is_ok());
}

#[test]
fn load_without_path_matches_empty_document() {
    let loaded = RunConfig::load(None).unwrap();
    let parsed = RunConfig::from_toml("").unwrap();
    assert_eq!(loaded.batch_size, parsed.batch_size);
    assert_eq!(loaded.num_mpi, parsed.num_mpi);
    assert_eq!(loaded.working_dir, parsed.working_dir);
}

#[test]
fn load_with_path_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.toml");
    std::fs::write(&path, "batch_size = 0\n").unwrap();
    let err = RunConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
