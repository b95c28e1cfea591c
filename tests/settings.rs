mod common;

use std::fs;
use std::num::NonZeroU32;
use std::path::PathBuf;

use serde_json::json;

use common::{registry, scratch_dir};
use juviz::db::open::open_db;
use juviz::job::JobConfiguration;
use juviz::settings::{ConfigStore, SettingsRegistry, SettingsSchema};
use juviz::slurm::template::ScriptTemplate;
use juviz::WorkingDirectory;

fn open(wd: &WorkingDirectory) -> SettingsRegistry {
    SettingsRegistry::open(open_db(wd).unwrap(), SettingsSchema::embedded().unwrap()).unwrap()
}

#[test]
fn reloading_without_edits_gives_the_same_configuration() {
    let dir = scratch_dir("reload");
    let store = registry(&dir);
    let first = JobConfiguration::load(&store).unwrap();
    let second = JobConfiguration::load(&store).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.account, "abc");
    assert_eq!(first.nodes, NonZeroU32::new(2).unwrap());
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn stored_configuration_survives_a_restart() {
    let dir = scratch_dir("restart");
    let wd = WorkingDirectory { path: dir.clone() };
    let config = JobConfiguration {
        account: "abc".to_string(),
        job_name: "viz1".to_string(),
        nodes: NonZeroU32::new(2).unwrap(),
        time_limit: "01:00:00".parse().unwrap(),
        partition: "gpu".to_string(),
        displays: 2,
        stdout: None,
        stderr: Some(PathBuf::from("/scratch/viz1.err")),
        auth_key_file: None,
    };

    let mut store = open(&wd);
    config.store(&mut store).unwrap();
    drop(store);

    let reopened = open(&wd);
    assert_eq!(JobConfiguration::load(&reopened).unwrap(), config);
    assert_eq!(reopened.get("timeLimit"), Some(json!("01:00:00")));
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn defaults_fill_in_unset_settings() {
    let dir = scratch_dir("defaults");
    let wd = WorkingDirectory { path: dir.clone() };
    let config = JobConfiguration::load(&open(&wd)).unwrap();
    assert_eq!(config.account, "");
    assert_eq!(config.partition, "batch");
    assert_eq!(config.job_name, "paraview");
    assert_eq!(config.time_limit.to_string(), "01:00:00");
    assert_eq!(config.stdout, None);
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn invalid_values_are_not_persisted() {
    let dir = scratch_dir("invalid");
    let wd = WorkingDirectory { path: dir.clone() };
    let mut store = open(&wd);
    assert!(store.set("name", json!("two words")).is_err());
    assert!(store.set("displays", json!(-1)).is_err());
    drop(store);

    let reopened = open(&wd);
    assert_eq!(reopened.get("name"), Some(json!("paraview")));
    assert_eq!(reopened.get("displays"), Some(json!(0)));
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn cleared_log_paths_are_derived_from_the_job_name() {
    let dir = scratch_dir("cleared");
    let mut store = registry(&dir);
    store.set("stdout", json!("")).unwrap();
    store.set("stderr", json!("")).unwrap();

    let config = JobConfiguration::load(&store).unwrap();
    assert_eq!(config.stdout, None);
    assert_eq!(config.stderr, None);

    let script = ScriptTemplate::embedded().render(&config).unwrap();
    assert!(script.contains("#SBATCH --output=viz1-%j.out\n"));
    assert!(script.contains("#SBATCH --error=viz1-%j.err\n"));
    fs::remove_dir_all(dir).unwrap();
}
