//! CLI command tests

use std::fs;
use std::io::Write;

use clap::Parser;
use spendcast_core::test_utils::monthly_transactions;
use spendcast_core::{DenseRegressor, ForecastConfig, ForecastService, StandardScaler};
use tempfile::TempDir;

use crate::cli::{Cli, Commands, ObservationArgs};
use crate::commands;

fn setup_service(dir: &TempDir) -> ForecastService {
    let service: ForecastService = ForecastService::new(ForecastConfig::with_data_dir(dir.path().join("data")));
    service
        .store()
        .save_base_artifacts(&DenseRegressor::default(), &StandardScaler::identity())
        .unwrap();
    service
}

fn observation(income: f64, expenses: f64, month: u32) -> ObservationArgs {
    ObservationArgs {
        income,
        expenses,
        month,
        savings: income - expenses,
    }
}

fn write_transactions(dir: &TempDir, months: usize, per_month: usize) -> std::path::PathBuf {
    let path = dir.path().join("transactions.json");
    let json = serde_json::to_string(&monthly_transactions(months, per_month)).unwrap();
    fs::write(&path, json).unwrap();
    path
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_predict_args() {
    let cli = Cli::parse_from([
        "spendcast",
        "--data-dir",
        "/tmp/sc",
        "predict",
        "--user",
        "alice",
        "--income",
        "50000",
        "--month",
        "11",
    ]);

    assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/sc")));
    match cli.command {
        Commands::Predict {
            user,
            observation,
            json,
        } => {
            assert_eq!(user, "alice");
            assert_eq!(observation.income, 50000.0);
            assert_eq!(observation.expenses, 0.0);
            assert_eq!(observation.month, 11);
            assert!(!json);
        }
        _ => panic!("expected predict"),
    }
}

#[test]
fn test_parse_retrain_force() {
    let cli = Cli::parse_from(["spendcast", "retrain", "-u", "bob", "--force", "-v"]);
    assert!(cli.verbose);
    assert!(matches!(cli.command, Commands::Retrain { force: true, .. }));
}

#[test]
fn test_load_config_data_dir_override() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("spendcast.toml");
    fs::write(&config_path, "[retraining]\nmin_transactions = 5\n").unwrap();

    let config =
        commands::load_config(Some(&config_path), Some(std::path::Path::new("/tmp/other"))).unwrap();
    assert_eq!(config.retrain.min_transactions, 5);
    assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/other"));
}

#[test]
fn test_load_config_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let result = commands::load_config(Some(&dir.path().join("missing.toml")), None);
    assert!(result.is_err());
}

// ========== Command Tests ==========

#[test]
fn test_cmd_predict() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);

    let result = commands::cmd_predict(&service, "alice", &observation(50000.0, 0.0, 11), false);
    assert!(result.is_ok());
    assert!(service.store().is_initialized("alice").unwrap());
}

#[test]
fn test_cmd_predict_base_without_model_fails() {
    let dir = TempDir::new().unwrap();
    let service: ForecastService = ForecastService::new(ForecastConfig::with_data_dir(dir.path()));

    let result = commands::cmd_predict_base(&service, &observation(50000.0, 4000.0, 3));
    assert!(result.is_err());
}

#[test]
fn test_cmd_add_transactions_and_retrain() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);
    let file = write_transactions(&dir, 5, 4);

    commands::cmd_add_transactions(&service, "carol", &file, false).unwrap();

    let status = service.status("carol").unwrap();
    assert_eq!(status.metadata.transaction_count, 25);
    assert_eq!(status.metadata.training_count, 1);

    // Same file again: nothing new, no retrain
    commands::cmd_add_transactions(&service, "carol", &file, false).unwrap();
    let status = service.status("carol").unwrap();
    assert_eq!(status.metadata.transaction_count, 25);
    assert_eq!(status.metadata.training_count, 1);
}

#[test]
fn test_cmd_add_transactions_no_retrain() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);
    let file = write_transactions(&dir, 5, 4);

    commands::cmd_add_transactions(&service, "dan", &file, true).unwrap();
    assert_eq!(service.status("dan").unwrap().metadata.training_count, 0);
}

#[test]
fn test_cmd_add_transactions_invalid_json() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);
    let path = dir.path().join("bad.json");
    fs::write(&path, "{not json").unwrap();

    assert!(commands::cmd_add_transactions(&service, "erin", &path, false).is_err());
}

#[test]
fn test_cmd_retrain_not_ready_is_ok() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);

    // Not enough data is reported, not treated as a command failure
    assert!(commands::cmd_retrain(&service, "fay", true).is_ok());
}

#[test]
fn test_cmd_status() {
    let dir = TempDir::new().unwrap();
    let service = setup_service(&dir);
    service.predict("gus", 30000.0, 3000.0, 4, 27000.0);

    assert!(commands::cmd_status(&service, None).is_ok());
    assert!(commands::cmd_status(&service, Some("gus")).is_ok());
    assert!(commands::cmd_status(&service, Some("../gus")).is_err());
}

#[test]
fn test_cmd_train_base() {
    let dir = TempDir::new().unwrap();
    let service: ForecastService = ForecastService::new(ForecastConfig::with_data_dir(dir.path().join("data")));

    let csv_path = dir.path().join("base.csv");
    let mut file = fs::File::create(&csv_path).unwrap();
    writeln!(file, "income,expenses,month,savings,next_expenses").unwrap();
    for i in 0..24 {
        let income = 4000.0 + 100.0 * i as f64;
        let expenses = income * 0.6;
        writeln!(
            file,
            "{},{},{},{},{}",
            income,
            expenses,
            i % 12 + 1,
            income - expenses,
            expenses * 1.01
        )
        .unwrap();
    }
    drop(file);

    commands::cmd_train_base(&service, &csv_path, Some(5)).unwrap();
    assert!(service.store().has_base_artifacts());
    assert!(service.predict_base(5000.0, 3000.0, 6, 2000.0).is_ok());
}

#[test]
fn test_cmd_train_base_empty_file_fails() {
    let dir = TempDir::new().unwrap();
    let service: ForecastService = ForecastService::new(ForecastConfig::with_data_dir(dir.path()));
    let csv_path = dir.path().join("empty.csv");
    fs::write(&csv_path, "income,expenses,month,savings,next_expenses\n").unwrap();

    assert!(commands::cmd_train_base(&service, &csv_path, None).is_err());
}
