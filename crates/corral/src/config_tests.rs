// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[test]
fn defaults() {
    let config = Config::parse_from(["corral"]);
    assert_eq!(config.port, 5000);
    assert_eq!(config.base_port, 4723);
    assert_eq!(config.port_range, 100);
    assert_eq!(config.discovery_interval, 30);
    assert!(!config.seed_demo_devices);
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_empty_port_range() {
    let config = Config::parse_from(["corral", "--port-range", "0"]);
    assert!(config.validate().is_err());
}

#[test]
fn rejects_range_past_u16() {
    let config = Config::parse_from(["corral", "--base-port", "65500", "--port-range", "100"]);
    assert!(config.validate().is_err());
}

#[test]
fn rejects_unknown_environment() {
    let config = Config::parse_from(["corral", "--env", "staging"]);
    assert!(config.validate().is_err());
}

#[test]
fn production_flag() {
    let config = Config::parse_from(["corral", "--env", "production"]);
    assert!(config.validate().is_ok());
    assert!(config.production());
}

#[test]
fn upload_dir_defaults_under_tmp() {
    let config = Config::parse_from(["corral"]);
    assert!(config.upload_dir().ends_with("corral-uploads"));
}
