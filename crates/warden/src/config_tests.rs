// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::*;

fn parse(extra: &[&str]) -> WardenConfig {
    let mut args = vec!["warden".to_owned()];
    args.extend(extra.iter().map(|s| (*s).to_owned()));
    WardenConfig::parse_from(args)
}

#[test]
fn defaults_are_sensible() {
    let config = parse(&[]);

    assert_eq!(config.check_interval(), Duration::from_secs(24 * 60 * 60));
    assert_eq!(config.renew_threshold(), Duration::from_secs(5 * 24 * 60 * 60));
    assert_eq!(config.log_retention(), Duration::from_secs(7 * 24 * 60 * 60));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(30));
    assert!(config.device_auth_enabled());
    assert!(config.session_token.is_none());
}

#[test]
fn no_device_auth_flag_disables_interactive_auth() {
    let config = parse(&["--no-device-auth"]);
    assert!(!config.device_auth_enabled());
}

#[test]
fn state_dir_derives_token_file_and_artifact() {
    let config = parse(&["--state-dir", "/var/lib/warden"]);

    assert_eq!(config.token_file(), std::path::PathBuf::from("/var/lib/warden/tokens.json"));
    assert_eq!(
        config.device_auth_artifact(),
        std::path::PathBuf::from("/var/lib/warden/device_auth.txt")
    );
}

#[test]
fn log_dir_defaults_to_server_dir_logs() {
    let config = parse(&["--server-binary", "/srv/hytale/HytaleServer"]);
    assert_eq!(config.server_dir(), std::path::PathBuf::from("/srv/hytale"));
    assert_eq!(config.log_dir(), std::path::PathBuf::from("/srv/hytale/logs"));

    let config = parse(&["--log-dir", "/var/log/hytale"]);
    assert_eq!(config.log_dir(), std::path::PathBuf::from("/var/log/hytale"));
}

#[test]
fn trailing_args_pass_through_to_the_server() {
    let config = parse(&["--no-device-auth", "--", "--world", "default", "-v"]);
    assert_eq!(config.server_args, vec!["--world", "default", "-v"]);
}

#[test]
fn endpoints_come_from_flags() {
    let config = parse(&[
        "--token-url",
        "http://localhost:9999/token",
        "--client-id",
        "custom-client",
    ]);
    let endpoints = config.endpoints();
    assert_eq!(endpoints.token_url, "http://localhost:9999/token");
    assert_eq!(endpoints.client_id, "custom-client");
    assert_eq!(endpoints.sessions_url, "https://sessions.hytale.com");
}
