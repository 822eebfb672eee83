// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;
use std::io::Write;

#[test]
fn empty_file_yields_defaults() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(f, "{{}}").expect("write");

    let settings = Settings::load(f.path()).expect("load");
    assert_eq!(settings.gateway.port, 8900);
    assert_eq!(settings.state.login_slot_count, 16);
    assert_eq!(settings.state.heartbeat_timeout(), Duration::from_millis(5_000));
    assert_eq!(settings.cache.endpoints, vec!["redis://127.0.0.1:6379".to_owned()]);
}

#[test]
fn partial_sections_override_defaults() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        f,
        "gateway:\n  port: 9000\n  max_tcp_num: 100\nstate:\n  heartbeat_timeout_ms: 50\ndiscovery:\n  gateways: [\"127.0.0.1:8901\"]"
    )
    .expect("write");

    let settings = Settings::load(f.path()).expect("load");
    assert_eq!(settings.gateway.port, 9000);
    assert_eq!(settings.gateway.max_tcp_num, 100);
    // untouched fields keep defaults
    assert_eq!(settings.gateway.rpc_port, 8901);
    assert_eq!(settings.state.heartbeat_timeout(), Duration::from_millis(50));
    assert_eq!(settings.discovery.gateways.len(), 1);
}

#[test]
fn missing_file_is_an_error() {
    assert!(Settings::load("/nonexistent/volary.yaml").is_err());
}
