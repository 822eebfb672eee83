// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;

#[test]
fn display_carries_context() {
    let err = Error::FrameInvalid { len: 0, max: 1 << 20 };
    assert_eq!(err.to_string(), "invalid frame length 0 (max 1048576)");
    assert_eq!(Error::NoSuchConn(42).to_string(), "no such connection: 42");
    assert_eq!(Error::CacheUnavailable("down".into()).to_string(), "cache unavailable: down");
}

#[test]
fn io_errors_convert_losslessly() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
    let err = Error::from(io);
    assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset));
}
