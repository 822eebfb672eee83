// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;

#[test]
fn cmd_roundtrip() {
    let login = LoginMsg { head: Some(LoginMsgHead { device_id: 42 }) };
    let raw = encode_cmd(CmdType::Login, &login);

    let cmd = decode_cmd(&raw).expect("decode");
    assert_eq!(cmd.r#type(), CmdType::Login);
    let inner: LoginMsg = decode_payload(&cmd).expect("payload");
    assert_eq!(inner.head.expect("head").device_id, 42);
}

#[test]
fn unknown_type_tag_is_rejected() {
    let cmd = MsgCmd { r#type: 99, payload: Vec::new() };
    let raw = cmd.encode_to_vec();
    assert!(matches!(decode_cmd(&raw), Err(Error::ProtocolViolation(_))));
}

#[test]
fn unspecified_type_tag_is_rejected() {
    let cmd = MsgCmd { r#type: CmdType::Unspecified as i32, payload: Vec::new() };
    let raw = cmd.encode_to_vec();
    assert!(matches!(decode_cmd(&raw), Err(Error::ProtocolViolation(_))));
}

#[test]
fn garbage_bytes_are_rejected() {
    assert!(matches!(decode_cmd(&[0xff, 0xff, 0xff]), Err(Error::ProtocolViolation(_))));
}
