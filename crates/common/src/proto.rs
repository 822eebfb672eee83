// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Generated protobuf types for the `volary.v1` package, plus the small
//! helpers both services use to build and crack the inner `MsgCmd` union.

use prost::Message;

use crate::error::Error;

tonic::include_proto!("volary.v1");

/// Advisory reply codes carried by `GatewayResponse` / `StateResponse`.
pub mod code {
    pub const OK: i32 = 0;
    pub const NO_SUCH_CONN: i32 = 1;
    pub const WRITE_FAILED: i32 = 2;
    pub const INTERNAL: i32 = 3;
}

/// Serialize `payload` wrapped in a `MsgCmd` of the given type.
pub fn encode_cmd(ty: CmdType, payload: &impl Message) -> Vec<u8> {
    let cmd = MsgCmd { r#type: ty as i32, payload: payload.encode_to_vec() };
    cmd.encode_to_vec()
}

/// Decode an outer `MsgCmd`, rejecting unknown type tags.
pub fn decode_cmd(data: &[u8]) -> Result<MsgCmd, Error> {
    let cmd = MsgCmd::decode(data).map_err(|e| Error::ProtocolViolation(e.to_string()))?;
    if CmdType::try_from(cmd.r#type).is_err() || cmd.r#type == CmdType::Unspecified as i32 {
        return Err(Error::ProtocolViolation(format!("unknown MsgCmd type {}", cmd.r#type)));
    }
    Ok(cmd)
}

/// Decode a typed inner payload out of a `MsgCmd`.
pub fn decode_payload<M: Message + Default>(cmd: &MsgCmd) -> Result<M, Error> {
    M::decode(cmd.payload.as_slice()).map_err(|e| Error::ProtocolViolation(e.to_string()))
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;
