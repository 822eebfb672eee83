// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "../../proto/volary/v1/messages.proto",
                "../../proto/volary/v1/gateway.proto",
                "../../proto/volary/v1/state.proto",
            ],
            &["../../proto"],
        )?;
    Ok(())
}
