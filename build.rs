fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto");

    // Bindings are only needed by the gRPC transport.
    if std::env::var_os("CARGO_FEATURE_TRANSPORT_GRPC").is_none() {
        return Ok(());
    }

    // Use the vendored protoc so builds do not depend on a system install.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/szconfig.proto",
                "proto/szconfigmanager.proto",
                "proto/szdiagnostic.proto",
                "proto/szengine.proto",
                "proto/szproduct.proto",
            ],
            &["proto/"],
        )?;
    Ok(())
}
