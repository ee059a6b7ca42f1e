fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fall back to the bundled compiler when the host has no protoc.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let proto_dir = "proto";
    println!("cargo:rerun-if-changed={proto_dir}");
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile(&["proto/model_lifecycle.proto"], &[proto_dir])?;
    Ok(())
}
