use std::path::PathBuf;

use prost::Message;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";
    let protos = [
        format!("{proto_root}/bob/v1/users.proto"),
        format!("{proto_root}/usermgmt/v2/withus.proto"),
    ];

    for proto in &protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    // Parse with protox so building does not need a system protoc
    let file_descriptors = protox::compile(&protos, [proto_root])?;
    let descriptor_path =
        PathBuf::from(std::env::var("OUT_DIR")?).join("roster_descriptor_set.bin");
    std::fs::write(&descriptor_path, file_descriptors.encode_to_vec())?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_path)
        .skip_protoc_run()
        .compile_protos(&protos, &[proto_root])?;
    Ok(())
}
