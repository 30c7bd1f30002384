fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(
            &["proto/authz.proto", "proto/auth.proto", "proto/userdirectory.proto"],
            &["proto"],
        )?;
    Ok(())
}
