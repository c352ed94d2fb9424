use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rcuprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rcuprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RCUPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "header_formats: {}",
        rcuprims_frame::FORMATS
            .iter()
            .map(|format| format.version.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("router_protocol: {}", rcuprims_router::PROTOCOL_VERSION);
    println!("device_backend: {}", cfg!(unix));

    Ok(SUCCESS)
}
