use std::env;

fn main() {
    // Version string shown by --version and sent as the HTTP user agent
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=PROBE_VERSION={}", version);

    // Allow overriding the libosrmc location baked into the default search list
    if let Ok(lib_path) = env::var("OSRMC_LIB_PATH") {
        println!("cargo:rustc-env=OSRMC_DEFAULT_PATH={}", lib_path);
    }
    println!("cargo:rerun-if-env-changed=OSRMC_LIB_PATH");

    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=Cargo.toml");
}
