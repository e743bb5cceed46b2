//! Build script for shunt-layer
//!
//! Compiles the variadic `open` entry point used by the Darwin interpose
//! table. Linux receives the mode in a register either way, so the Rust
//! definitions suffice there.

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "macos" {
        println!("cargo:rerun-if-changed=src/c/variadic_open.c");

        cc::Build::new()
            .file("src/c/variadic_open.c")
            .opt_level(2)
            .compile("shunt_variadic_open");
    }
}
