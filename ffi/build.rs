use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let out_dir = env::var("OUT_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));

    let generated = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("HABIT_FFI_H")
        .generate();

    match generated {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("habit_ffi.h"));
        }
        Err(e) => println!("cargo:warning=could not generate C header: {e}"),
    }
}
