//! Emit the C header for the bridge surface.
//!
//! Run with `cargo run -p tag-bridge-ffi --features generate-header`.

fn main() {
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set");
    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("TAG_BRIDGE_H")
        .with_cpp_compat(true)
        .generate()
        .expect("cbindgen configuration is valid")
        .write_to_file(format!("{crate_dir}/include/tag_bridge.h"));
}
