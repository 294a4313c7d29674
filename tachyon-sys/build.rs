//! Build script for tachyon-sys.
//!
//! The vendor ships no C header, only a shared library, so the declarations in
//! `src/lib.rs` are written by hand. This script only wires up linking, and
//! only when the `tachyon-sdk` feature is enabled so the workspace builds on
//! machines without the library.

fn main() {
    println!("cargo:rerun-if-env-changed=TACHYON_SDK_DIR");
    println!("cargo:rerun-if-env-changed=TACHYON_LIB_DIR");

    #[cfg(feature = "tachyon-sdk")]
    link_sdk();
}

#[cfg(feature = "tachyon-sdk")]
fn link_sdk() {
    use std::env;
    use std::path::PathBuf;

    // TACHYON_LIB_DIR overrides the default lib path
    let lib_dir = env::var("TACHYON_LIB_DIR")
        .or_else(|_| env::var("TACHYON_SDK_DIR"))
        .map(PathBuf::from);

    match lib_dir {
        Ok(dir) => {
            if !dir.exists() {
                // Libraries may still be installed globally.
                println!(
                    "cargo:warning=Tachyon SDK lib path does not exist: {}",
                    dir.display()
                );
            }
            println!("cargo:rustc-link-search=native={}", dir.display());
        }
        Err(_) => {
            println!(
                "cargo:warning=TACHYON_SDK_DIR not set; relying on the system library search path"
            );
        }
    }

    #[cfg(target_os = "windows")]
    println!("cargo:rustc-link-lib=dylib=Tachyon_acq");
    #[cfg(not(target_os = "windows"))]
    println!("cargo:rustc-link-lib=dylib=tachyon_acq");
}
