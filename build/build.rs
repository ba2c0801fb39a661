extern crate autocfg;

use autocfg::emit;
use rustc_version::{version_meta, Channel};

fn main() {
    // Set cfg flags depending on release channel.
    // `nightly` gates the `test`-crate benches under `benches/`.
    match version_meta().map(|meta| meta.channel) {
        Ok(Channel::Stable) => {
            println!("cargo:rustc-cfg=RUSTC_IS_STABLE");
        }
        Ok(Channel::Beta) => {
            println!("cargo:rustc-cfg=RUSTC_IS_BETA");
        }
        Ok(Channel::Nightly) => {
            emit("nightly");
            println!("cargo:rustc-cfg=RUSTC_IS_NIGHTLY");
        }
        Ok(Channel::Dev) => {
            println!("cargo:rustc-cfg=RUSTC_IS_DEV");
        }
        Err(e) => {
            println!("cargo:warning=unable to detect the rustc channel: {}", e);
        }
    }

    autocfg::rerun_path("build/build.rs");
}
