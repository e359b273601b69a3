//! Build script for usbtc08-sys.
//!
//! Only emits link directives when the `tc08-sdk` feature is enabled, so the
//! workspace builds and tests on machines without the Pico SDK installed.

fn main() {
    println!("cargo:rerun-if-env-changed=USBTC08_LIB_DIR");

    #[cfg(feature = "tc08-sdk")]
    link_vendor_library();
}

#[cfg(feature = "tc08-sdk")]
fn link_vendor_library() {
    if let Ok(dir) = std::env::var("USBTC08_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    } else {
        // Pico installs to /opt/picoscope on Linux and /Library/Frameworks on macOS
        let lib_paths = [
            "/opt/picoscope/lib",
            "/usr/local/lib",
            "/usr/lib",
            "/Library/Frameworks/PicoSDK.framework/Libraries/libusbtc08",
        ];

        for path in lib_paths {
            let dir = std::path::Path::new(path);
            if dir.join("libusbtc08.so").exists()
                || dir.join("libusbtc08.dylib").exists()
                || dir.join("usbtc08.lib").exists()
            {
                println!("cargo:rustc-link-search=native={}", path);
                break;
            }
        }
    }

    println!("cargo:rustc-link-lib=usbtc08");
}
