use std::env;
use std::path::PathBuf;

// ffmpeg-sys-next discovers FFmpeg through pkg-config everywhere except
// Windows, where it needs FFMPEG_DIR. Point vcpkg users at the right place.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=stillcut needs FFmpeg development libraries; set FFMPEG_DIR (or VCPKG_ROOT) before building on Windows."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);

    if candidate.exists() {
        println!(
            "cargo:warning=Found vcpkg FFmpeg at {}; export FFMPEG_DIR={} so ffmpeg-sys-next links against it.",
            candidate.display(),
            candidate.display(),
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist; install ffmpeg:{triplet} with vcpkg.",
            candidate.display(),
        );
    }
}
