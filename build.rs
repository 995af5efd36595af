/// tether build script.
///
/// Validates that the host target has one of the two shared-memory back-ends
/// (`platform::posix` or `platform::win32`).
fn main() {
    // Hard gate: fail loudly on a target with neither back-end rather than
    // producing a crate whose `platform` module is empty.
    let family = std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    let supported = family.split(',').any(|f| f == "unix" || f == "windows");
    if !supported {
        let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
        panic!(
            "tether needs a unix or windows target \
             (CARGO_CFG_TARGET_OS = {target_os:?}, CARGO_CFG_TARGET_FAMILY = {family:?})"
        );
    }

    // Only re-run the build script when it changes.
    println!("cargo:rerun-if-changed=build.rs");
}
