use std::fs;
use std::path::Path;

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir");
    let workspace_root = Path::new(&manifest_dir)
        .ancestors()
        .nth(2)
        .expect("crate lives under <root>/crates");
    let version_file = workspace_root.join("VERSION");
    println!("cargo:rerun-if-changed={}", version_file.display());

    let version = fs::read_to_string(&version_file).expect("read VERSION file");
    let version = version.trim();
    assert!(!version.is_empty(), "VERSION must not be blank");
    println!("cargo:rustc-env=CUSTOS_VERSION={version}");
}
