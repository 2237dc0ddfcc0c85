// Stamps the build time into the binary as PASSIVE_BUILD_TIME.
// A value already present in the environment (release pipelines) wins.

fn main() {
    println!("cargo:rerun-if-env-changed=PASSIVE_BUILD_TIME");

    let build_time = std::env::var("PASSIVE_BUILD_TIME")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

    println!("cargo:rustc-env=PASSIVE_BUILD_TIME={}", build_time);
}
