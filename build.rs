fn main() {
    let build_date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    println!("cargo:rustc-env=BUILD_DATE={}", build_date);

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=GIT_SHA={}", git_sha);
    println!("cargo:rerun-if-env-changed=GIT_SHA");
}
