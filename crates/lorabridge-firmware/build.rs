//! Bakes fallback Wi-Fi credentials from `.env` into the binary

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    // A missing `.env` just means no compiled-in credentials
    let _ = dotenvy::dotenv();
    for key in ["WIFI_SSID", "WIFI_PASSWORD"] {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_default();
        println!("cargo:rustc-env={key}={value}");
    }
}
