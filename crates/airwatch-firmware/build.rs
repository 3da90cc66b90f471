//! Exports station credentials from `.env` as compile-time variables and
//! links the esp-hal memory layout.

const EXPORTED: [&str; 7] = [
    "AIRWATCH_WIFI_SSID",
    "AIRWATCH_WIFI_PASSWORD",
    "AIRWATCH_BROKER_HOST",
    "AIRWATCH_BROKER_PORT",
    "AIRWATCH_BROKER_USERNAME",
    "AIRWATCH_BROKER_PASSWORD",
    "AIRWATCH_DEVICE_ID",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for name in EXPORTED {
        println!("cargo:rerun-if-env-changed={name}");
    }

    // A missing `.env` is fine; the variables can come from the environment.
    let _ = dotenvy::dotenv();

    for name in EXPORTED {
        if let Ok(value) = std::env::var(name) {
            println!("cargo:rustc-env={name}={value}");
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
