//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `cueboard_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    // Why: keep a tiny CLI probe to validate core crate wiring independently
    // from the browser shell build.
    println!("cueboard_core ping={}", cueboard_core::ping());
    println!("cueboard_core version={}", cueboard_core::core_version());
}
