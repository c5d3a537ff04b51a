use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds only carry the target-independent library and its tests
    let target = env::var("TARGET").unwrap_or_default();
    if !target.contains("avr") {
        return;
    }

    println!("cargo:rustc-link-arg=-mmcu=atmega32u4");

    if env::var("CARGO_FEATURE_DEBUG").is_ok() {
        println!("cargo:warning=Diagnostic log enabled on USART1");
    }

    println!("cargo:warning=Building for ATmega32U4 at 16MHz");
}
