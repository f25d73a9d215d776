fn main() {
    // ESP-IDF link/env output is only meaningful for firmware builds.
    // Host test builds (no `espidf` feature) need no build-script output.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
