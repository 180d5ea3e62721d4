//! lama-cleaner server
//!
//! Serves LaMa / LDM inpainting over HTTP for the lama-cleaner front-end,
//! optionally inside a desktop window.

#[cfg(feature = "cli")]
use lama_cleaner::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
