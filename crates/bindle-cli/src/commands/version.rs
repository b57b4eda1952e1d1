//! `bindle version` command implementation.

use miette::Result;

/// Print version information.
pub fn run() -> Result<()> {
    println!("bindle {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
