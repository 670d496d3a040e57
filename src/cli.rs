//! Command-line interface of the `mezzo` driver.

use clap::Parser;
use std::path::PathBuf;

/// The mezzo type-and-permission checker.
#[derive(Parser, Debug)]
#[command(name = "mezzo")]
#[command(about = "Check a mezzo module", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The module to check: an implementation (.mz) or interface (.mzi).
    pub file: PathBuf,

    /// Add a directory to the include path (searched left to right).
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Do not auto-include the core and pervasives modules.
    #[arg(long)]
    pub no_auto_include: bool,

    /// Debug verbosity; 0 is quiet.
    #[arg(long, value_name = "LEVEL", default_value_t = 0)]
    pub debug: u8,

    /// Render the failure derivation tree after a permission error.
    #[arg(long)]
    pub explain: bool,
}

impl Cli {
    pub fn into_options(self) -> crate::driver::Options {
        crate::driver::Options {
            file: self.file,
            include: self.include,
            auto_include: !self.no_auto_include,
            debug: self.debug,
            explain: self.explain,
        }
    }
}
