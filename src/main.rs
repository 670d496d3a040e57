use clap::Parser;

use mezzo::cli::Cli;
use mezzo::driver;

fn main() {
    let cli = Cli::parse();
    let code = driver::run(&cli.into_options());
    std::process::exit(code);
}
