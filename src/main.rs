use clap::Parser;
use stratifyr::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
