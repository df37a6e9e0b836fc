use std::process::ExitCode;

fn main() -> ExitCode {
    listing_cli::run()
}
