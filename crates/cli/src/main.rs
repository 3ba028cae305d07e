use std::process::ExitCode;

fn main() -> ExitCode {
    cartkeeper_cli::run()
}
