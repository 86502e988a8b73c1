use std::process::ExitCode;

fn main() -> ExitCode {
    interop_rs::run_cli()
}
