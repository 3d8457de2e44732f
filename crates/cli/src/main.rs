use std::process::ExitCode;

fn main() -> ExitCode {
    staffflow_cli::run()
}
