use std::process::ExitCode;

fn main() -> ExitCode {
    vitalia_cli::run()
}
