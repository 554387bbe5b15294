use std::process::ExitCode;

fn main() -> ExitCode {
    match patient_splits::apps::run_build_master_index(std::env::args().skip(1)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
