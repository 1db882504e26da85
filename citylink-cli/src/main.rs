//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = citylink_cli::run() {
        eprintln!("citylink: {err}");
        std::process::exit(1);
    }
}
