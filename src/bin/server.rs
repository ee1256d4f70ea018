//! chatdesk HTTP server binary.
//! Run with: cargo run --bin chatdesk-server

use std::process::ExitCode;

use chatdesk::start_chatdesk;

fn main() -> ExitCode {
    start_chatdesk::run()
}
