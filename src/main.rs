//! Binary entry point: parse arguments and run the headless worker.

mod cli;

use clap::Parser;
use cli::{Args, Command};
use heddle::build_info;
use heddle::ipc::{encode_response, run_stdio_with, IpcResponse, SessionFactory};
use heddle::session::create_session;

#[tokio::main]
async fn main() {
    heddle::logging::init();
    let args = Args::parse();

    if let Some(url) = args.base_url {
        std::env::set_var("HEDDLE_BASE_URL", url);
    }

    match args.command {
        Some(Command::Version) => {
            println!("{}", build_info::cli_version_text());
        }
        None | Some(Command::Worker) => {
            // A crash must still close the protocol: one error result line,
            // then exit code 1.
            std::panic::set_hook(Box::new(|info| {
                let line = encode_response(&IpcResponse::error_result(
                    "unknown",
                    info.to_string(),
                ));
                println!("{line}");
                std::process::exit(1);
            }));

            let model = args.model;
            let factory: SessionFactory = Box::new(move |mut setup| {
                if setup.model.is_none() {
                    setup.model = model.clone();
                }
                create_session(setup)
            });
            let code = run_stdio_with(factory).await;
            std::process::exit(code);
        }
    }
}
