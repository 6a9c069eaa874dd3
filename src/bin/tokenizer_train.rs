use clap::Parser;
use clap::error::ErrorKind;

use nbctl::runner::SystemRunner;
use nbctl::train::{self, TrainArgs};

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    // try_parse so bad arguments exit 1; help and version stay exit 0.
    let args = match TrainArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    match train::run(&args, &SystemRunner) {
        Ok(0) => {}
        Ok(code) => {
            eprintln!("spm_train exited with status {code}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{:#}", anyhow::Error::new(e));
            std::process::exit(1);
        }
    }
}
