use cvescout::application::{Application, Args};

use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;
use std::process;

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Unable to initialize the logger: {}", e);
    }

    let application = match Application::new(args.into_config()) {
        Ok(application) => application,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Invalid configuration: {}. Use cvescout --help", e);
            process::exit(1);
        }
    };

    if let Err(e) = application.run() {
        error!("Unable to run: {}", e);
        process::exit(1);
    }
}
