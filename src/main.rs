use std::sync::Arc;

use clap::{CommandFactory, Parser};
use xrc::{init_logger, Cli, PlainReporter, Reporter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn reporter() -> Arc<dyn Reporter> {
    #[cfg(feature = "ui")]
    {
        if xrc::ui::supports_color() {
            return Arc::new(xrc::ui::ColorReporter::new());
        }
    }
    Arc::new(PlainReporter)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.is_empty() {
        #[cfg(feature = "ui")]
        xrc::ui::print_banner(VERSION);
        #[cfg(not(feature = "ui"))]
        println!("xrc {}", VERSION);

        let _ = Cli::command().print_help();
        return;
    }

    init_logger(cli.verbose);
    let reporter = reporter();
    if let Err(e) = xrc::run(cli, Arc::clone(&reporter)).await {
        reporter.probe_finished();
        reporter.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
