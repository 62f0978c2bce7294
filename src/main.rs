use clap::{Parser, Subcommand};

use gpu_graph::config::StartupParams;
use gpu_graph::panel::PanelArgs;
use gpu_graph::{graph, logging, panel};

#[derive(Parser)]
#[command(name = "gpu-graph")]
#[command(about = "GPU monitor panel with a rolling graph window")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the GPU and show the docked panel (g: graph, c: close, r: reload, q: quit)
    Panel(PanelArgs),

    /// Graph window fed with records on stdin; normally started by the panel
    Graph(StartupParams),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Panel(args) => {
            logging::init(args.log_file.as_deref())?;
            panel::run(args).await
        }
        Commands::Graph(params) => {
            logging::init(params.log_file.as_deref())?;
            graph::run(params).await
        }
    }
}
