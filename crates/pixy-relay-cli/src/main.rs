use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pixy_relay_cli::{AggregateOptions, ConvertOptions, RelayConfig, Route};

#[derive(Parser, Debug)]
#[command(name = "pixy-relay", version, about = "pixy protocol relay")]
struct Cli {
    #[arg(long, global = true)]
    conf_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: RelayCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum RelayCommand {
    /// Stream a captured upstream through one adapter, writing SSE frames.
    Convert(ConvertArgs),
    /// Convert one complete response or request object.
    Aggregate(AggregateArgs),
    /// Rebuild the final response from an item-event capture.
    Replay(InputArgs),
    Harmony(HarmonyArgs),
}

#[derive(Args, Debug, Clone)]
struct ConvertArgs {
    #[arg(long, value_enum)]
    route: Route,
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct AggregateArgs {
    #[arg(long, value_enum)]
    route: Route,
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    #[arg(long)]
    input: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct HarmonyArgs {
    #[command(subcommand)]
    command: HarmonySubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum HarmonySubcommand {
    Parse(InputArgs),
    Format(HarmonyFormatArgs),
}

#[derive(Args, Debug, Clone)]
struct HarmonyFormatArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    partial: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let conf_dir = pixy_relay_cli::resolve_conf_dir(cli.conf_dir.as_deref());
    let config: RelayConfig =
        pixy_relay_cli::load_relay_config(&conf_dir).map_err(|error| error.to_string())?;
    pixy_relay_cli::init_tracing(&config.log);

    match cli.command {
        RelayCommand::Convert(args) => {
            pixy_relay_cli::run_convert(
                ConvertOptions {
                    route: args.route,
                    input: args.input,
                    output: args.output,
                    model: args.model,
                },
                &config.model,
            )
            .await
        }
        RelayCommand::Aggregate(args) => {
            pixy_relay_cli::run_aggregate(
                AggregateOptions {
                    route: args.route,
                    input: args.input,
                    model: args.model,
                },
                &config.model,
            )
            .await
        }
        RelayCommand::Replay(args) => pixy_relay_cli::run_replay(&args.input).await,
        RelayCommand::Harmony(args) => match args.command {
            HarmonySubcommand::Parse(args) => pixy_relay_cli::run_harmony_parse(&args.input).await,
            HarmonySubcommand::Format(args) => {
                pixy_relay_cli::run_harmony_format(&args.input, args.partial).await
            }
        },
    }
}
