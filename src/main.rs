mod cli;

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "unmpy",
    version,
    about = "Decompile MicroPython .mpy modules back to Python source"
)]
struct Cli {
    /// Directory containing compiled .mpy modules
    input_dir: PathBuf,
    /// Directory for the .s and .py outputs
    output_dir: PathBuf,
    /// Path to the micropython binary used for disassembly
    #[arg(long, default_value = "./micropython/micropython")]
    vm: PathBuf,
    /// Process modules one at a time instead of in parallel
    #[arg(long)]
    sequential: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    cli::cmd_decompile(cli::DecompileOptions {
        input_dir: cli.input_dir,
        output_dir: cli.output_dir,
        vm: cli.vm,
        sequential: cli.sequential,
    });
}
