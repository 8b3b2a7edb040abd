use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build,
    /// Run the workspace tests
    Test,
    /// Run the loader, forwarding any extra arguments
    Load {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Convert a raw microcode dump to Intel HEX
    Extract {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn cargo(args: &[&str], extra: &[String]) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(args);
    if !extra.is_empty() {
        cmd.arg("--").args(extra);
    }
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building workspace...");
            cargo(&["build", "--workspace"], &[])?;
        }
        Commands::Test => {
            println!("Testing workspace...");
            cargo(&["test", "--workspace"], &[])?;
        }
        Commands::Load { args } => {
            cargo(&["run", "-p", "r5u87x-cli"], args)?;
        }
        Commands::Extract { args } => {
            cargo(&["run", "-p", "r5u87x-extract"], args)?;
        }
    }

    Ok(())
}
