use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Archie, an AI assistant for your terminal", long_about = None)]
pub struct Args {
    /// Question to ask; omit together with --chat for interactive mode
    pub query: Option<String>,

    /// Start an interactive chat session
    #[arg(short, long)]
    pub chat: bool,

    /// Provider id to use for this run (overrides the configured primary)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model to use (overrides the configured text model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Attach a file to the message; repeatable
    #[arg(short, long, value_name = "PATH")]
    pub attach: Vec<PathBuf>,

    /// Answer with a single reply instead of the autonomous agent loop
    #[arg(long)]
    pub no_agent: bool,

    /// Skip tool loading for this run
    #[arg(long)]
    pub no_tools: bool,

    /// Verbose logging (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
