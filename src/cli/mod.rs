//! CLI definition

use crate::agent::AgentKind;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Dispatch natural-language tasks to parallel coding agents", long_about = None)]
pub struct Cli {
    /// Directory agents work in (defaults to current directory)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Agent to run for each task (claude-code, amp, or any executable)
    #[arg(short, long, default_value = "claude-code")]
    pub agent: String,
}

impl Cli {
    pub fn agent_kind(&self) -> AgentKind {
        AgentKind::from_name(&self.agent)
    }
}
