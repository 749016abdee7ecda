use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod run;

use init::InitCommand;
use run::RunCommand;

pub const EXAMPLES: &str = r"
  # Initialize a node on the default network
  $ apiaryd --home data/node1 init

  # Initialize a node that joins through a bootstrap peer
  $ apiaryd --home data/node2 init --swarm-port 1644 --boot-nodes /ip4/127.0.0.1/tcp/1634/p2p/<peer-id>

  # Run a node
  $ apiaryd --home data/node1 run
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  APIARY_HOME    Directory for config and data\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "up")]
    Run(RunCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config and data
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_node_dir())]
    #[arg(env = "APIARY_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(self.args),
            SubCommands::Run(run) => run.run(self.args).await,
        }
    }
}
