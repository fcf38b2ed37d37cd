//! Shell completion generation command.

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::io::{self, Write};

/// Generate shell completions.
#[derive(Args, Debug)]
pub struct CmdCompletions {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CmdCompletions {
    /// Execute the completions command.
    pub fn run<C: CommandFactory>(&self) -> anyhow::Result<()> {
        self.write_to::<C>(&mut io::stdout())
    }

    fn write_to<C: CommandFactory>(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        let mut cmd = C::command();
        generate(self.shell, &mut cmd, "transcode", out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    #[command(name = "transcode")]
    struct TestCli {
        #[command(subcommand)]
        command: Option<TestCommands>,
    }

    #[derive(clap::Subcommand)]
    enum TestCommands {
        Faststart,
        Completions(CmdCompletions),
    }

    #[test]
    fn test_bash_completions() {
        let cmd = CmdCompletions { shell: Shell::Bash };
        let mut out = Vec::new();
        cmd.write_to::<TestCli>(&mut out).unwrap();
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("transcode"));
        assert!(script.contains("faststart"));
    }
}
