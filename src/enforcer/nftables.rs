//! nftables engine with systemd persistence.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use super::FirewallEngine;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput, RealCommandExecutor};
use crate::config::EngineConfig;
use crate::error::AsnwallError;

/// Loads rulesets with `nft -f`, persists them via `systemctl enable --now`
pub struct NftablesEngine<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
    nft: String,
    systemctl: String,
    service: String,
}

impl NftablesEngine<RealCommandExecutor> {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_executor(RealCommandExecutor::new(), config)
    }
}

impl<E: CommandExecutor> NftablesEngine<E> {
    pub fn with_executor(executor: E, config: &EngineConfig) -> Self {
        Self {
            executor,
            nft: config.nft.clone(),
            systemctl: config.systemctl.clone(),
            service: config.service.clone(),
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));
        self.executor
            .execute(program, &args_to_strings(args))
            .with_context(|| format!("Failed to run {}", program))
    }
}

fn describe(program: &str, args: &[&str]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

impl<E: CommandExecutor> FirewallEngine for NftablesEngine<E> {
    fn load(&self, path: &Path) -> Result<()> {
        let file = path.to_string_lossy();
        let args = ["-f", &*file];
        let output = self.run(&self.nft, &args)?;

        if !output.success {
            return Err(AsnwallError::RulesetLoad {
                command: describe(&self.nft, &args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        let args = ["enable", "--now", self.service.as_str()];
        let output = self.run(&self.systemctl, &args)?;

        if !output.success {
            anyhow::bail!(
                "{} failed (exit code {:?}): {}",
                describe(&self.systemctl, &args),
                output.code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    fn verify(&self) -> Result<String> {
        let args = ["list", "ruleset"];
        let output = self.run(&self.nft, &args)?;

        if !output.success {
            anyhow::bail!(
                "{} failed (exit code {:?}): {}",
                describe(&self.nft, &args),
                output.code,
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }
}
