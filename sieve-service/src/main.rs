use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde::Serialize;
use sieve_common::bitcoin_utils::{parse_bitcoin_amount, parse_outpoint};
use sieve_common::config::ensure_config_exists;
use sieve_common::logging;
use sieve_service::UtxoService;
use std::env;
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const USAGE: &str = "\
Usage: sieve [--config <path>] <command> [args]

Commands:
  utxos <address>
  balance <address>
  stats <address>
  select <address> <amount> [--fee-rate <sat/byte>] [--strategy <tag>]
  multi-select <amount> <address>... [--fee-rate <sat/byte>] [--strategy <tag>]
  summary <address>...
  info
  shell

Shell-only commands (state lives for the session):
  spend <address> <txid:vout>...
  spend-tx <address> <txid>
  refresh <address>

Amounts are satoshis unless suffixed with 'btc'.";

/// One command with its flags
struct Command {
    name: String,
    fee_rate: Option<u64>,
    strategy: Option<String>,
    operands: Vec<String>,
}

impl Command {
    fn parse<I: Iterator<Item = String>>(mut tokens: I) -> Result<Self> {
        let mut fee_rate = None;
        let mut strategy = None;
        let mut positional = Vec::new();

        while let Some(token) = tokens.next() {
            match token.as_str() {
                "--fee-rate" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| anyhow!("--fee-rate needs a value"))?;
                    fee_rate = Some(value.parse().context("Invalid fee rate")?);
                }
                "--strategy" => {
                    let tag = tokens.next().ok_or_else(|| anyhow!("--strategy needs a tag"))?;
                    strategy = Some(tag);
                }
                _ => positional.push(token),
            }
        }

        if positional.is_empty() {
            bail!("Missing command\n\n{}", USAGE);
        }
        let name = positional.remove(0);
        Ok(Self {
            name,
            fee_rate,
            strategy,
            operands: positional,
        })
    }

    fn operand(&self, index: usize, name: &str) -> Result<String> {
        self.operands
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("{} requires <{}>", self.name, name))
    }

    fn changes_state(&self) -> bool {
        matches!(self.name.as_str(), "spend" | "spend-tx" | "refresh")
    }
}

/// Split the process arguments into the config path and the command tokens
fn parse_args() -> Result<(String, Vec<String>)> {
    let mut config = "sieve.toml".to_string();
    let mut rest = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => rest.push(arg),
        }
    }
    Ok((config, rest))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(service: &UtxoService, command: &Command) -> Result<()> {
    let strategy = command.strategy.as_deref();
    match command.name.as_str() {
        "utxos" => print(&service.utxos(&command.operand(0, "address")?).await?),
        "balance" => print(&service.balance(&command.operand(0, "address")?).await?),
        "stats" => print(&service.stats(&command.operand(0, "address")?).await?),
        "select" => {
            let address = command.operand(0, "address")?;
            let amount = parse_bitcoin_amount(&command.operand(1, "amount")?)?;
            let request = service.request(&address, amount, command.fee_rate, strategy)?;
            print(&service.select(request).await?)
        }
        "multi-select" => {
            let amount = parse_bitcoin_amount(&command.operand(0, "amount")?)?;
            let addresses = &command.operands[1..];
            if addresses.is_empty() {
                bail!("multi-select requires at least one <address>");
            }
            print(
                &service
                    .multi_select(addresses, amount, command.fee_rate, strategy)
                    .await?,
            )
        }
        "summary" => {
            if command.operands.is_empty() {
                bail!("summary requires at least one <address>");
            }
            print(&service.multi_summary(&command.operands).await?)
        }
        "spend" => {
            let address = command.operand(0, "address")?;
            let outpoints = command.operands[1..]
                .iter()
                .map(|s| parse_outpoint(s))
                .collect::<Result<Vec<_>, _>>()?;
            if outpoints.is_empty() {
                bail!("spend requires at least one <txid:vout>");
            }
            let spent = service.spend(&address, outpoints).await?;
            print(&serde_json::json!({ "address": address, "spent": spent }))
        }
        "spend-tx" => {
            let address = command.operand(0, "address")?;
            let txid = bitcoin::Txid::from_str(&command.operand(1, "txid")?)
                .context("Invalid txid")?;
            let spent = service.spend_txid(&address, txid).await?;
            print(&serde_json::json!({ "address": address, "spent": spent }))
        }
        "refresh" => print(&service.refresh(&command.operand(0, "address")?).await?),
        "info" => print(&service.info().await?),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

/// Read commands from stdin until EOF or `exit`, sharing one store
async fn shell(service: &UtxoService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    loop {
        stderr.write_all(b"sieve> ").await?;
        stderr.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                println!("{}", USAGE);
                continue;
            }
            _ => {}
        }

        let outcome = match Command::parse(line.split_whitespace().map(str::to_string)) {
            Ok(command) if command.name == "shell" => Err(anyhow!("Already in the shell")),
            Ok(command) => execute(service, &command).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!("Command '{}' failed: {:#}", line, e);
            eprintln!("error: {:#}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, tokens) = parse_args()?;
    let command = Command::parse(tokens.into_iter())?;

    let config = ensure_config_exists(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    logging::init(&config.logging).map_err(|e| anyhow!(e))?;

    let base_dir = Path::new(&config_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let service = UtxoService::from_config(config, &base_dir);
    info!("UTXO sieve {} starting", sieve_common::VERSION);
    service.preload().await;

    if command.name == "shell" {
        return shell(&service).await;
    }
    if command.changes_state() {
        bail!(
            "'{}' only changes this process's in-memory store; run it inside 'sieve shell'",
            command.name
        );
    }
    execute(&service, &command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command> {
        Command::parse(line.split_whitespace().map(str::to_string))
    }

    #[test]
    fn test_command_flags_anywhere() {
        let command = parse("select --fee-rate 3 bcrt1qtest1 0.001btc --strategy bnb").unwrap();
        assert_eq!(command.name, "select");
        assert_eq!(command.fee_rate, Some(3));
        assert_eq!(command.strategy.as_deref(), Some("bnb"));
        assert_eq!(command.operands, vec!["bcrt1qtest1", "0.001btc"]);
        assert!(command.operand(2, "extra").is_err());
    }

    #[test]
    fn test_command_errors() {
        assert!(parse("").is_err());
        assert!(parse("select --fee-rate").is_err());
        assert!(parse("select --fee-rate fast").is_err());
    }

    #[test]
    fn test_state_changing_commands() {
        for line in ["spend a b:0", "spend-tx a b", "refresh a"] {
            assert!(parse(line).unwrap().changes_state());
        }
        for line in ["utxos a", "balance a", "select a 1", "info", "shell"] {
            assert!(!parse(line).unwrap().changes_state());
        }
    }
}
