use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tc_engine_core::{PositionId, VaultId};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

pub const USAGE: &str = "usage: tc [--config PATH] <command>
commands:
  vaults                               list vaults
  vault <id>                           vault details for the connected wallet
  deposit <id> <amount>                approve and deposit collateral
  borrow <id> <collateral> <amount>    open a position borrowing tcUSD
  positions                            open positions of the connected wallet
  cancel <position-id>                 cancel a position
  faucet [symbol]                      test-token balances, or claim one";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Vaults,
    Vault {
        vault_id: VaultId,
    },
    /// Amounts stay as typed until the collateral decimals are known.
    Deposit {
        vault_id: VaultId,
        amount: String,
    },
    Borrow {
        vault_id: VaultId,
        collateral: String,
        amount: String,
    },
    Positions,
    Cancel {
        position_id: PositionId,
    },
    Faucet {
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config: PathBuf,
    pub command: Command,
}

fn id_arg(value: Option<String>, what: &str) -> Result<u64> {
    let raw = value.ok_or_else(|| anyhow!("missing {}\n{}", what, USAGE))?;
    raw.parse::<u64>()
        .with_context(|| format!("{} must be a non-negative integer: {}", what, raw))
}

fn text_arg(value: Option<String>, what: &str) -> Result<String> {
    value.ok_or_else(|| anyhow!("missing {}\n{}", what, USAGE))
}

impl Args {
    /// Parses the arguments after the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut it = args.into_iter().peekable();
        let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
        if it.peek().map(String::as_str) == Some("--config") {
            it.next();
            config = PathBuf::from(text_arg(it.next(), "config path")?);
        }
        let name = text_arg(it.next(), "command")?;
        let command = match name.as_str() {
            "vaults" => Command::Vaults,
            "vault" => Command::Vault {
                vault_id: id_arg(it.next(), "vault id")?,
            },
            "deposit" => Command::Deposit {
                vault_id: id_arg(it.next(), "vault id")?,
                amount: text_arg(it.next(), "amount")?,
            },
            "borrow" => Command::Borrow {
                vault_id: id_arg(it.next(), "vault id")?,
                collateral: text_arg(it.next(), "collateral amount")?,
                amount: text_arg(it.next(), "borrow amount")?,
            },
            "positions" => Command::Positions,
            "cancel" => Command::Cancel {
                position_id: id_arg(it.next(), "position id")?,
            },
            "faucet" => Command::Faucet { symbol: it.next() },
            other => bail!("unknown command '{}'\n{}", other, USAGE),
        };
        if let Some(extra) = it.next() {
            bail!("unexpected argument '{}'\n{}", extra, USAGE);
        }
        Ok(Self { config, command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Args> {
        Args::parse(line.split_whitespace().map(str::to_string))
    }

    #[test]
    fn commands_parse() {
        assert_eq!(parse("vaults").unwrap().command, Command::Vaults);
        assert_eq!(
            parse("borrow 1 0.5 250").unwrap().command,
            Command::Borrow {
                vault_id: 1,
                collateral: "0.5".into(),
                amount: "250".into()
            }
        );
        assert_eq!(
            parse("faucet").unwrap().command,
            Command::Faucet { symbol: None }
        );
    }

    #[test]
    fn config_flag_comes_first() {
        let args = parse("--config /etc/tc.json cancel 7").unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/tc.json"));
        assert_eq!(args.command, Command::Cancel { position_id: 7 });
        assert_eq!(parse("positions").unwrap().config, PathBuf::from("config.json"));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse("").is_err());
        assert!(parse("deposit 1").is_err());
        assert!(parse("vault -1").is_err());
        assert!(parse("positions now").is_err());
        assert!(parse("withdraw 1").is_err());
    }
}
