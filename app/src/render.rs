use alloy_primitives::U256;
use tc_engine::FaucetBalance;
use tc_engine_core::{
    math::{format_units, shorten_address},
    AccountContext, PositionView, Vault, VaultDetails, DEFAULT_DECIMALS,
};

const NOT_AVAILABLE: &str = "n/a";

fn amount(value: Option<U256>, decimals: u8, dp: u32) -> String {
    value
        .map(|v| format_units(v, decimals, dp))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn usd(value: Option<U256>) -> String {
    format!("${}", amount(value, DEFAULT_DECIMALS, 2))
}

pub fn account_line(account: Option<&AccountContext>) -> String {
    match account {
        Some(acct) => format!(
            "wallet {} (chain {})",
            shorten_address(&acct.address),
            acct.chain_id
        ),
        None => "wallet not connected".to_string(),
    }
}

pub fn vault_row(vault: &Vault) -> String {
    format!(
        "#{:<3} {:<8} deposited {:>18}  value {:>16}  price {}",
        vault.id,
        vault.collateral.label(),
        amount(vault.total_deposited, vault.collateral.decimals, 4),
        usd(vault.total_value_usd()),
        usd(vault.unit_price_usd),
    )
}

pub fn vault_details(details: &VaultDetails, capacity: Option<U256>) -> Vec<String> {
    let token = &details.collateral;
    let mut lines = vec![
        format!("vault #{} {}", details.vault_id, token.label()),
        format!("  collateral   {}", token.address),
        format!("  price        {}", usd(details.unit_price_usd)),
    ];
    if let Some(acct) = &details.account {
        lines.push(format!(
            "  wallet       {} {}",
            amount(acct.wallet_balance, token.decimals, 4),
            token.label()
        ));
        lines.push(format!(
            "  deposited    {} {}",
            amount(acct.deposited, token.decimals, 4),
            token.label()
        ));
        lines.push(format!(
            "  can borrow   {} tcUSD",
            amount(acct.can_borrow, DEFAULT_DECIMALS, 2)
        ));
        lines.push(format!(
            "  wallet could borrow {} tcUSD",
            amount(capacity, DEFAULT_DECIMALS, 2)
        ));
    }
    lines
}

pub fn position_row(view: &PositionView) -> String {
    let p = &view.position;
    format!(
        "position #{:<4} vault #{:<3} collateral {} {}  borrowed {} tcUSD  health {}",
        p.id,
        p.vault_id,
        format_units(p.amount_collateral, view.collateral_decimals, 2),
        view.collateral_symbol.as_deref().unwrap_or(NOT_AVAILABLE),
        format_units(p.amount_borrowed, DEFAULT_DECIMALS, 2),
        format_units(p.health_factor, DEFAULT_DECIMALS, 2),
    )
}

pub fn faucet_row(row: &FaucetBalance) -> String {
    format!(
        "{:<6} {:<14} balance {}",
        row.token.symbol,
        row.token.name,
        amount(row.balance, row.decimals, 4)
    )
}
