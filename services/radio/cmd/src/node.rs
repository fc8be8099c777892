//! Node addressing on the command line.

use anyhow::{bail, Context, Result};
use radio_wire::BROADCAST_ADDR;

/// Parse a node given as `!a1b2c3d4`, `0xa1b2c3d4`, decimal, or `^all`
pub fn parse_node(input: &str) -> Result<u32> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty node address");
    }

    if input == "^all" || input.eq_ignore_ascii_case("all") {
        return Ok(BROADCAST_ADDR);
    }

    let hex = input
        .strip_prefix('!')
        .or_else(|| input.strip_prefix("0x"))
        .or_else(|| input.strip_prefix("0X"));

    match hex {
        Some(digits) => u32::from_str_radix(digits, 16)
            .with_context(|| format!("invalid hex node address {:?}", input)),
        None => input.parse::<u32>().with_context(|| {
            format!(
                "invalid node address {:?}, expected !hex, 0xhex, decimal or ^all",
                input
            )
        }),
    }
}
