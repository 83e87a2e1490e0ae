//! `tools` subcommand: run a discovery handshake and print what it finds.

use std::error::Error;
use std::time::Duration;

use crate::core::config::Config;
use crate::mcp::discovery::discover_tools;
use crate::utils::url::call_address;

pub async fn run_tools(
    address: Option<String>,
    headers: Vec<String>,
    budget: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let address = super::resolve_address(address, &config)?;
    let call = call_address(&address);

    let mut connection = config.connection_config(&call);
    for header in &headers {
        let (name, value) = parse_header(header)
            .ok_or_else(|| format!("Invalid header '{header}', expected 'Name: value'"))?;
        connection.headers.push((name, value));
    }
    if let Some(secs) = budget {
        connection.session_budget = Duration::from_secs(secs);
    }

    let names = discover_tools(connection).await;
    if names.is_empty() {
        eprintln!("No tools advertised.");
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

pub(crate) fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}
