//! Server list and status commands

use anyhow::Result;

use super::{print_error, print_success, Context};

/// Show the known servers and the one in use
pub async fn list(ctx: &Context, refresh: bool) -> Result<()> {
    let mut client = ctx.open()?;

    if refresh {
        println!("Refreshing server list...");
        client.refresh_servers().await;
    }

    let selected = client.select_server().await;
    let info = client.info();

    println!();
    println!("Known servers ({}):", info.full_servers.len());
    for server in &info.full_servers {
        let host_port = server.host_port();
        let marker = if selected.as_deref() == Some(host_port.as_str()) {
            "*"
        } else {
            " "
        };
        let load = server
            .load
            .map(|l| format!("{}%", l))
            .unwrap_or_else(|| "-".to_string());
        let height = server
            .height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{} {:<24} load {:>5}  height {}", marker, host_port, load, height);
    }
    println!();

    match selected {
        Some(server) => print_success(&format!("Using {}", server)),
        None => print_error("No server reachable"),
    }

    Ok(())
}

/// Show the status of the selected server
pub async fn status(ctx: &Context) -> Result<()> {
    let mut client = ctx.open()?;
    let status = client.status().await?;

    println!();
    if let Some(server) = client.current_server() {
        println!("Server:     {}", server);
    }
    for key in ["protocolversion", "walletversion", "blocks", "connections", "difficulty"] {
        if let Some(value) = status.fields.get(key) {
            println!("{:<11} {}", format!("{}:", key), value);
        }
    }
    println!("Uptime:     {}", status.uptime_human);
    println!("Clock drift: {:.2}s", status.time_drift);
    if let Some(extended) = &status.extended {
        println!();
        println!("{}", serde_json::to_string_pretty(extended)?);
    }
    println!();

    Ok(())
}
