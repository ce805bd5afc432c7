//! `fbws call <subsys> <cmd> [--args JSON]`: one remote request.
//!
//! Prints the reply as JSON. Exits non-zero unless the status is SUCCESS.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use fbws_core::messages::RspCode;

use crate::config::Settings;

/// Parse the `--args` flag. Absent means `{}`.
pub fn parse_args(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object");
    }
    Ok(value)
}

pub async fn run(settings: &Settings, subsys: &str, cmd: &str, args: Option<&str>) -> Result<()> {
    let args = parse_args(args)?;

    let (client, _events) = super::connect(settings).await?;
    info!(subsys, cmd, "calling");

    let reply = client.send(subsys, cmd, args)?.await;
    client.close();
    let reply = reply?;

    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply.status != RspCode::Success {
        bail!("{subsys}.{cmd} returned {:?}", reply.status);
    }
    Ok(())
}
