//! JSON output for CLI
//!
//! Every command result is one JSON object per line on stdout:
//! `{"status": "ok", "data": ...}` or `{"status": "error", "code", "message"}`.

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;
use crate::deploy::{DeployOutcome, Promotion};

/// Write a success line
pub fn write_response(out: &mut impl Write, data: Value) -> CliResult<()> {
    let response = json!({
        "status": "ok",
        "data": data
    });

    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}

/// Write an error line to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// One deployed function as reported by `deploy`
pub fn deploy_report(outcome: &DeployOutcome) -> Value {
    let alias = match &outcome.promotion {
        None => Value::Null,
        Some(Promotion::Created) => json!({ "action": "created" }),
        Some(Promotion::Unchanged) => json!({ "action": "unchanged" }),
        Some(Promotion::Moved { retired, deleted }) => json!({
            "action": "moved",
            "retired": retired,
            "deleted": deleted,
        }),
    };

    json!({
        "function": outcome.function,
        "remoteName": outcome.remote_name,
        "state": outcome.state.to_string(),
        "version": outcome.version,
        "alias": alias,
        "packageBytes": outcome.package_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployState;

    #[test]
    fn test_deploy_report() {
        let outcome = DeployOutcome {
            function: "ping".into(),
            remote_name: "shop-ping".into(),
            state: DeployState::Changed,
            version: Some("2".into()),
            promotion: Some(Promotion::Moved {
                retired: "1".into(),
                deleted: true,
            }),
            package_bytes: 120,
        };

        let mut out = Vec::new();
        write_response(&mut out, deploy_report(&outcome)).unwrap();
        let line: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(line["status"], "ok");
        assert_eq!(line["data"]["remoteName"], "shop-ping");
        assert_eq!(line["data"]["state"], "changed");
        assert_eq!(line["data"]["alias"]["retired"], "1");
        assert!(out.ends_with(b"\n"));
    }
}
