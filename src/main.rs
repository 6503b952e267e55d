use clap::Parser;
use exec_gateway::{init_logging, ExecutionGateway, ExecutionRequest, GatewayConfig};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;

/// Exit status when the gateway cannot start.
const SETUP_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "exec-gateway", version)]
#[command(about = "Run one allow-listed command inside a sandbox directory")]
struct Cli {
    /// Sandbox root; must exist
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Working directory, relative to the sandbox root or absolute
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Environment override (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Timeout in milliseconds (clamped to the configured maximum)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Add a command to the allow-list before running (repeatable)
    #[arg(long, value_name = "NAME")]
    allow: Vec<String>,

    /// Remove a command from the allow-list before running (repeatable)
    #[arg(long, value_name = "NAME")]
    disallow: Vec<String>,

    /// Print the allowed commands and exit
    #[arg(long)]
    list: bool,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Keep the variables whose key and value are both valid UTF-8.
fn utf8_environment<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                warn!(key = %key, "skipping environment variable with non-UTF-8 value");
                None
            }
            (Err(key), _) => {
                warn!(key = ?key, "skipping environment variable with non-UTF-8 name");
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_json) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let config = match &cli.config {
        Some(path) => match GatewayConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(SETUP_FAILURE);
            }
        },
        None => GatewayConfig::default(),
    };

    // The host process environment stands in for the externally prepared base environment.
    let base_env = utf8_environment(std::env::vars_os());

    let gateway = match ExecutionGateway::from_config(&cli.base_dir, base_env, &config) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(SETUP_FAILURE);
        }
    };

    for name in cli.allow {
        gateway.allow(name);
    }
    for name in &cli.disallow {
        gateway.disallow(name);
    }

    if cli.list {
        for name in gateway.allowed_commands() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let mut argv = cli.command.into_iter();
    let mut request = ExecutionRequest::new(argv.next().unwrap_or_default(), argv)
        .with_env(cli.env.into_iter().collect());
    if let Some(cwd) = cli.cwd {
        request = request.with_cwd(cwd);
    }
    if let Some(ms) = cli.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = gateway.execute_with_cancel(request, interrupted).await;
    let code = u8::try_from(result.exit_code).unwrap_or(1);

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: failed to serialize result: {e}"),
        }
    } else {
        match result.into_reply() {
            Ok(stdout) => print!("{stdout}"),
            Err(message) => eprintln!("{}", message.trim_end()),
        }
    }

    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("A=1"),
            Ok(("A".to_string(), "1".to_string()))
        );
        assert_eq!(
            parse_env_pair("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(parse_env_pair("A="), Ok(("A".to_string(), String::new())));
        assert!(parse_env_pair("=1").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn test_utf8_environment_skips_invalid() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("PATH"), OsString::from("/usr/bin")),
            (OsString::from("BADVAR"), OsString::from_vec(vec![0xff])),
            (OsString::from_vec(vec![b'K', 0xfe]), OsString::from("v")),
        ];
        let env = utf8_environment(vars);
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("PATH"), Some(&"/usr/bin".to_string()));
        assert!(!env.contains_key("BADVAR"));
    }

    #[test]
    fn test_cli_trailing_command() {
        let cli = Cli::try_parse_from([
            "exec-gateway",
            "--base-dir",
            "/tmp",
            "--env",
            "X=1",
            "git",
            "log",
            "--oneline",
        ])
        .unwrap();
        assert_eq!(cli.base_dir, PathBuf::from("/tmp"));
        assert_eq!(cli.env, vec![("X".to_string(), "1".to_string())]);
        assert_eq!(cli.command, vec!["git", "log", "--oneline"]);
    }
}
