#![forbid(unsafe_code)]

use std::env;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gaspump_auth::{sign_bytes_on_behalf, SignerKey};

const DEFAULT_KEY_ENV: &str = "OWNER_PRIVATE_KEY";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args(env::args())?;
    for line in run(&config, |name| env::var(name).ok())? {
        println!("{line}");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Sign { payload: String, key_env: String },
    Generate { print_private: bool },
}

fn run<F>(command: &Command, lookup: F) -> anyhow::Result<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    match command {
        Command::Sign { payload, key_env } => {
            let payload = STANDARD
                .decode(payload.trim())
                .map_err(|error| anyhow::anyhow!("--payload is not valid base64: {error}"))?;
            let raw_key = lookup(key_env)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key_env} is not set"))?;
            let key = SignerKey::from_hex(raw_key.trim())
                .map_err(|error| anyhow::anyhow!("invalid private key in {key_env}: {error}"))?;

            let signed = sign_bytes_on_behalf(&payload, &key)?;
            tracing::info!(owner = %key.owner_id(), bytes = payload.len(), "payload signed");
            Ok(vec![
                format!("public_key_hex={}", hex::encode(&signed.public_key)),
                format!("signature_base64={}", STANDARD.encode(&signed.signature)),
            ])
        }
        Command::Generate { print_private } => {
            let key = SignerKey::generate();
            let mut lines = vec![
                "Generated owner key pair".to_owned(),
                format!("public_key_hex={}", hex::encode(key.public_key_bytes())),
                format!("owner_id={}", key.owner_id()),
            ];
            if *print_private {
                lines.push(format!("private_key_hex={}", key.to_hex()));
            } else {
                lines.push("private_key_hex=<hidden> (pass --print-private to show)".to_owned());
            }
            Ok(lines)
        }
    }
}

fn parse_args<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut payload = None;
    let mut key_env = None;
    let mut generate = false;
    let mut print_private = false;

    let mut iter = args.into_iter();
    let _program = iter.next();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--payload" => {
                let Some(value) = iter.next() else {
                    return Err(anyhow::anyhow!("--payload requires a value"));
                };
                payload = Some(value);
            }
            "--key-env" => {
                let Some(value) = iter.next() else {
                    return Err(anyhow::anyhow!("--key-env requires a value"));
                };
                key_env = Some(value);
            }
            "--generate" => {
                generate = true;
            }
            "--print-private" => {
                print_private = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            unknown => {
                return Err(anyhow::anyhow!("unknown argument {unknown:?}"));
            }
        }
    }

    match (generate, payload) {
        (true, Some(_)) => Err(anyhow::anyhow!(
            "--generate cannot be combined with --payload"
        )),
        (true, None) => Ok(Command::Generate { print_private }),
        (false, Some(payload)) => Ok(Command::Sign {
            payload,
            key_env: key_env.unwrap_or_else(|| DEFAULT_KEY_ENV.to_owned()),
        }),
        (false, None) => Err(anyhow::anyhow!("--payload or --generate is required")),
    }
}

fn print_usage() {
    println!("Usage: gaspump-owner-sign --payload <base64> [--key-env <NAME>]");
    println!("       gaspump-owner-sign --generate [--print-private]");
    println!("  --payload: canonical token bytes received from the gateway");
    println!("  --key-env: variable holding the hex P-256 private key (default: OWNER_PRIVATE_KEY)");
    println!("  --generate: create a new owner key pair");
    println!("  --print-private: include the private key in --generate output");
}
