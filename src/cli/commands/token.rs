use clap::Subcommand;
use serde_json::json;

use crate::auth::AuthScheme;
use crate::cli::config::open_store;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::service::LogicalService;
use crate::store::{CredentialStore, CredentialStoreExt, StoredCredential};

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Store a token for a service")]
    Set {
        #[arg(help = "Service name (lms, dm, axd)")]
        service: String,
        #[arg(help = "Token value")]
        token: String,
        #[arg(long, help = "Authorization scheme (JWT, Bearer, Token); inferred when omitted")]
        scheme: Option<AuthScheme>,
    },

    #[command(about = "Show the stored token for a service (masked)")]
    Show {
        #[arg(help = "Service name")]
        service: String,
    },

    #[command(about = "Remove the stored token for a service")]
    Remove {
        #[arg(help = "Service name")]
        service: String,
    },

    #[command(about = "List stored tokens")]
    List,
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store()?;

    match cmd {
        TokenCommands::Set { service, token, scheme } => {
            let service = LogicalService::from(service.as_str());
            if token.trim().is_empty() {
                return Err(anyhow::anyhow!("Token for {} must not be blank", service));
            }

            let credential = match scheme {
                Some(scheme) => StoredCredential::explicit(scheme, token),
                None => StoredCredential::raw(token),
            };
            store.set(service.token_key(), &credential).await?;
            tracing::info!("Stored token for {} under '{}'", service, service.token_key());

            output_success(
                &output_format,
                &format!("Token stored for service '{}'", service),
                Some(json!({ "service": service, "key": service.token_key() })),
            )
        }
        TokenCommands::Show { service } => {
            let service = LogicalService::from(service.as_str());
            let credential: Option<StoredCredential> = store.get(service.token_key()).await?;

            match credential {
                Some(credential) => {
                    let scheme = credential
                        .scheme()
                        .unwrap_or_else(|| AuthScheme::infer(&service, credential.token()));
                    let masked = mask_token(credential.token());
                    match output_format {
                        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({
                            "service": service,
                            "key": service.token_key(),
                            "scheme": scheme,
                            "explicit_scheme": credential.scheme().is_some(),
                            "token": masked,
                        }))?),
                        OutputFormat::Text => {
                            println!("Service: {}", service);
                            println!("Key: {}", service.token_key());
                            println!("Authorization: {} {}", scheme, masked);
                        }
                    }
                    Ok(())
                }
                None => output_error(
                    &output_format,
                    &format!("No token stored for service '{}'", service),
                    Some("TOKEN_NOT_FOUND"),
                ),
            }
        }
        TokenCommands::Remove { service } => {
            let service = LogicalService::from(service.as_str());
            store.remove_item(service.token_key()).await?;

            output_success(
                &output_format,
                &format!("Token removed for service '{}'", service),
                None,
            )
        }
        TokenCommands::List => {
            let entries = store.entries().await?;
            if entries.is_empty() {
                return output_empty_collection(&output_format, "tokens", "No tokens stored");
            }

            match output_format {
                OutputFormat::Json => {
                    let tokens: Vec<_> = entries
                        .keys()
                        .map(|key| json!({ "key": key }))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "tokens": tokens }))?);
                }
                OutputFormat::Text => {
                    println!("{:<20} {}", "KEY", "SERVICE");
                    println!("{}", "-".repeat(32));
                    for key in entries.keys() {
                        let owner = LogicalService::KNOWN
                            .iter()
                            .find(|s| s.token_key() == key)
                            .map(|s| s.name().to_string())
                            .unwrap_or_else(|| "-".to_string());
                        println!("{:<20} {}", key, owner);
                    }
                }
            }
            Ok(())
        }
    }
}
