use clap::Subcommand;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::config;
use crate::service::{LogicalService, ServiceRegistry};

#[derive(Subcommand)]
pub enum ServiceCommands {
    #[command(about = "List configured services with their base URLs")]
    List,

    #[command(about = "Show how a service name resolves")]
    Show {
        #[arg(help = "Service name")]
        name: String,
    },
}

pub async fn handle(cmd: ServiceCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let app_config = config::config();
    let registry = ServiceRegistry::new(&app_config.services);

    match cmd {
        ServiceCommands::List => {
            match output_format {
                OutputFormat::Json => {
                    let services: Vec<_> = LogicalService::KNOWN
                        .iter()
                        .map(|s| describe(&registry, s, &app_config.security.trusted_origin))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "environment": app_config.environment, "services": services }))?);
                }
                OutputFormat::Text => {
                    println!("Environment: {:?}", app_config.environment);
                    println!("{:<6} {:<16} {}", "NAME", "TOKEN KEY", "BASE URL");
                    println!("{}", "-".repeat(60));
                    for service in LogicalService::KNOWN.iter() {
                        let marker = if service == registry.default_service() { "*" } else { " " };
                        println!(
                            "{}{:<5} {:<16} {}",
                            marker,
                            service.name(),
                            service.token_key(),
                            registry.resolve_base_url(service)
                        );
                    }
                }
            }
            Ok(())
        }
        ServiceCommands::Show { name } => {
            let service = LogicalService::from(name.as_str());
            let details = describe(&registry, &service, &app_config.security.trusted_origin);

            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&details)?),
                OutputFormat::Text => {
                    println!("Service: {}", service);
                    if !service.is_known() {
                        println!("(unrecognized, falls back to {})", registry.default_service());
                    }
                    println!("Base URL: {}", registry.resolve_base_url(&service));
                    println!("Token key: {}", service.token_key());
                    if service.requires_origin_headers() {
                        println!("Origin: {}", app_config.security.trusted_origin);
                    }
                }
            }
            Ok(())
        }
    }
}

fn describe(registry: &ServiceRegistry, service: &LogicalService, origin: &str) -> serde_json::Value {
    let origin = service.requires_origin_headers().then_some(origin);
    json!({
        "name": service.name(),
        "known": service.is_known(),
        "base_url": registry.resolve_base_url(service),
        "token_key": service.token_key(),
        "origin": origin,
        "default": service == registry.default_service(),
    })
}
