use clap::Args;
use reqwest::Method;
use serde_json::{json, Value};

use crate::cli::config::build_dispatcher;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::error::DispatchError;
use crate::request::RequestDescriptor;

#[derive(Args)]
pub struct RequestArgs {
    #[arg(help = "Service name (lms, dm, axd)")]
    pub service: String,
    #[arg(help = "HTTP method")]
    pub method: String,
    #[arg(help = "Path relative to the service base URL")]
    pub path: String,
    #[arg(long, help = "JSON request body")]
    pub body: Option<String>,
    #[arg(long = "query", help = "Query parameter as key=value (repeatable)")]
    pub query: Vec<String>,
    #[arg(long = "header", help = "Extra header as name=value (repeatable)")]
    pub header: Vec<String>,
    #[arg(long, help = "Send without credentials")]
    pub skip_auth: bool,
}

impl RequestArgs {
    pub fn to_descriptor(&self) -> anyhow::Result<RequestDescriptor> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow::anyhow!("Invalid HTTP method '{}'", self.method))?;

        let mut descriptor = RequestDescriptor::new(method, self.service.as_str(), self.path.clone());

        if let Some(body) = &self.body {
            let value: Value = serde_json::from_str(body)
                .map_err(|e| anyhow::anyhow!("Body is not valid JSON: {}", e))?;
            descriptor = descriptor.json_body(value);
        }
        for raw in &self.query {
            let (key, value) = parse_key_value(raw)?;
            descriptor = descriptor.query(key, value);
        }
        for raw in &self.header {
            let (name, value) = parse_key_value(raw)?;
            descriptor = descriptor.header(name, value);
        }
        if self.skip_auth {
            descriptor = descriptor.skip_auth();
        }

        Ok(descriptor)
    }
}

pub async fn handle(args: RequestArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let descriptor = args.to_descriptor()?;
    let dispatcher = build_dispatcher()?;

    tracing::info!("{} {} via {}", descriptor.method, descriptor.path, descriptor.service);

    match dispatcher.execute::<Value>(descriptor).await {
        Ok(response) => output_value(&output_format, &json!({ "data": response.data })),
        Err(err @ (DispatchError::Normalized(_) | DispatchError::Passthrough(_))) => {
            output_value(&output_format, &err.to_json())?;
            Err(anyhow::anyhow!("request failed: {}", err))
        }
        Err(err) => Err(err.into()),
    }
}
