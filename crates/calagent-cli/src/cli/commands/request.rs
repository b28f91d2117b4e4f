//! Authenticated request command.

use anyhow::{Context, Result, anyhow};
use calagent_core::config::Config;
use calagent_core::session::RequestOptions;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};

use super::session_client;

pub struct RequestArgs<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub data: Option<&'a str>,
    pub headers: &'a [String],
}

pub async fn run(config: &Config, args: RequestArgs<'_>) -> Result<()> {
    let options = build_options(&args)?;
    let client = session_client(config)?;

    match client.initialize().await {
        Ok(Some(_)) => {}
        Ok(None) => anyhow::bail!("Not signed in. Run `calagent login`."),
        Err(err) if err.is_auth_expired() => {
            anyhow::bail!("Session expired. Run `calagent login` to sign in again.")
        }
        Err(err) => return Err(err).context("restore session"),
    }

    let method = options.method.clone();
    let value = client
        .authenticated_request(args.path, options)
        .await
        .with_context(|| format!("{method} {}", args.path))?;

    if !value.is_null() {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn build_options(args: &RequestArgs<'_>) -> Result<RequestOptions> {
    let method = Method::from_bytes(args.method.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;
    let mut options = RequestOptions::get().method(method);

    if let Some(data) = args.data {
        let body = serde_json::from_str(data).context("Invalid JSON body")?;
        options = options.json(body);
    }

    for raw in args.headers {
        let (name, value) = parse_header(raw)?;
        options = options.header(name, value);
    }
    Ok(options)
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header '{raw}', expected 'Name: value'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name in '{raw}'"))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid header value in '{raw}'"))?;
    Ok((name, value))
}
