//! Fetch command - send a request through the configured routes.

use anyhow::Result;
use cachet_types::{Method, Request, RequestMode};
use clap::Args;

use super::Context;
use crate::app::App;

/// Arguments for the fetch command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// URL to request
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Send the request this many times (later requests may hit the cache)
    #[arg(short, long, default_value = "1")]
    pub repeat: usize,

    /// Mark the request as a navigation
    #[arg(long)]
    pub navigate: bool,

    /// Print the response body
    #[arg(long)]
    pub body: bool,
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, ctx: &Context) -> Result<()> {
    let app = App::from_config(&ctx.config)?;
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())?;

    let mut request = Request::parse(method, &args.url)?;
    if args.navigate {
        request = request.with_mode(RequestMode::Navigate);
    }

    for attempt in 1..=args.repeat.max(1) {
        let outcome = app.fetch(request.clone()).await?;
        let response = &outcome.response;

        if ctx.json_output {
            let report = serde_json::json!({
                "attempt": attempt,
                "url": request.url().as_str(),
                "status": response.status(),
                "kind": format!("{:?}", response.kind()).to_lowercase(),
                "bytes": response.body().len(),
                "routed": outcome.routed,
            });
            println!("{report}");
        } else {
            println!(
                "#{attempt} {} {:?} {} bytes{}",
                response.status(),
                response.kind(),
                response.body().len(),
                if outcome.routed { "" } else { " (unrouted)" }
            );
        }

        if args.body {
            println!("{}", String::from_utf8_lossy(response.body()));
        }
    }

    Ok(())
}
