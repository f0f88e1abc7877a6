use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tostada::{
    Api, ApiBuilder, Extension, ExtensionError, Params, Request, Response, ServerConfig, Settings,
};
use tracing::info;

struct MessageCount(AtomicU64);

struct HelloExtension;

impl Extension for HelloExtension {
    fn name(&self) -> &str {
        "hello"
    }

    fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
        info!("Initializing Hello Extension");

        let greeting = settings
            .get_string("hello.greeting")?
            .unwrap_or_else(|| "Hello".to_string());
        let max_messages = settings.get_integer("hello.max_messages")?.unwrap_or(1000) as u64;
        info!("Custom greeting: {}", greeting);

        api.provide(MessageCount(AtomicU64::new(0)));
        let greeting = Arc::new(greeting);
        api.route("/hello/{name}")
            .methods(["get"])
            .to(move |req: Request, mut res: Response, params: Params| {
                let greeting = greeting.clone();
                async move {
                    let count = req.try_state::<MessageCount>()?;
                    let sent = count.0.fetch_add(1, Ordering::SeqCst) + 1;
                    if sent > max_messages {
                        return Err(tostada::HttpError::new(tostada::StatusCode::TOO_MANY_REQUESTS).into());
                    }
                    res.text(format!("{}, {}!", greeting, params.get("name").unwrap_or("world")));
                    Ok(res)
                }
            })?;

        info!("Extension initialized successfully");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Starting Hello Extension example");

    let api = ApiBuilder::new()
        .setting("hello.greeting", "Hello from Rust!")
        .setting("hello.max_messages", 1000i64)
        .extension(HelloExtension)
        .build()?;

    api.run(ServerConfig::new().port(1234)).await?;

    Ok(())
}
