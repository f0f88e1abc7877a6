use serde_json::json;
use tostada::{
    ApiBuilder, Error, HttpError, MethodView, Params, Redirection, Request, Response, ServerConfig,
    Templates,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn greet(_req: Request, mut res: Response, params: Params) -> Result<Response, Error> {
    res.text(format!("Hello, {}!", params.get("person").unwrap_or_default()));
    Ok(res)
}

async fn fail(_req: Request, _res: Response, params: Params) -> Result<Response, Error> {
    let status: u16 = params.parse("status")?;
    Err(HttpError::from_u16(status)?.into())
}

async fn negate(_req: Request, mut res: Response, params: Params) -> Result<Response, Error> {
    let x: i64 = params.parse("x")?;
    res.media(&json!({ "result": -x }))?;
    Ok(res)
}

async fn no_content(_req: Request, mut res: Response, _params: Params) -> Result<Response, Error> {
    res.set_status(tostada::StatusCode::NO_CONTENT);
    Ok(res)
}

async fn add(_req: Request, mut res: Response, params: Params) -> Result<Response, Error> {
    let x: i64 = params.parse("x")?;
    let y: i64 = params.parse("y")?;
    res.media(&json!({ "result": x + y }))?;
    Ok(res)
}

async fn about(req: Request, mut res: Response, params: Params) -> Result<Response, Error> {
    let templates = req.try_state::<Templates>()?;
    let html = templates
        .render("about.html", &json!({ "who": params.get("who") }))
        .await?;
    res.html(html);
    Ok(res)
}

async fn home(req: Request, mut res: Response, _params: Params) -> Result<Response, Error> {
    let templates = req.try_state::<Templates>()?;
    res.html(templates.render("index.html", &json!({ "app": "tostada" })).await?);
    Ok(res)
}

async fn google(_req: Request, _res: Response, _params: Params) -> Result<Response, Error> {
    Err(Redirection::to_url("https://www.google.com").into())
}

async fn index(_req: Request, _res: Response, _params: Params) -> Result<Response, Error> {
    Err(Redirection::to_route("home", Params::new()).permanent().into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let api = ApiBuilder::new()
        .setting("static_root", "assets")
        .setting("templates_dir", concat!(env!("CARGO_MANIFEST_DIR"), "/demos/templates"))
        .build()?;

    api.route("/greet/{person}").methods(["post"]).to(greet)?;
    api.route("/fail/{status:d}").to(fail)?;
    api.route("/negation/{x:d}").to(negate)?;
    api.route("/no-content").to(no_content)?;
    api.route("/add/{x:d}/{y:d}").view(MethodView::new().get(add))?;
    api.route("/about/{who}").name("about").to(about)?;
    api.route("/google").to(google)?;
    api.route("/home").name("home").to(home)?;
    api.route("/").to(index)?;

    info!("Starting demo application with {} routes", api.routes().len());
    api.run(ServerConfig::new()).await?;
    Ok(())
}
