//! Minimal kvist demo: a controller tree with actions, verbs and a session.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/hello              → Hello, world!
//!   curl http://localhost:3000/hello/Ann          → Hello, Ann!
//!   curl http://localhost:3000/users              → GET endpoint
//!   curl -X POST http://localhost:3000/users      → self-endpoint, any other verb
//!   curl http://localhost:3000/users/show/42      → user 42
//!   curl http://localhost:3000/users/show/abc     → 404 (not an int)
//!   curl -c jar -b jar http://localhost:3000/login/ann
//!   curl -c jar -b jar http://localhost:3000/me

use http::StatusCode;
use kvist::middleware::session::{Identity, Login, LoginMiddleware};
use kvist::middleware::trace::Trace;
use kvist::{Action, App, Args, Controller, Param, Request, Response, Server, Verb};

#[derive(Clone)]
struct User {
    name: String,
}

impl Identity for User {
    fn id(&self) -> String { self.name.clone() }
}

#[tokio::main]
async fn main() -> Result<(), kvist::Error> {
    tracing_subscriber::fmt::init();

    let users = Controller::with_endpoint(Action::new(any_users));
    users.set_verb(Verb::Get, Action::new(list_users))?;
    users.add_action("show", Action::new(show_user).param(Param::new::<i64>("id")))?;

    let root = Controller::with_endpoint(Action::new(index));
    root.add_action("hello", Action::new(hello).param(Param::raw("name").or("world")))?;
    root.add_action("login", Action::new(login).param(Param::raw("name")))?;
    root.add_action("me", Action::new(me))?;
    root.add_controller("users", users)?;

    let app = App::new(root)?;
    app.add_middleware(Trace)?;
    app.add_middleware(LoginMiddleware::with_loader(b"change me", |id: &str| {
        Some(User { name: id.to_owned() })
    }))?;

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// GET /
async fn index(_req: Request, _args: Args) -> Response {
    Response::html("<h1>kvist</h1>")
}

// GET /hello[/name]
async fn hello(_req: Request, args: Args) -> String {
    format!("Hello, {}!", args.str("name").unwrap_or_default())
}

// GET /users
async fn list_users(_req: Request, _args: Args) -> Response {
    Response::json(r#"[{"id":42,"name":"alice"}]"#)
}

// Every other verb on /users
async fn any_users(req: Request, _args: Args) -> (StatusCode, String) {
    (StatusCode::METHOD_NOT_ALLOWED, format!("{} /users is not supported", req.method()))
}

// GET /users/show/{id:int}
async fn show_user(_req: Request, args: Args) -> Response {
    let id = args.int("id").unwrap_or_default();
    Response::json(format!(r#"{{"id":{id},"name":"alice"}}"#))
}

// GET /login/{name}
async fn login(req: Request, args: Args) -> Response {
    let Some(login) = Login::<User>::from_request(&req) else {
        return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    };
    let name = args.str("name").unwrap_or_default().to_owned();
    login.login_user(&User { name }, &req);
    Response::status(StatusCode::NO_CONTENT)
}

// GET /me
async fn me(req: Request, _args: Args) -> (StatusCode, String) {
    match Login::<User>::from_request(&req).and_then(|login| login.user(&req)) {
        Some(user) => (StatusCode::OK, user.name),
        None => (StatusCode::UNAUTHORIZED, "not logged in".to_owned()),
    }
}
