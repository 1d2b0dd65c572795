mod common;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::SET_COOKIE;
use kvist::middleware::session::{CookieOptions, Identity, Login, LoginMiddleware, Session, TokenStore};
use kvist::{Action, App, Args, Controller, Param, Request, Response};
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
struct User {
    name: String,
}

impl Identity for User {
    fn id(&self) -> String { self.name.clone() }
}

async fn login(req: Request, args: Args) -> StatusCode {
    let login = Login::<User>::from_request(&req).unwrap();
    login.login_user(&User { name: args.str("name").unwrap().to_owned() }, &req);
    StatusCode::NO_CONTENT
}

async fn logout(req: Request, _args: Args) -> StatusCode {
    Login::<User>::from_request(&req).unwrap().logout_user(&req);
    StatusCode::NO_CONTENT
}

async fn me(req: Request, _args: Args) -> Response {
    let login = Login::<User>::from_request(&req).unwrap();
    match login.user(&req) {
        Some(user) => Response::text(user.name),
        None => Response::status(StatusCode::UNAUTHORIZED),
    }
}

async fn visits(req: Request, _args: Args) -> String {
    let session = Session::from_request(&req).unwrap();
    let n = session.get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
    session.insert("visits", n);
    n.to_string()
}

fn tree() -> Arc<Controller> {
    let root = Controller::new();
    root.add_action("login", Action::new(login).param(Param::raw("name"))).unwrap();
    root.add_action("logout", Action::new(logout)).unwrap();
    root.add_action("me", Action::new(me)).unwrap();
    root.add_action("visits", Action::new(visits)).unwrap();
    root
}

fn with_cookie(path: &str, cookie: Option<&str>) -> Request {
    let mut req = http::Request::get(path);
    if let Some(cookie) = cookie {
        req = req.header("cookie", cookie);
    }
    req.body(Bytes::new()).unwrap().into()
}

/// The `name=value` pair of the first `Set-Cookie` header.
fn cookie_pair(res: &Response) -> Option<String> {
    let header = res.headers().get(SET_COOKIE)?.to_str().ok()?;
    header.split(';').next().map(str::to_owned)
}

#[tokio::test]
async fn login_round_trip_via_cookie() {
    let app = App::new(tree()).unwrap();
    app.add_middleware(LoginMiddleware::with_loader(b"secret", |id: &str| {
        Some(User { name: id.to_owned() })
    }))
    .unwrap();

    let res = app.dispatch(with_cookie("/me", None)).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().get(SET_COOKIE).is_none());

    let res = app.dispatch(with_cookie("/login/ann", None)).await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
    let cookie = cookie_pair(&res).unwrap();
    assert!(cookie.starts_with("session="));
    let set_cookie = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("HttpOnly"));

    let res = app.dispatch(with_cookie("/me", Some(&cookie))).await;
    assert_eq!(common::body(&res), "ann");
    // Reading the session does not rewrite the cookie.
    assert!(res.headers().get(SET_COOKIE).is_none());

    let res = app.dispatch(with_cookie("/logout", Some(&cookie))).await;
    let cleared = cookie_pair(&res).unwrap();
    let res = app.dispatch(with_cookie("/me", Some(&cleared))).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_cookie_is_an_empty_session() {
    let app = App::new(tree()).unwrap();
    app.add_middleware(LoginMiddleware::with_loader(b"secret", |id: &str| {
        Some(User { name: id.to_owned() })
    }))
    .unwrap();

    let res = app.dispatch(with_cookie("/login/ann", None)).await;
    let cookie = cookie_pair(&res).unwrap();
    let (name, blob) = cookie.split_once('=').unwrap();
    let (payload, _) = blob.split_once('.').unwrap();
    let forged = format!("{name}={payload}.AAAA");

    let res = app.dispatch(with_cookie("/me", Some(&forged))).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_values_persist_between_requests() {
    let app = App::new(tree()).unwrap();
    app.add_middleware(
        LoginMiddleware::with_loader(b"secret", |id: &str| Some(User { name: id.to_owned() }))
            .options(CookieOptions::default().name("sid")),
    )
    .unwrap();

    let res = app.dispatch(with_cookie("/visits", None)).await;
    assert_eq!(common::body(&res), "1");
    let cookie = cookie_pair(&res).unwrap();
    assert!(cookie.starts_with("sid="));

    let res = app.dispatch(with_cookie("/visits", Some(&cookie))).await;
    assert_eq!(common::body(&res), "2");
}

// ── Token store variant ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Tokens {
    issued: Arc<Mutex<HashMap<String, String>>>,
    revoked: Arc<Mutex<Vec<String>>>,
}

impl TokenStore<User> for Tokens {
    fn create(&self, user: &User, _req: &Request) -> String {
        let token = format!("tok-{}-{}", user.name, self.issued.lock().len());
        self.issued.lock().insert(token.clone(), user.name.clone());
        token
    }

    fn lookup(&self, user_id: &str, token: &str, _req: &Request) -> Option<User> {
        match self.issued.lock().get(token) {
            Some(owner) if owner == user_id => Some(User { name: owner.clone() }),
            _ => None,
        }
    }

    fn revoke(&self, _user: &User, token: &str, _req: &Request) {
        self.issued.lock().remove(token);
        self.revoked.lock().push(token.to_owned());
    }
}

#[tokio::test]
async fn token_store_backs_identity() {
    let tokens = Tokens::default();
    let app = App::new(tree()).unwrap();
    app.add_middleware(LoginMiddleware::with_store(b"secret", tokens.clone())).unwrap();

    let res = app.dispatch(with_cookie("/login/bob", None)).await;
    let cookie = cookie_pair(&res).unwrap();
    assert_eq!(tokens.issued.lock().len(), 1);

    let res = app.dispatch(with_cookie("/me", Some(&cookie))).await;
    assert_eq!(common::body(&res), "bob");

    app.dispatch(with_cookie("/logout", Some(&cookie))).await;
    assert_eq!(tokens.revoked.lock().as_slice(), ["tok-bob-0"]);

    // The old cookie still carries the token, but the store no longer knows it.
    let res = app.dispatch(with_cookie("/me", Some(&cookie))).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}
