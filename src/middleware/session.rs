//! Signed-cookie sessions and login.
//!
//! [`LoginMiddleware`] reads the session cookie, exposes a lazily decoded
//! [`Session`] and a [`Login`] handle as request extensions, and writes the
//! cookie back only when the session was modified.
//!
//! Who the current user is comes from a [`UserSource`]:
//!
//! - [`CookieUsers`] keeps the user id in the cookie and resolves it with an
//!   injected loader;
//! - [`StoreUsers`] keeps a user id and an opaque token in the cookie and
//!   delegates create / lookup / revoke to an external [`TokenStore`].
//!
//! ```rust,no_run
//! use kvist::middleware::session::{Identity, Login, LoginMiddleware};
//! use kvist::{Action, App, Args, Controller, Request};
//!
//! #[derive(Clone)]
//! struct User { id: String }
//!
//! impl Identity for User {
//!     fn id(&self) -> String { self.id.clone() }
//! }
//!
//! async fn whoami(req: Request, _args: Args) -> String {
//!     let login = Login::<User>::from_request(&req).expect("login middleware installed");
//!     match login.user(&req) {
//!         Some(user) => user.id,
//!         None => "anonymous".into(),
//!     }
//! }
//!
//! # fn main() -> Result<(), kvist::Error> {
//! let root = Controller::new();
//! root.add_action("whoami", Action::new(whoami))?;
//! let app = App::new(root)?;
//! app.add_middleware(LoginMiddleware::with_loader(b"secret", |id: &str| {
//!     Some(User { id: id.to_owned() })
//! }))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::{Map, Value as Json};
use sha2::Sha256;

use crate::cookie::{Cookie, SameSite};
use crate::endpoint::{Endpoint, endpoint_fn};
use crate::middleware::Middleware;
use crate::request::Request;

type HmacSha256 = Hmac<Sha256>;

const USER_ID: &str = "user_id";
const TOKEN: &str = "token";

// ── Cookie options ────────────────────────────────────────────────────────────

/// How the session cookie is written back.
#[derive(Clone, Debug)]
pub struct CookieOptions {
    name: String,
    max_age: Option<Duration>,
    expires: Option<DateTime<Utc>>,
    path: Option<String>,
    domain: Option<String>,
    same_site: Option<SameSite>,
    http_only: bool,
    secure: bool,
}

impl Default for CookieOptions {
    /// `session`, path `/`, http-only.
    fn default() -> Self {
        Self {
            name: "session".to_owned(),
            max_age: None,
            expires: None,
            path: Some("/".to_owned()),
            domain: None,
            same_site: None,
            http_only: true,
            secure: false,
        }
    }
}

impl CookieOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn cookie_name(&self) -> &str { &self.name }

    fn cookie(&self, value: String) -> Cookie {
        let mut cookie = Cookie::new(self.name.clone(), value)
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure);
        if let Some(max_age) = self.max_age {
            cookie = cookie.max_age(max_age);
        }
        if let Some(expires) = self.expires {
            cookie = cookie.expires(expires);
        }
        if let Some(domain) = &self.domain {
            cookie = cookie.domain(domain.clone());
        }
        if let Some(same_site) = self.same_site {
            cookie = cookie.same_site(same_site);
        }
        cookie
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Encodes session data as `base64url(json).base64url(hmac-sha256)`.
pub struct SessionCodec {
    mac: HmacSha256,
}

impl SessionCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .expect("HMAC can take key of any size");
        Self { mac }
    }

    pub fn encode(&self, data: &Map<String, Json>) -> String {
        let payload = URL_SAFE_NO_PAD.encode(Json::Object(data.clone()).to_string());
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    /// Returns `None` for a malformed blob or a bad signature.
    pub fn decode(&self, blob: &str) -> Option<Map<String, Json>> {
        let (payload, signature) = blob.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        match serde_json::from_slice(&json).ok()? {
            Json::Object(map) => Some(map),
            _ => None,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct SessionState {
    raw: Option<String>,
    data: Option<Map<String, Json>>,
    dirty: bool,
}

/// A mutable string → JSON map backed by the session cookie.
///
/// The cookie is decoded on first access. Any write marks the session dirty;
/// only dirty sessions are written back.
#[derive(Clone)]
pub struct Session {
    codec: Arc<SessionCodec>,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub(crate) fn new(codec: Arc<SessionCodec>, raw: Option<String>) -> Self {
        let state = SessionState { raw, data: None, dirty: false };
        Self { codec, state: Arc::new(Mutex::new(state)) }
    }

    pub fn from_request(req: &Request) -> Option<&Session> {
        req.extensions().get::<Session>()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Map<String, Json>, &mut bool) -> T) -> T {
        let mut guard = self.state.lock();
        let SessionState { raw, data, dirty } = &mut *guard;
        let data = data.get_or_insert_with(|| {
            raw.as_deref()
                .and_then(|raw| self.codec.decode(raw))
                .unwrap_or_default()
        });
        f(data, dirty)
    }

    pub fn get(&self, key: &str) -> Option<Json> {
        self.with(|data, _| data.get(key).cloned())
    }

    /// Returns a string entry; `null` and non-string values read as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Json::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn insert(&self, key: &str, value: impl Into<Json>) {
        self.with(|data, dirty| {
            data.insert(key.to_owned(), value.into());
            *dirty = true;
        });
    }

    pub fn remove(&self, key: &str) -> Option<Json> {
        self.with(|data, dirty| {
            let old = data.remove(key);
            *dirty |= old.is_some();
            old
        })
    }

    pub fn clear(&self) {
        self.with(|data, dirty| {
            *dirty |= !data.is_empty();
            data.clear();
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Signed cookie value for the current contents.
    pub fn serialize(&self) -> String {
        self.with(|data, _| self.codec.encode(data))
    }
}

// ── Identity backends ─────────────────────────────────────────────────────────

/// A user that can be remembered by id.
pub trait Identity {
    fn id(&self) -> String;
}

/// Resolves, records and forgets the current user for a session.
pub trait UserSource<U>: Send + Sync + 'static {
    fn load(&self, session: &Session, req: &Request) -> Option<U>;
    fn login(&self, user: &U, session: &Session, req: &Request);
    fn logout(&self, user: Option<&U>, session: &Session, req: &Request);
}

/// Stores the user id in the cookie and resolves it with `loader`.
pub struct CookieUsers<F> {
    loader: F,
}

impl<F> CookieUsers<F> {
    pub fn new(loader: F) -> Self {
        Self { loader }
    }
}

impl<U, F> UserSource<U> for CookieUsers<F>
where
    U: Identity,
    F: Fn(&str) -> Option<U> + Send + Sync + 'static,
{
    fn load(&self, session: &Session, _req: &Request) -> Option<U> {
        let id = session.get_str(USER_ID)?;
        (self.loader)(&id)
    }

    fn login(&self, user: &U, session: &Session, _req: &Request) {
        session.insert(USER_ID, user.id());
    }

    fn logout(&self, _user: Option<&U>, session: &Session, _req: &Request) {
        session.insert(USER_ID, Json::Null);
    }
}

/// External store of login tokens.
pub trait TokenStore<U>: Send + Sync + 'static {
    /// Issues a new token for `user`.
    fn create(&self, user: &U, req: &Request) -> String;

    /// Returns the user owning `token`, if it is still valid.
    fn lookup(&self, user_id: &str, token: &str, req: &Request) -> Option<U>;

    fn revoke(&self, user: &U, token: &str, req: &Request);
}

/// Stores a user id and an opaque token in the cookie; the [`TokenStore`]
/// decides whether the pair is valid.
pub struct StoreUsers<S> {
    store: S,
}

impl<S> StoreUsers<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<U, S> UserSource<U> for StoreUsers<S>
where
    U: Identity,
    S: TokenStore<U>,
{
    fn load(&self, session: &Session, req: &Request) -> Option<U> {
        let id = session.get_str(USER_ID)?;
        let token = session.get_str(TOKEN)?;
        self.store.lookup(&id, &token, req)
    }

    fn login(&self, user: &U, session: &Session, req: &Request) {
        let token = self.store.create(user, req);
        session.insert(USER_ID, user.id());
        session.insert(TOKEN, token);
    }

    fn logout(&self, user: Option<&U>, session: &Session, req: &Request) {
        let token = session.get_str(TOKEN);
        session.insert(USER_ID, Json::Null);
        session.insert(TOKEN, Json::Null);
        if let (Some(user), Some(token)) = (user, token) {
            self.store.revoke(user, &token, req);
        }
    }
}

// ── Login handle ──────────────────────────────────────────────────────────────

struct LoginState<U> {
    session: Session,
    source: Arc<dyn UserSource<U>>,
    user: Mutex<Option<Option<U>>>,
}

/// Per-request login handle, installed as a request extension.
pub struct Login<U> {
    state: Arc<LoginState<U>>,
}

impl<U> Clone for Login<U> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<U: Clone + Send + Sync + 'static> Login<U> {
    pub fn from_request(req: &Request) -> Option<&Login<U>> {
        req.extensions().get::<Login<U>>()
    }

    pub fn session(&self) -> &Session {
        &self.state.session
    }

    /// The current user, loaded on first call and cached for the request.
    pub fn user(&self, req: &Request) -> Option<U> {
        let mut cached = self.state.user.lock();
        cached
            .get_or_insert_with(|| self.state.source.load(&self.state.session, req))
            .clone()
    }

    pub fn login_user(&self, user: &U, req: &Request) {
        self.state.source.login(user, &self.state.session, req);
        *self.state.user.lock() = None;
    }

    pub fn logout_user(&self, req: &Request) {
        let user = self.user(req);
        self.state.source.logout(user.as_ref(), &self.state.session, req);
        *self.state.user.lock() = None;
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Installs [`Session`] and [`Login`] on every request and writes the session
/// cookie back when it changed.
pub struct LoginMiddleware<U> {
    codec: Arc<SessionCodec>,
    options: Arc<CookieOptions>,
    source: Arc<dyn UserSource<U>>,
}

impl<U: Identity + Clone + Send + Sync + 'static> LoginMiddleware<U> {
    pub fn new(secret: impl AsRef<[u8]>, source: impl UserSource<U>) -> Self {
        Self {
            codec: Arc::new(SessionCodec::new(secret)),
            options: Arc::new(CookieOptions::default()),
            source: Arc::new(source),
        }
    }

    /// Users are identified by the id stored in the cookie.
    pub fn with_loader<F>(secret: impl AsRef<[u8]>, loader: F) -> Self
    where
        F: Fn(&str) -> Option<U> + Send + Sync + 'static,
    {
        Self::new(secret, CookieUsers::new(loader))
    }

    /// Users are identified by a token validated against `store`.
    pub fn with_store(secret: impl AsRef<[u8]>, store: impl TokenStore<U>) -> Self {
        Self::new(secret, StoreUsers::new(store))
    }

    pub fn options(mut self, options: CookieOptions) -> Self {
        self.options = Arc::new(options);
        self
    }
}

impl<U: Clone + Send + Sync + 'static> Middleware for LoginMiddleware<U> {
    fn wrap(&self, next: Endpoint) -> Endpoint {
        let codec = Arc::clone(&self.codec);
        let options = Arc::clone(&self.options);
        let source = Arc::clone(&self.source);
        endpoint_fn(move |mut req, args| {
            let next = Arc::clone(&next);
            let options = Arc::clone(&options);

            let raw = req.cookie(options.cookie_name()).map(str::to_owned);
            let session = Session::new(Arc::clone(&codec), raw);
            let login = Login {
                state: Arc::new(LoginState {
                    session: session.clone(),
                    source: Arc::clone(&source),
                    user: Mutex::new(None),
                }),
            };
            req.extensions_mut().insert(session.clone());
            req.extensions_mut().insert(login);

            async move {
                let mut res = next.call(req, args).await;
                if session.is_dirty() {
                    res.set_cookie(&options.cookie(session.serialize()));
                }
                res
            }
        })
    }
}
