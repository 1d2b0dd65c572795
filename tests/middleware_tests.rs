mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use common::{call, label};
use http::StatusCode;
use kvist::middleware::resource::{Lifecycle, OpenError, Resource};
use kvist::middleware::{Middleware, from_fn};
use kvist::{Action, App, Args, Controller, Endpoint, Request, Response};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, name: &'static str) -> impl Middleware + use<> {
    let log = Arc::clone(log);
    from_fn(move |req, args, next: Endpoint| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(format!("{name}>"));
            let res = next.call(req, args).await;
            log.lock().push(format!("<{name}"));
            res
        }
    })
}

fn logged_endpoint(log: &Log) -> Action {
    let log = Arc::clone(log);
    Action::new(move |_req: Request, _args: Args| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push("endpoint".to_owned());
            "done"
        }
    })
}

#[tokio::test]
async fn app_then_ancestors_then_endpoint() {
    let log: Log = Arc::default();

    let leaf = Controller::new();
    leaf.add_action("go", logged_endpoint(&log)).unwrap();
    let root = Controller::new();
    root.add_controller("leaf", Arc::clone(&leaf)).unwrap();
    root.add_middleware(recorder(&log, "A")).unwrap();
    root.add_middleware(recorder(&log, "B")).unwrap();
    leaf.add_middleware(recorder(&log, "L")).unwrap();

    let app = App::new(root).unwrap();
    app.add_middleware(recorder(&log, "C")).unwrap();

    assert_eq!(call(&app, "GET", "/leaf/go").await, (StatusCode::OK, "done".into()));
    assert_eq!(
        *log.lock(),
        ["C>", "A>", "B>", "L>", "endpoint", "<L", "<B", "<A", "<C"],
    );
}

#[tokio::test]
async fn action_layers_sit_innermost() {
    let log: Log = Arc::default();
    let root = Controller::new();
    root.add_middleware(recorder(&log, "ctl")).unwrap();
    root.add_action(
        "go",
        logged_endpoint(&log).wrap(recorder(&log, "first")).wrap(recorder(&log, "second")),
    )
    .unwrap();
    let app = App::new(root).unwrap();

    call(&app, "GET", "/go").await;
    assert_eq!(
        *log.lock(),
        ["ctl>", "second>", "first>", "endpoint", "<first", "<second", "<ctl"],
    );
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let root = Controller::new();
    root.add_action("secret", label("treasure")).unwrap();
    root.add_middleware(from_fn(|req: Request, args, next: Endpoint| async move {
        if req.header("authorization").is_none() {
            return Response::status(StatusCode::UNAUTHORIZED);
        }
        next.call(req, args).await
    }))
    .unwrap();
    let app = App::new(root).unwrap();

    assert_eq!(call(&app, "GET", "/secret").await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn middleware_does_not_wrap_not_found() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let root = Controller::with_endpoint(label("index"));
    let app = App::new(root).unwrap();
    app.add_middleware(move |next: Endpoint| {
        counter.fetch_add(1, Ordering::SeqCst);
        next
    })
    .unwrap();

    // Wrapping happens per route at compile time.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    call(&app, "GET", "/missing/path").await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn adding_app_middleware_recompiles() {
    let root = Controller::new();
    root.add_action("a", label("a")).unwrap();
    let app = App::new(root).unwrap();
    let before = app.routes();

    app.add_middleware(from_fn(|req, args, next: Endpoint| async move {
        let mut res = next.call(req, args).await;
        res.headers_mut().insert("x-wrapped", "yes".parse().unwrap());
        res
    }))
    .unwrap();

    assert!(!Arc::ptr_eq(&before, &app.routes()));
    let res = app.dispatch(common::get("/a")).await;
    assert_eq!(res.header("x-wrapped"), Some("yes"));
}

// ── Resource lifecycle ────────────────────────────────────────────────────────

struct Connection {
    open: AtomicBool,
}

#[derive(Default)]
struct Database {
    fail: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Resource for Database {
    type Handle = Connection;

    fn open(&self) -> Result<Connection, OpenError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Connection { open: AtomicBool::new(true) })
    }

    fn close(&self, conn: &Connection) {
        conn.open.store(false, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn resource_closes_after_delivery() {
    let db = Arc::new(Database::default());
    let root = Controller::new();
    root.add_action("q", label("rows")).unwrap();
    let app = App::new(root).unwrap();
    app.add_middleware(Lifecycle::new(Arc::clone(&db))).unwrap();

    let res = app.dispatch(common::get("/q")).await;
    assert_eq!(db.opened.load(Ordering::SeqCst), 1);

    let delivered = res.into_http();
    assert_eq!(db.closed.load(Ordering::SeqCst), 0);
    drop(delivered);
    assert_eq!(db.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finished_request_leaves_concurrent_connection_open() {
    let db = Arc::new(Database::default());
    let (release, parked) = tokio::sync::oneshot::channel::<()>();
    let parked = Arc::new(Mutex::new(Some(parked)));

    let root = Controller::new();
    root.add_action("fast", label("fast")).unwrap();
    root.add_action(
        "slow",
        Action::new(move |req: Request, _args: Args| {
            let parked = parked.lock().take();
            async move {
                let conn = Lifecycle::<Database>::handle(&req).unwrap();
                if let Some(parked) = parked {
                    parked.await.unwrap();
                }
                if conn.open.load(Ordering::SeqCst) { "open" } else { "closed" }
            }
        }),
    )
    .unwrap();
    let app = App::new(root).unwrap();
    app.add_middleware(Lifecycle::new(Arc::clone(&db))).unwrap();

    let slow = tokio::spawn({
        let app = app.clone();
        async move { common::body(&app.dispatch(common::get("/slow")).await) }
    });
    while db.opened.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    drop(app.dispatch(common::get("/fast")).await.into_http());
    assert_eq!(db.opened.load(Ordering::SeqCst), 2);
    assert_eq!(db.closed.load(Ordering::SeqCst), 1);

    release.send(()).unwrap();
    assert_eq!(slow.await.unwrap(), "open");
    assert_eq!(db.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resource_open_failure_is_unavailable() {
    let db = Arc::new(Database::default());
    db.fail.store(true, Ordering::SeqCst);
    let root = Controller::new();
    root.add_action("q", label("rows")).unwrap();
    root.add_middleware(Lifecycle::new(Arc::clone(&db))).unwrap();
    let app = App::new(root).unwrap();

    assert_eq!(call(&app, "GET", "/q").await.0, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(db.closed.load(Ordering::SeqCst), 0);
}
