mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::{call, label};
use http::StatusCode;
use kvist::{App, Child, ConfigError, Controller, Error, Param, Verb};

#[tokio::test]
async fn mutation_anywhere_recompiles() {
    let deep = Controller::new();
    let mid = Controller::new();
    mid.add_controller("deep", Arc::clone(&deep)).unwrap();
    let root = Controller::new();
    root.add_controller("mid", Arc::clone(&mid)).unwrap();
    let app = App::new(root).unwrap();

    assert_eq!(call(&app, "GET", "/mid/deep/x").await.0, StatusCode::NOT_FOUND);
    deep.add_action("x", label("x")).unwrap();
    assert_eq!(call(&app, "GET", "/mid/deep/x").await.1, "x");

    deep.set_verb(Verb::Get, label("deep-get")).unwrap();
    assert_eq!(call(&app, "GET", "/mid/deep").await.1, "deep-get");
    deep.clear_verb(Verb::Get).unwrap();
    assert_eq!(call(&app, "GET", "/mid/deep").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attached_subtree_is_registered() {
    let root = Controller::new();
    let app = App::new(Arc::clone(&root)).unwrap();

    let late = Controller::new();
    root.add_controller("late", Arc::clone(&late)).unwrap();
    assert_eq!(late.owner_count(), 1);

    late.set_endpoint(label("late")).unwrap();
    assert_eq!(call(&app, "GET", "/late").await.1, "late");
}

#[tokio::test]
async fn removal_unpublishes_routes() {
    let sub = Controller::with_endpoint(label("sub"));
    let root = Controller::new();
    root.add_controller("sub", sub).unwrap();
    let app = App::new(Arc::clone(&root)).unwrap();
    assert!(app.routes().contains(&["sub"], None));

    let removed = root.remove("sub").unwrap();
    assert!(matches!(removed, Some(Child::Controller(_))));
    assert!(!app.routes().contains(&["sub"], None));
    assert_eq!(call(&app, "GET", "/sub").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shared_controller_updates_every_app() {
    let shared = Controller::new();
    let root_a = Controller::new();
    root_a.add_controller("api", Arc::clone(&shared)).unwrap();
    let root_b = Controller::new();
    root_b.add_controller("v2", Arc::clone(&shared)).unwrap();
    let a = App::new(root_a).unwrap();
    let b = App::new(root_b).unwrap();
    assert_eq!(shared.owner_count(), 2);

    shared.add_action("ping", label("pong")).unwrap();
    assert_eq!(call(&a, "GET", "/api/ping").await.1, "pong");
    assert_eq!(call(&b, "GET", "/v2/ping").await.1, "pong");
}

#[test]
fn recompile_is_idempotent() {
    let users = Controller::with_endpoint(label("any"));
    users.set_verb(Verb::Get, label("get")).unwrap();
    users
        .add_action("show", label("show").param(Param::new::<i64>("id")).param(Param::raw("tab").or("info")))
        .unwrap();
    let root = Controller::new();
    root.add_controller("users", users).unwrap();
    let app = App::new(root).unwrap();

    let first = app.routes();
    app.recompile().unwrap();
    let second = app.routes();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.keys(), second.keys());
    assert_eq!(first.max_len(), second.max_len());
    for (path, verb) in first.keys() {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        let (a, b) = (first.get(&path, verb).unwrap(), second.get(&path, verb).unwrap());
        assert_eq!(a.params(), b.params());
    }
    assert_eq!(first.len(), 3);
}

#[test]
fn invalid_names_are_rejected() {
    let root = Controller::new();
    for name in ["", "_hidden", "a/b"] {
        let err = root.add_action(name, label("x")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidName(_))));
    }
}

#[test]
fn malformed_signature_keeps_old_table() {
    let root = Controller::new();
    root.add_action("ok", label("ok")).unwrap();
    let app = App::new(Arc::clone(&root)).unwrap();

    let err = root
        .add_action("bad", label("bad").param(Param::raw("a").or("x")).param(Param::raw("b")))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MandatoryAfterOptional { .. })));
    assert!(app.routes().contains(&["ok"], None));
    assert!(!app.routes().contains(&["bad"], None));

    // Fixing the tree publishes a fresh table again.
    root.remove("bad").unwrap();
    root.add_action("good", label("good")).unwrap();
    assert!(app.routes().contains(&["good"], None));
}

#[test]
fn cycles_are_config_errors() {
    let a = Controller::new();
    let b = Controller::new();
    a.add_controller("b", Arc::clone(&b)).unwrap();
    let err = b.add_controller("a", Arc::clone(&a)).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Cycle(_))));
    assert!(b.child("a").is_none());
    assert!(App::new(a).is_ok());
}

#[tokio::test]
async fn rejected_cycle_leaves_app_publishing() {
    let root = Controller::new();
    root.add_action("old", label("old")).unwrap();
    let app = App::new(Arc::clone(&root)).unwrap();
    let before = app.routes();

    let err = root.add_controller("loop", Arc::clone(&root)).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Cycle(_))));
    assert!(root.child("loop").is_none());
    assert!(Arc::ptr_eq(&before, &app.routes()));

    root.add_action("new", label("new")).unwrap();
    assert_eq!(call(&app, "GET", "/new").await, (StatusCode::OK, "new".into()));
    assert_eq!(call(&app, "GET", "/old").await.1, "old");
}

#[test]
fn readers_never_see_half_a_subtree() {
    let root = Controller::new();
    root.add_action("stable", label("stable")).unwrap();
    let app = App::new(Arc::clone(&root)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let app = app.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut checks = 0usize;
                loop {
                    let table = app.routes();
                    assert!(table.contains(&["stable"], None));
                    assert_eq!(table.contains(&["x", "p"], None), table.contains(&["x", "q"], None));
                    checks += 1;
                    if stop.load(Ordering::Relaxed) {
                        break checks;
                    }
                }
            })
        })
        .collect();

    let writer = {
        let root = Arc::clone(&root);
        thread::spawn(move || {
            for _ in 0..200 {
                let x = Controller::new();
                x.add_action("p", label("p")).unwrap();
                x.add_action("q", label("q")).unwrap();
                root.add_controller("x", x).unwrap();
                root.remove("x").unwrap();
            }
        })
    };

    writer.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}
