use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use stackrouter::{from_fn, hook_fn, Handler, Request, Router};

fn pass() -> impl Handler {
    from_fn(|_req, _res, next| {
        next.call();
        Ok(())
    })
}

fn answer() -> impl Handler {
    from_fn(|req, res, _next| {
        res.send(req.param("id").unwrap_or("-").to_string());
        Ok(())
    })
}

/// Ten middleware layers, a mounted api router with twenty routes and a
/// param hook, the usual shape of a small application.
fn app() -> Router {
    let mut api = Router::new();
    api.param(
        "id",
        hook_fn(|_req, _res, next, _value, _name| {
            next.call();
            Ok(())
        }),
    );
    for i in 0..20 {
        api.get(&format!("/resource{i}/:id"), answer()).unwrap();
        api.post(&format!("/resource{i}"), answer()).unwrap();
    }

    let mut app = Router::new();
    for _ in 0..10 {
        app.use_handler(pass());
    }
    app.mount("/api", api).unwrap();
    app
}

fn bench_dispatch(c: &mut Criterion) {
    let app = app();

    c.bench_function("dispatch_first_route", |b| {
        b.iter(|| {
            let served = app.serve(Request::new("GET", black_box("/api/resource0/42")).unwrap());
            black_box(served.status())
        })
    });

    c.bench_function("dispatch_last_route", |b| {
        b.iter(|| {
            let served = app.serve(Request::new("GET", black_box("/api/resource19/42")).unwrap());
            black_box(served.status())
        })
    });

    c.bench_function("dispatch_not_found", |b| {
        b.iter(|| {
            let served = app.serve(Request::new("GET", black_box("/nope")).unwrap());
            black_box(served.status())
        })
    });

    c.bench_function("dispatch_options", |b| {
        b.iter(|| {
            let served = app.serve(Request::new("OPTIONS", black_box("/api/resource5")).unwrap());
            black_box(served.status())
        })
    });
}

fn bench_deep_stack(c: &mut Criterion) {
    let mut router = Router::new();
    for _ in 0..1_000 {
        router.use_handler(pass());
    }
    router.get("/", answer()).unwrap();

    c.bench_function("dispatch_1000_layers", |b| {
        b.iter(|| {
            let served = router.serve(Request::new("GET", "/").unwrap());
            black_box(served.status())
        })
    });
}

criterion_group!(benches, bench_dispatch, bench_deep_stack);
criterion_main!(benches);
