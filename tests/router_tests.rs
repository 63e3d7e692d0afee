mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::trace::Trace;
use http::{Method, StatusCode};
use stackrouter::{
    error_fn, from_fn, Callback, Error, Exchange, Outcome, Request, Router, RouterOptions,
    Scheduler,
};

fn get(url: &str) -> Request {
    Request::new("GET", url).unwrap()
}

#[test]
fn test_mounted_middleware_then_route() {
    let trace = Trace::new();
    let mut router = Router::new();

    let t = trace.clone();
    router
        .mount(
            "/a",
            from_fn(move |req, _res, next| {
                t.push(format!("mw url={} base={}", req.url, req.base_url));
                next.call();
                Ok(())
            }),
        )
        .unwrap();
    let t = trace.clone();
    router
        .get(
            "/a/:id",
            from_fn(move |req, res, _next| {
                t.push(format!("h id={} url={}", req.param("id").unwrap_or("-"), req.url));
                res.send("done");
                Ok(())
            }),
        )
        .unwrap();

    let served = router.serve(get("/a/42"));
    assert_eq!(
        trace.entries(),
        vec!["mw url=/42 base=/a", "h id=42 url=/a/42"]
    );
    assert!(matches!(served.outcome, Some(Outcome::Handled)));
    assert_eq!(served.response.body_text(), "done");
}

#[test]
fn test_options_lists_methods_of_matching_routes() {
    let trace = Trace::new();
    let mut router = Router::new();
    router.post("/x", trace.answer("post")).unwrap();

    let served = router.serve(Request::new("OPTIONS", "/x").unwrap());
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(served.response.header_str("allow"), Some("POST"));
    assert!(served.response.body.is_empty());
    assert!(trace.entries().is_empty());
}

#[test]
fn test_options_leaves_finished_response_alone() {
    let mut router = Router::new();
    router
        .use_handler(from_fn(|_req, res, next| {
            res.set_status(StatusCode::ACCEPTED);
            res.send("early");
            next.call();
            Ok(())
        }))
        .post("/x", from_fn(|_req, res, _next| {
            res.send("post");
            Ok(())
        }))
        .unwrap();

    let served = router.serve(Request::new("OPTIONS", "/x").unwrap());
    assert!(matches!(served.outcome, Some(Outcome::Handled)));
    assert_eq!(served.status(), StatusCode::ACCEPTED);
    assert_eq!(served.response.body_text(), "early");
    assert!(served.response.header_str("allow").is_none());
    assert_ne!(served.response.header_str("content-length"), Some("0"));
}

#[test]
fn test_options_allow_is_deduplicated_in_order() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .get("/items", trace.answer("get"))
        .unwrap()
        .post("/items", trace.answer("post"))
        .unwrap()
        .get("/items", trace.answer("get again"))
        .unwrap();

    let served = router.serve(Request::new("OPTIONS", "/items").unwrap());
    assert_eq!(served.response.header_str("allow"), Some("GET,HEAD,POST"));
}

#[test]
fn test_explicit_options_handler_wins() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .get("/x", trace.answer("get"))
        .unwrap()
        .options("/x", trace.answer("options"))
        .unwrap();

    let served = router.serve(Request::new("OPTIONS", "/x").unwrap());
    assert_eq!(served.response.body_text(), "options");
    assert!(served.response.header_str("allow").is_none());
}

#[test]
fn test_options_without_matching_route_is_404() {
    let router = Router::new();
    let served = router.serve(Request::new("OPTIONS", "/nothing").unwrap());
    assert_eq!(served.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_skip_route_resumes_router_scan() {
    let trace = Trace::new();
    let mut router = Router::new();

    let t = trace.clone();
    router
        .route("/x")
        .unwrap()
        .get(trace.pass("first"))
        .get(from_fn(move |_req, _res, next| {
            t.push("second");
            next.skip_route();
            Ok(())
        }))
        .get(trace.answer("third"));
    router.get("/x", trace.answer("next route")).unwrap();

    let served = router.serve(get("/x"));
    assert_eq!(trace.entries(), vec!["first", "second", "next route"]);
    assert!(matches!(served.outcome, Some(Outcome::Handled)));
}

#[test]
fn test_skip_router_leaves_nested_router_without_error() {
    let trace = Trace::new();
    let mut inner = Router::new();
    let t = trace.clone();
    inner
        .use_handler(from_fn(move |_req, _res, next| {
            t.push("inner");
            next.skip_router();
            Ok(())
        }))
        .use_handler(trace.answer("unreachable"));

    let mut outer = Router::new();
    outer
        .mount("/api", inner)
        .unwrap()
        .use_handler(trace.answer("outer"));

    let served = outer.serve(get("/api/x"));
    assert_eq!(trace.entries(), vec!["inner", "outer"]);
    assert_eq!(served.response.body_text(), "outer");
}

#[test]
fn test_skip_router_from_route_handler() {
    let trace = Trace::new();
    let mut inner = Router::new();
    inner
        .get(
            "/x",
            from_fn(|_req, _res, next| {
                next.skip_router();
                Ok(())
            }),
        )
        .unwrap()
        .use_handler(trace.answer("inner later"));
    let mut outer = Router::new();
    outer
        .mount("/", inner)
        .unwrap()
        .use_handler(trace.answer("outer"));

    outer.serve(get("/x"));
    assert_eq!(trace.entries(), vec!["outer"]);
}

#[test]
fn test_skip_router_at_top_level_is_unhandled() {
    let mut router = Router::new();
    router.use_handler(from_fn(|_req, _res, next| {
        next.skip_router();
        Ok(())
    }));
    let served = router.serve(get("/"));
    assert!(matches!(served.outcome, Some(Outcome::Unhandled)));
    assert_eq!(served.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_error_skips_handlers_until_error_handler() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .use_handler(from_fn(|_req, _res, next| {
            next.fail(Error::http(StatusCode::CONFLICT, "clash"));
            Ok(())
        }))
        .use_handler(trace.pass("skipped middleware"))
        .get("/", trace.answer("skipped route"))
        .unwrap();
    let t = trace.clone();
    router.use_error(error_fn(move |err, _req, res, _next| {
        t.push(format!("error handler: {err}"));
        res.set_status(err.status());
        res.send("handled");
        Ok(())
    }));

    let served = router.serve(get("/"));
    assert_eq!(trace.entries(), vec!["error handler: clash"]);
    assert_eq!(served.status(), StatusCode::CONFLICT);
    assert_eq!(served.response.body_text(), "handled");
}

#[test]
fn test_error_handler_can_recover() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .use_error(error_fn(|_err, _req, _res, _next| {
            panic!("error handler without an error must not run")
        }))
        .use_handler(from_fn(|_req, _res, _next| Err(Error::other(anyhow::anyhow!("boom")))))
        .use_error(error_fn(|_err, _req, _res, next| {
            next.call();
            Ok(())
        }))
        .use_handler(trace.answer("recovered"));

    let served = router.serve(get("/"));
    assert_eq!(trace.entries(), vec!["recovered"]);
    assert!(matches!(served.outcome, Some(Outcome::Handled)));
}

#[test]
fn test_unhandled_error_becomes_status() {
    let mut router = Router::new();
    router.use_handler(from_fn(|_req, _res, next| {
        next.fail(Error::http(StatusCode::UNAUTHORIZED, "who are you"));
        Ok(())
    }));
    let served = router.serve(get("/"));
    assert!(matches!(served.outcome, Some(Outcome::Failed(_))));
    assert_eq!(served.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(served.response.body_text(), "who are you");
}

#[test]
fn test_panicking_handler_becomes_500() {
    let mut router = Router::new();
    router.get("/", from_fn(|_req, _res, _next| panic!("boom"))).unwrap();
    let served = router.serve(get("/"));
    assert_eq!(served.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(served.response.body_text(), "handler panicked: boom");
}

#[test]
fn test_route_scoped_error_handler() {
    let trace = Trace::new();
    let mut router = Router::new();
    let t = trace.clone();
    router
        .route("/x")
        .unwrap()
        .get(from_fn(|_req, _res, _next| Err(Error::Config("bad".into()))))
        .on_error(
            Method::GET,
            error_fn(move |err, _req, res, _next| {
                t.push(format!("route error: {err}"));
                res.send("route caught");
                Ok(())
            }),
        );

    let served = router.serve(get("/x"));
    assert_eq!(trace.entries(), vec!["route error: configuration error: bad"]);
    assert_eq!(served.response.body_text(), "route caught");
}

#[test]
fn test_head_runs_get_handlers() {
    let trace = Trace::new();
    let mut router = Router::new();
    router.get("/x", trace.answer("get")).unwrap();
    let served = router.serve(Request::new("HEAD", "/x").unwrap());
    assert_eq!(trace.entries(), vec!["get"]);
    assert!(matches!(served.outcome, Some(Outcome::Handled)));
}

#[test]
fn test_explicit_head_handler_preferred() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .route("/x")
        .unwrap()
        .get(trace.answer("get"))
        .head(trace.answer("head"));
    router.serve(Request::new("HEAD", "/x").unwrap());
    assert_eq!(trace.entries(), vec!["head"]);
}

#[test]
fn test_head_on_route_without_get_falls_through() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .post("/x", trace.answer("post"))
        .unwrap()
        .use_handler(trace.answer("fallback"));
    let served = router.serve(Request::new("HEAD", "/x").unwrap());
    assert_eq!(trace.entries(), vec!["fallback"]);
    assert_eq!(served.response.body_text(), "fallback");
}

#[test]
fn test_method_mismatch_continues_scan() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .post("/x", trace.answer("post"))
        .unwrap()
        .put("/x", trace.answer("put"))
        .unwrap()
        .get("/x", trace.answer("get"))
        .unwrap();
    router.serve(get("/x"));
    assert_eq!(trace.entries(), vec!["get"]);
}

#[test]
fn test_route_stack_skips_other_methods() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .route("/x")
        .unwrap()
        .get(trace.pass("get one"))
        .post(trace.pass("post"))
        .delete(trace.pass("delete"))
        .get(trace.answer("get two"));

    let served = router.serve(get("/x"));
    assert_eq!(trace.entries(), vec!["get one", "get two"]);
    assert_eq!(served.response.body_text(), "get two");
}

#[test]
fn test_all_matches_every_method() {
    let trace = Trace::new();
    let mut router = Router::new();
    router.all("/any", trace.answer("all")).unwrap();
    for method in ["GET", "POST", "DELETE", "PATCH"] {
        let served = router.serve(Request::new(method, "/any").unwrap());
        assert_eq!(served.response.body_text(), "all");
    }
    assert_eq!(trace.entries().len(), 4);
}

#[test]
fn test_prefix_must_end_on_segment_boundary() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .mount("/use", trace.pass("use"))
        .unwrap()
        .use_handler(trace.answer("end"));

    router.serve(get("/user"));
    assert_eq!(trace.entries(), vec!["end"]);

    let trace2 = Trace::new();
    let mut router = Router::new();
    router
        .mount("/use", trace2.pass("use"))
        .unwrap()
        .use_handler(trace2.answer("end"));
    router.serve(get("/use.json"));
    router.serve(get("/use/x"));
    assert_eq!(trace2.entries(), vec!["use", "end", "use", "end"]);
}

#[test]
fn test_url_restored_after_each_mount() {
    let trace = Trace::new();
    let mut inner = Router::new();
    let t = trace.clone();
    inner.use_handler(from_fn(move |req, _res, next| {
        t.push(format!("inner {} {}", req.url, req.base_url));
        next.call();
        Ok(())
    }));

    let mut outer = Router::new();
    outer.mount("/blog", inner).unwrap();
    let t = trace.clone();
    outer.use_handler(from_fn(move |req, res, _next| {
        t.push(format!("outer {} {} {}", req.url, req.base_url, req.original_url));
        res.end();
        Ok(())
    }));

    let served = outer.serve(get("/blog/post/1?draft=true"));
    assert_eq!(
        trace.entries(),
        vec![
            "inner /post/1?draft=true /blog",
            "outer /blog/post/1?draft=true  /blog/post/1?draft=true",
        ]
    );
    assert_eq!(served.request.url, "/blog/post/1?draft=true");
    assert_eq!(served.request.base_url, "");
}

#[test]
fn test_merge_params_sees_parent_captures() {
    let trace = Trace::new();
    let merged = {
        let mut r = Router::with_options(RouterOptions {
            merge_params: true,
            ..RouterOptions::default()
        });
        let t = trace.clone();
        r.get(
            "/posts/:post",
            from_fn(move |req, res, _next| {
                t.push(format!(
                    "merged user={} post={}",
                    req.param("user").unwrap_or("-"),
                    req.param("post").unwrap_or("-")
                ));
                res.end();
                Ok(())
            }),
        )
        .unwrap();
        r
    };
    let plain = {
        let mut r = Router::new();
        let t = trace.clone();
        r.get(
            "/posts/:post",
            from_fn(move |req, res, _next| {
                t.push(format!(
                    "plain user={} post={}",
                    req.param("user").unwrap_or("-"),
                    req.param("post").unwrap_or("-")
                ));
                res.end();
                Ok(())
            }),
        )
        .unwrap();
        r
    };

    let mut app = Router::new();
    app.mount("/m/:user", merged)
        .unwrap()
        .mount("/p/:user", plain)
        .unwrap();

    app.serve(get("/m/ann/posts/9"));
    app.serve(get("/p/ann/posts/9"));
    assert_eq!(
        trace.entries(),
        vec!["merged user=ann post=9", "plain user=- post=9"]
    );
}

#[test]
fn test_merge_params_child_wins_on_conflict() {
    let trace = Trace::new();
    let mut child = Router::with_options(RouterOptions {
        merge_params: true,
        ..RouterOptions::default()
    });
    let t = trace.clone();
    child
        .get(
            "/:id",
            from_fn(move |req, res, _next| {
                t.push(req.param("id").unwrap_or("-").to_string());
                res.end();
                Ok(())
            }),
        )
        .unwrap();
    let mut app = Router::new();
    app.mount("/:id", child).unwrap();

    app.serve(get("/parent/child"));
    assert_eq!(trace.entries(), vec!["child"]);
}

#[test]
fn test_case_sensitive_and_strict_options() {
    let trace = Trace::new();
    let mut loose = Router::new();
    loose.get("/About", trace.answer("loose")).unwrap();
    assert_eq!(loose.serve(get("/about/")).response.body_text(), "loose");

    let mut strict = Router::with_options(RouterOptions {
        case_sensitive: true,
        strict: true,
        merge_params: false,
    });
    strict.get("/About", trace.answer("strict")).unwrap();
    assert_eq!(strict.serve(get("/about")).status(), StatusCode::NOT_FOUND);
    assert_eq!(strict.serve(get("/About/")).status(), StatusCode::NOT_FOUND);
    assert_eq!(strict.serve(get("/About")).response.body_text(), "strict");
}

#[test]
fn test_use_at_registers_many_callbacks_in_order() {
    let trace = Trace::new();
    let mut router = Router::new();
    router
        .use_at(
            "/multi",
            [
                Callback::handler(trace.pass("one")),
                Callback::handler(trace.pass("two")),
                Callback::handler(trace.answer("three")),
            ],
        )
        .unwrap();
    router.serve(get("/multi/x"));
    assert_eq!(trace.entries(), vec!["one", "two", "three"]);
}

#[test]
fn test_deep_chain_runs_without_stack_growth() {
    const LAYERS: usize = 10_000;
    let count = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    for _ in 0..LAYERS {
        let c = Arc::clone(&count);
        router.use_handler(from_fn(move |_req, _res, next| {
            c.fetch_add(1, Ordering::Relaxed);
            next.call();
            Ok(())
        }));
    }

    let scheduler = Scheduler::new();
    let exchange = Exchange::new(get("/"));
    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    router.dispatch(&exchange, &scheduler, move |o| *sink.borrow_mut() = Some(o));
    scheduler.run();

    assert_eq!(count.load(Ordering::Relaxed), LAYERS);
    assert!(matches!(outcome.borrow().as_ref(), Some(Outcome::Unhandled)));
    assert!(scheduler.ticks() >= (LAYERS / 100) as u64);
}

#[test]
fn test_deep_route_stack_defers_too() {
    const LAYERS: usize = 1_000;
    let count = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    {
        let route = router.route("/r").unwrap();
        for _ in 0..LAYERS {
            let c = Arc::clone(&count);
            route.get(from_fn(move |_req, _res, next| {
                c.fetch_add(1, Ordering::Relaxed);
                next.call();
                Ok(())
            }));
        }
    }

    let scheduler = Scheduler::new();
    let exchange = Exchange::new(get("/r"));
    router.dispatch(&exchange, &scheduler, |_| {});
    scheduler.run();

    assert_eq!(count.load(Ordering::Relaxed), LAYERS);
    assert!(scheduler.ticks() >= (LAYERS / 100) as u64);
}

#[test]
fn test_done_called_exactly_once() {
    let calls = Rc::new(RefCell::new(0));
    let mut router = Router::new();
    router
        .use_handler(from_fn(|_req, res, next| {
            res.send("early");
            next.call();
            Ok(())
        }))
        .use_handler(from_fn(|_req, _res, next| {
            next.fail(Error::Config("late".into()));
            Ok(())
        }));

    let scheduler = Scheduler::new();
    let exchange = Exchange::new(get("/"));
    let c = Rc::clone(&calls);
    router.dispatch(&exchange, &scheduler, move |_| *c.borrow_mut() += 1);
    scheduler.run();
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn test_deferred_continuation_resumes_later() {
    let trace = Trace::new();
    let mut router = Router::new();
    let t = trace.clone();
    router
        .use_handler(from_fn(move |_req, _res, next| {
            let t = t.clone();
            t.push("waiting");
            next.defer(move |next| {
                t.push("resumed");
                next.exchange()
                    .with(|req, _res| req.headers.insert("x-late", "1".parse().unwrap()))
                    .unwrap();
                next.call();
            });
            Ok(())
        }))
        .get(
            "/",
            from_fn(|req, res, _next| {
                res.send(req.header_str("x-late").unwrap_or("missing").to_string());
                Ok(())
            }),
        )
        .unwrap();

    let served = router.serve(get("/"));
    assert_eq!(trace.entries(), vec!["waiting", "resumed"]);
    assert_eq!(served.response.body_text(), "1");
}

#[test]
fn test_kept_continuation_without_resume_stalls() {
    let mut router = Router::new();
    router.use_handler(from_fn(|_req, _res, next| {
        // Stash the continuation somewhere nobody resumes it from.
        std::mem::forget(next);
        Ok(())
    }));
    let served = router.serve(get("/"));
    assert!(served.outcome.is_none());
}

#[test]
fn test_router_reusable_across_requests() {
    let trace = Trace::new();
    let mut router = Router::new();
    router.get("/:n", trace.pass("n")).unwrap();
    for i in 0..5 {
        let served = router.serve(get(&format!("/{i}")));
        assert_eq!(served.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(trace.entries().len(), 5);
}
