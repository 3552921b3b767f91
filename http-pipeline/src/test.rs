use crate::{
    pattern::split_path, validate_patterns, AmbiguousPatternError, Clock,
    ClientCache, IdentityConfig, IdentityErrorKind, IdentityResolutionError,
    InvalidPolicyError, ManualClock, Pattern, RateLimitOptions, Result,
    RouteTable, Segment, SessionPolicy, SessionTracker,
};
use http::{HeaderMap, HeaderValue, Request};

use std::cmp::Ordering;
use std::net::SocketAddr;
use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);

fn policy(max: u64, window: Duration, ban: Duration) -> SessionPolicy {
    SessionPolicy::new(max, window, ban).unwrap()
}

#[test]
fn split_drops_leading_separator() {
    assert_eq!(split_path("/users/42").collect::<Vec<_>>(), ["users", "42"]);
    assert_eq!(split_path("users/42").collect::<Vec<_>>(), ["users", "42"]);
    assert_eq!(split_path("/").collect::<Vec<_>>(), [""]);
    assert_eq!(split_path("/users/").collect::<Vec<_>>(), ["users", ""]);
}

#[test]
fn pattern_parses_captures() {
    let pattern = Pattern::parse("/users/:id/orders");
    assert_eq!(
        pattern.segments(),
        &[
            Segment::Literal("users".into()),
            Segment::Capture("id".into()),
            Segment::Literal("orders".into()),
        ]
    );
    assert_eq!(pattern.capture_names().collect::<Vec<_>>(), ["id"]);
    assert_eq!(pattern.to_string(), "/users/:id/orders");
}

#[test]
fn pattern_ordering() {
    let short = Pattern::parse("/users");
    let long = Pattern::parse("/a/b");
    assert_eq!(short.compare(&long), Ordering::Less);
    assert_eq!(long.compare(&short), Ordering::Greater);

    let a = Pattern::parse("/users/a");
    let b = Pattern::parse("/users/b");
    assert_eq!(a.compare(&b), Ordering::Less);

    let capture = Pattern::parse("/users/:id");
    assert_eq!(a.compare(&capture), Ordering::Less);
    assert_eq!(capture.compare(&b), Ordering::Greater);
    assert_eq!(
        capture.compare(&Pattern::parse("/users/:name")),
        Ordering::Equal
    );
}

#[test]
fn pattern_ordering_is_total() {
    let patterns: Vec<Pattern> = [
        "/",
        "/users",
        "/:any",
        "/users/:id",
        "/users/me",
        "/users/:id/orders",
        "/users/me/orders",
        "/:a/me/:b",
        "/admin/:x/settings",
    ]
    .into_iter()
    .map(Pattern::parse)
    .collect();

    for p in &patterns {
        assert_eq!(p.compare(p), Ordering::Equal, "{p}");
        for q in &patterns {
            assert_eq!(p.compare(q), q.compare(p).reverse(), "{p} vs {q}");
            for r in &patterns {
                if p.compare(q).is_le() && q.compare(r).is_le() {
                    assert!(p.compare(r).is_le(), "{p} <= {q} <= {r}");
                }
            }
        }
    }
}

#[test]
fn pattern_matches_path() {
    let pattern = Pattern::parse("/users/:id/orders");
    assert_eq!(pattern.compare_path("/users/42/orders"), Ordering::Equal);
    assert_eq!(pattern.compare_path("/users/42"), Ordering::Greater);
    assert_eq!(pattern.compare_path("/users/42/zzz"), Ordering::Less);

    let params = pattern.match_path("/users/42/orders").unwrap();
    assert_eq!(params.get("id"), Some("42"));
    assert_eq!(params.len(), 1);
    assert!(pattern.match_path("/users/42/invoices").is_none());
}

#[test]
fn ambiguous_capture_names_are_rejected() {
    let patterns = [
        Pattern::parse("/users/:id"),
        Pattern::parse("/teams/:id"),
        Pattern::parse("/users/:name"),
    ];
    let err = validate_patterns(&patterns).unwrap_err();
    assert_eq!(
        err,
        AmbiguousPatternError {
            pattern: "/users/:name".into(),
            conflicts_with: "/users/:id".into(),
        }
    );
    assert!(validate_patterns(&patterns[..2]).is_ok());
}

#[test]
fn ambiguity_is_checked_against_every_route() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/a/:x", 1)?;
    table.insert("/b/:x", 2)?;
    table.insert("/c/:x", 3)?;
    let err = table.insert("/b/:y", 4).unwrap_err();
    assert_eq!(err.conflicts_with, "/b/:x");
    assert_eq!(table.len(), 3);
    assert!(table.routes().iter().all(|r| *r.handler() != 4));
    Ok(())
}

#[test]
fn route_table_dispatch() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/users/:id/orders", "orders")?;
    table.insert("/users/:id", "user")?;

    let found = table.lookup("/users/42").unwrap();
    assert_eq!(*found.handler, "user");
    assert_eq!(found.params.get("id"), Some("42"));

    let found = table.lookup("/users/42/orders").unwrap();
    assert_eq!(*found.handler, "orders");
    assert_eq!(found.params.get("id"), Some("42"));
    assert_eq!(found.pattern.as_str(), "/users/:id/orders");

    assert!(table.lookup("/users").is_none());
    assert!(table.lookup("/users/42/refunds").is_none());
    Ok(())
}

#[test]
fn route_table_is_kept_sorted() -> Result<()> {
    let mut table = RouteTable::new();
    for pattern in ["/b/:x", "/a", "/:x/c", "/a/b"] {
        table.insert(pattern, ())?;
    }
    let order: Vec<&str> =
        table.routes().iter().map(|r| r.pattern().as_str()).collect();
    assert_eq!(order, ["/a", "/a/b", "/b/:x", "/:x/c"]);
    Ok(())
}

#[test]
fn route_table_finds_overlapping_capture() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/a/a/a", "a")?;
    table.insert("/a/b/z", "z")?;
    table.insert("/a/:x/c", "c")?;

    let found = table.lookup("/a/b/c").unwrap();
    assert_eq!(*found.handler, "c");
    assert_eq!(found.params.get("x"), Some("b"));

    assert_eq!(*table.lookup("/a/b/z").unwrap().handler, "z");
    assert!(table.lookup("/a/b/d").is_none());
    Ok(())
}

#[test]
fn route_table_prefers_literals() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/users/:id", "user")?;
    table.insert("/users/:id/orders", "orders")?;
    table.insert("/users/me", "me")?;
    table.insert("/:section/me", "section")?;

    let found = table.lookup("/users/me").unwrap();
    assert_eq!(*found.handler, "me");
    assert!(found.params.is_empty());
    assert_eq!(*table.lookup("/users/7").unwrap().handler, "user");
    assert_eq!(*table.lookup("/groups/me").unwrap().handler, "section");
    Ok(())
}

#[test]
fn route_table_literal_root() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/", "root")?;
    assert_eq!(*table.lookup("/").unwrap().handler, "root");
    assert!(table.lookup("/x").is_none());
    Ok(())
}

#[test]
fn empty_segment_collides_with_capture() -> Result<()> {
    assert!(Pattern::parse("/a/").is_ambiguous_with(&Pattern::parse("/a/:x")));
    assert!(Pattern::parse("/").is_ambiguous_with(&Pattern::parse("/:any")));
    assert!(!Pattern::parse("/a/b").is_ambiguous_with(&Pattern::parse("/a/:x")));

    let mut table = RouteTable::new();
    table.insert("/a/", "slash")?;
    let err = table.insert("/a/:x", "capture").unwrap_err();
    assert_eq!(err.pattern, "/a/:x");
    assert_eq!(err.conflicts_with, "/a/");
    assert_eq!(table.len(), 1);
    assert_eq!(*table.lookup("/a/").unwrap().handler, "slash");
    assert!(table.lookup("/a/b").is_none());
    Ok(())
}

#[test]
fn leftmost_literal_wins() -> Result<()> {
    let mut table = RouteTable::new();
    table.insert("/a/:x/c", "late-literal")?;
    table.insert("/a/b/:y", "early-literal")?;
    table.insert("/a/:x/:y", "captures")?;

    let found = table.lookup("/a/b/c").unwrap();
    assert_eq!(*found.handler, "early-literal");
    assert_eq!(found.params.get("y"), Some("c"));
    assert_eq!(*table.lookup("/a/z/c").unwrap().handler, "late-literal");
    assert_eq!(*table.lookup("/a/z/z").unwrap().handler, "captures");
    Ok(())
}

#[test]
fn lookup_agrees_with_table_order() -> Result<()> {
    let mut table = RouteTable::new();
    for pattern in [
        "/users/:id",
        "/users/me",
        "/:section/me",
        "/:section/:id",
        "/users/:id/orders",
        "/users/me/:tab",
        "/:a/me/orders",
    ] {
        table.insert(pattern, pattern)?;
    }
    for path in [
        "/users/me",
        "/users/7",
        "/teams/me",
        "/teams/7",
        "/users/me/orders",
        "/users/7/orders",
        "/teams/me/orders",
        "/teams/7/orders",
    ] {
        let expected = table
            .routes()
            .iter()
            .find(|r| r.pattern().match_path(path).is_some())
            .map(|r| *r.handler());
        assert_eq!(table.lookup(path).map(|m| *m.handler), expected, "{path}");
    }
    Ok(())
}

#[test]
fn large_table_finds_every_route() -> Result<()> {
    let mut table = RouteTable::new();
    for n in 0..300 {
        table.insert(format!("/r{n:05}/x").as_str(), n)?;
    }
    table.insert("/r00042/:tail", -1)?;
    for n in [0, 1, 150, 299] {
        let found = table.lookup(&format!("/r{n:05}/x")).unwrap();
        assert_eq!(*found.handler, n);
    }
    assert_eq!(*table.lookup("/r00042/y").unwrap().handler, -1);
    assert!(table.lookup("/r00300/x").is_none());
    Ok(())
}

#[test]
fn policy_rejects_zero_values() {
    assert_eq!(
        SessionPolicy::new(0, SECOND, SECOND),
        Err(InvalidPolicyError::ZeroMaxRequests)
    );
    assert_eq!(
        SessionPolicy::new(1, Duration::ZERO, SECOND),
        Err(InvalidPolicyError::ZeroSessionDuration)
    );
    assert_eq!(
        SessionPolicy::new(1, SECOND, Duration::ZERO),
        Err(InvalidPolicyError::ZeroBanDuration)
    );
}

#[test]
fn over_limit_request_is_banned_until_rollover() {
    let clock = ManualClock::new();
    let policy = policy(3, 10 * SECOND, SECOND);
    let mut tracker = SessionTracker::new(policy, clock.now());
    for _ in 1..3 {
        clock.advance(SECOND);
        tracker = tracker.advance(clock.now());
        assert!(!tracker.is_banned(clock.now()));
    }
    assert_eq!(tracker.request_count(), 3);

    // Every request past the limit renews the ban until the window closes.
    for _ in 0..5 {
        clock.advance(SECOND);
        tracker = tracker.advance(clock.now());
        assert!(tracker.is_banned(clock.now()));
    }
    assert_eq!(tracker.request_count(), 8);
}

#[test]
fn ban_survives_rollover_after_violation() {
    let clock = ManualClock::new();
    let policy = policy(1, 10 * SECOND, 30 * SECOND);
    let mut tracker = SessionTracker::new(policy, clock.now());
    tracker = tracker.advance(clock.now());
    assert!(tracker.is_banned(clock.now()));

    clock.advance(10 * SECOND);
    tracker = tracker.advance(clock.now());
    assert_eq!(tracker.request_count(), 1);
    assert_eq!(tracker.window_start(), clock.now());
    assert_eq!(tracker.banned_at(), Some(clock.now()));
    assert!(tracker.is_banned(clock.now()));

    // In limits, but the 30s ban is still running.
    clock.advance(29 * SECOND);
    tracker = tracker.advance(clock.now());
    assert!(tracker.is_banned(clock.now()));

    clock.advance(SECOND);
    assert!(!tracker.is_banned(clock.now()));
}

#[test]
fn lapsed_ban_is_cleared_on_in_limit_rollover() {
    let clock = ManualClock::new();
    let policy = policy(1, 10 * SECOND, 5 * SECOND);
    let mut tracker = SessionTracker::new(policy, clock.now());
    tracker = tracker.advance(clock.now());
    assert!(tracker.banned_at().is_some());

    clock.advance(10 * SECOND);
    tracker = tracker.advance(clock.now());
    assert!(tracker.is_banned(clock.now()));

    clock.advance(5 * SECOND);
    assert!(!tracker.is_banned(clock.now()));
    assert!(tracker.banned_at().is_some());

    clock.advance(5 * SECOND);
    tracker = tracker.advance(clock.now());
    assert_eq!(tracker.banned_at(), None);
    assert!(!tracker.is_banned(clock.now()));
}

#[test]
fn any_policy_bans_the_client() {
    let clock = ManualClock::new();
    let burst = policy(2, SECOND, 10 * SECOND);
    let sustained = policy(100, 60 * SECOND, 60 * SECOND);
    let cache = ClientCache::new(vec![burst, sustained], Duration::from_secs(60));

    assert!(!cache.touch("client", clock.now()));
    assert!(!cache.touch("client", clock.now()));
    assert!(cache.touch("client", clock.now()));

    let entry = cache.entry("client").unwrap();
    assert!(entry.sessions()[0].is_banned(clock.now()));
    assert!(!entry.sessions()[1].is_banned(clock.now()));
    assert_eq!(entry.sessions()[1].request_count(), 3);
}

#[test]
fn cache_replaces_entries() {
    let clock = ManualClock::new();
    let cache = RateLimitOptions::default()
        .with_policy(policy(10, SECOND, SECOND))
        .build_cache();
    cache.touch("a", clock.now());
    let first = cache.entry("a").unwrap();
    clock.advance(Duration::from_millis(10));
    cache.touch("a", clock.now());
    let second = cache.entry("a").unwrap();

    assert_eq!(first.sessions()[0].request_count(), 1);
    assert_eq!(second.sessions()[0].request_count(), 2);
    assert_eq!(second.last_updated(), clock.now());
}

#[test]
fn groom_evicts_idle_entries() {
    let clock = ManualClock::new();
    let cache = ClientCache::new(
        vec![policy(10, SECOND, SECOND)],
        Duration::from_secs(60),
    );
    cache.touch("stale", clock.now());
    clock.advance(Duration::from_secs(30));
    cache.touch("fresh", clock.now());

    clock.advance(Duration::from_secs(30));
    assert_eq!(cache.groom(clock.now()), 0, "exactly at the threshold");

    clock.advance(SECOND);
    assert_eq!(cache.groom(clock.now()), 1);
    assert!(cache.entry("stale").is_none());
    assert!(cache.entry("fresh").is_some());
    assert_eq!(cache.len(), 1);

    clock.advance(Duration::from_secs(60));
    cache.groom(clock.now());
    assert!(cache.is_empty());
}

#[test]
fn concurrent_clients_keep_exact_counts() {
    let clock = ManualClock::new();
    let now = clock.now();
    let cache = ClientCache::new(
        vec![policy(10_000, Duration::from_secs(3600), SECOND)],
        Duration::from_secs(3600),
    );

    std::thread::scope(|scope| {
        for client in 0..8 {
            let cache = &cache;
            scope.spawn(move || {
                let identity = format!("10.0.0.{client}");
                for _ in 0..(100 + client * 10) {
                    cache.touch(&identity, now);
                }
            });
        }
    });

    for client in 0..8u64 {
        let entry = cache.entry(&format!("10.0.0.{client}")).unwrap();
        assert_eq!(entry.sessions()[0].request_count(), 100 + client * 10);
    }
}

fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(*name, HeaderValue::from_static(*value));
    }
    map
}

#[test]
fn identity_prefers_trusted_proxy_header() -> Result<()> {
    let config = IdentityConfig::default();
    let map = headers(&[
        ("x-forwarded-for", "10.0.0.1"),
        ("fastly-client-ip", "192.0.2.7"),
    ]);
    assert_eq!(config.resolve_from(&map, None)?, "192.0.2.7");
    Ok(())
}

#[test]
fn identity_uses_last_forwarded_hop() -> Result<()> {
    let config = IdentityConfig::default();
    let map = headers(&[
        ("x-forwarded-for", "198.51.100.1"),
        ("x-forwarded-for", "203.0.113.9, 10.1.1.1"),
    ]);
    assert_eq!(config.resolve_from(&map, None)?, "10.1.1.1");
    Ok(())
}

#[test]
fn identity_falls_back_to_connection_address() -> Result<()> {
    let addr: SocketAddr = "127.0.0.1:4000".parse()?;
    let mut req = Request::get("/").body(())?;
    req.extensions_mut().insert(addr);
    assert_eq!(IdentityConfig::default().resolve(&req)?, "127.0.0.1");

    // An empty trusted proxy header is treated as absent.
    req.headers_mut().insert("fastly-client-ip", HeaderValue::from_static(""));
    assert_eq!(IdentityConfig::default().resolve(&req)?, "127.0.0.1");
    Ok(())
}

#[test]
fn identity_errors() -> Result<()> {
    let config = IdentityConfig::default();
    let err = config.resolve_from(&HeaderMap::new(), None).unwrap_err();
    assert_eq!(err.kind(), &IdentityErrorKind::Missing);

    let mut map = HeaderMap::new();
    map.insert("x-forwarded-for", HeaderValue::from_bytes(b"\xff")?);
    let err = config.resolve_from(&map, None).unwrap_err();
    assert_eq!(err, IdentityResolutionError::invalid_header("x-forwarded-for"));

    let map = headers(&[("x-forwarded-for", "10.0.0.1, ")]);
    assert!(config.resolve_from(&map, None).is_err());

    let skip_headers = IdentityConfig {
        trusted_proxy_header: None,
        forwarded_for_header: None,
    };
    let map = headers(&[("x-forwarded-for", "10.0.0.1")]);
    assert!(skip_headers.resolve_from(&map, None).is_err());
    Ok(())
}

#[test]
fn options_from_config_values() -> Result<()> {
    let options: RateLimitOptions = serde_json::from_str(
        r#"{
            "policies": [
                {
                    "max_requests": 5,
                    "session_duration": { "secs": 1, "nanos": 0 },
                    "ban_duration": { "secs": 30, "nanos": 0 }
                }
            ],
            "idle_threshold": { "secs": 120, "nanos": 0 }
        }"#,
    )?;
    assert_eq!(options.policies, vec![policy(5, SECOND, 30 * SECOND)]);
    assert_eq!(options.idle_threshold, Duration::from_secs(120));
    assert_eq!(options.groom_interval, Duration::from_secs(10));
    assert_eq!(options.identity, IdentityConfig::default());

    let invalid = serde_json::from_str::<SessionPolicy>(
        r#"{
            "max_requests": 0,
            "session_duration": { "secs": 1, "nanos": 0 },
            "ban_duration": { "secs": 1, "nanos": 0 }
        }"#,
    );
    assert!(invalid.is_err());
    Ok(())
}

#[test]
fn error_messages() {
    assert_eq!(
        IdentityResolutionError::missing().to_string(),
        "determining client identity: no applicable host"
    );
    assert_eq!(
        IdentityResolutionError::invalid_header("x-forwarded-for").to_string(),
        "determining client identity: unusable value in header x-forwarded-for"
    );
    let err = AmbiguousPatternError {
        pattern: "/a/:y".into(),
        conflicts_with: "/a/:x".into(),
    };
    assert_eq!(
        err.to_string(),
        "ambiguous capture variable names: /a/:y conflicts with /a/:x"
    );
    assert_eq!(
        InvalidPolicyError::ZeroBanDuration.to_string(),
        "session policy ban must be longer than zero"
    );
}
