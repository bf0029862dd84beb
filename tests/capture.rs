//  ██████╗  █████╗ ███████╗███████╗██╗███╗   ██╗ ██████╗
//  ██╔══██╗██╔══██╗██╔════╝██╔════╝██║████╗  ██║██╔════╝
//  ██████╔╝███████║███████╗███████╗██║██╔██╗ ██║██║  ███╗
//  ██╔═══╝ ██╔══██║╚════██║╚════██║██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║███████║███████║██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

mod common;

#[cfg(test)]
mod passing {
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use pagedump::browser::{AbortReason, Verdict};
    use pagedump::core::rewrite_document;
    use pagedump::parsers::{collect_stylesheets, StylesheetBundle};
    use pagedump::utils::{base_uri, Url};
    use pagedump::{Blocklist, DumpOptions, NamingPolicy};

    use crate::common::{
        dumper, dumper_with_blocklist, entry_html, fast_options, FakeBrowser, MemoryFetcher,
        TARGET,
    };

    const PNG: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0Apixels";

    fn page(body: &str) -> String {
        format!("<html><head><title>Game</title></head><body>{body}</body></html>")
    }

    #[tokio::test]
    async fn same_origin_image_keeps_its_path() {
        let browser = Arc::new(FakeBrowser::new(&["https://example.com/game/img.png"]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(TARGET, 200, "text/html", page("<img src=\"img.png\">"))
                .serve("https://example.com/game/img.png", 200, "image/png", PNG),
        );

        let results = dumper(browser.clone(), fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let image = results.get("img.png").unwrap();
        assert_eq!(image.data, PNG);
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.size, PNG.len());

        let html = entry_html(&results);
        assert!(html.contains("<img src=\"img.png\">"));
        assert!(html.contains("<title>Game (Captured by pagedump)</title>"));
        assert_eq!(results.title, "Game (Captured by pagedump)");
        assert_eq!(
            results.entry_document().unwrap().content_type,
            "text/html; charset=utf-8"
        );
        assert_eq!(browser.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_identity_has_exactly_one_resource() {
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/img.png",
            "https://example.com/game/js/main.js",
            "https://cdn.other.com/lib.js",
            "https://example.com/game/missing.png",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    page(
                        "<img src=\"img.png\"><script src=\"js/main.js\"></script>\
                         <script src=\"https://cdn.other.com/lib.js\"></script>",
                    ),
                )
                .serve("https://example.com/game/img.png", 200, "image/png", PNG)
                .serve(
                    "https://example.com/game/js/main.js",
                    200,
                    "application/javascript",
                    "start();",
                )
                .serve(
                    "https://cdn.other.com/lib.js",
                    200,
                    "application/javascript",
                    "lib();",
                ),
        );

        let results = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let mapped: BTreeSet<&str> = results.identities.values().map(String::as_str).collect();
        assert_eq!(mapped.len(), results.identities.len());
        for path in &mapped {
            assert!(results.get(path).is_some(), "no resource for {path}");
        }
        for path in results.paths() {
            assert!(mapped.contains(path), "orphaned resource {path}");
        }

        assert!(results.get("js/main.js").is_some());
        assert!(results.get("ext/cdn.other.com/lib.js").is_some());
        assert!(results.get("missing.png").is_none());
        assert_eq!(
            results.identities.get("https://example.com/game/index.html").map(String::as_str),
            Some("index.html")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_capture_once() {
        let requests: Vec<String> = (0..16)
            .map(|i| format!("https://example.com/game/sprite.png?frame={i}"))
            .collect();
        let requests: Vec<&str> = requests.iter().map(String::as_str).collect();

        let browser = Arc::new(FakeBrowser::new(&requests));
        let fetcher = Arc::new(
            MemoryFetcher::with_delay(Duration::from_millis(50))
                .serve(TARGET, 200, "text/html", page("<img src=\"sprite.png\">"))
                .serve("https://example.com/game/sprite.png", 200, "image/png", PNG),
        );

        let results = dumper(browser.clone(), fetcher.clone())
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.get("sprite.png").is_some());
        assert_eq!(fetcher.calls("https://example.com/game/sprite.png"), 16);

        // Every duplicate still received the bytes
        let verdicts = browser.verdicts.lock().unwrap();
        assert_eq!(verdicts.len(), 16);
        for (_, verdict) in verdicts.iter() {
            match verdict {
                Verdict::Respond(fulfillment) => assert_eq!(fulfillment.body, PNG),
                other => panic!("unexpected verdict {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn rewriting_a_snapshot_again_changes_nothing() {
        let html = "<html><head><title>Game</title><base href=\"/\">\
                    <link rel=\"stylesheet\" href=\"style.css\"></head>\
                    <body><div style=\"background: url(bg.png)\"></div><img src=\"img.png\">\
                    <iframe src=\"ad.html\"></iframe></body></html>";
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/style.css",
            "https://example.com/game/img.png",
            "https://example.com/game/bg.png",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(TARGET, 200, "text/html", html)
                .serve(
                    "https://example.com/game/style.css",
                    200,
                    "text/css",
                    "h1 { background: url(img.png) }",
                )
                .serve("https://example.com/game/img.png", 200, "image/png", PNG)
                .serve("https://example.com/game/bg.png", 200, "image/png", PNG),
        );

        let results = dumper(browser, fetcher.clone())
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let target = Url::parse(TARGET).unwrap();
        let base = base_uri(&target);
        let rewrite = |html: &str, bundle: &StylesheetBundle| {
            rewrite_document(html, &results.identities, &target, &base, true, bundle).unwrap()
        };

        let demand = collect_stylesheets(html, &base);
        let bundle = StylesheetBundle::load(
            demand.linked,
            &demand.inline,
            &results.identities,
            &results.resources,
            fetcher.as_ref(),
            &target,
        )
        .await
        .unwrap();
        let first = rewrite(html, &bundle);

        let snapshot = entry_html(&results);
        assert!(snapshot.contains(&first.body));
        let second = rewrite(&snapshot, &StylesheetBundle::default());

        assert_eq!(second.title, first.title);
        assert_eq!(second.head, first.head);
        assert_eq!(second.body, first.body);
    }

    #[tokio::test]
    async fn cross_origin_resource_dropped_when_disabled() {
        let browser = Arc::new(FakeBrowser::new(&["https://cdn.other.com/a.png"]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    page("<p>hi</p><img src=\"https://cdn.other.com/a.png\">"),
                )
                .serve("https://cdn.other.com/a.png", 200, "image/png", PNG),
        );

        let options = DumpOptions {
            cross_origin: false,
            ..fast_options()
        };
        let results = dumper(browser.clone(), fetcher)
            .capture(TARGET, &options)
            .await
            .unwrap();

        let html = entry_html(&results);
        assert!(!html.contains("<img"));
        assert!(html.contains("<p>hi</p>"));
        assert!(!results.identities.contains_key("https://cdn.other.com/a.png"));
        assert_eq!(results.len(), 1);

        // The page itself was still served
        assert!(matches!(
            browser.verdict_for("https://cdn.other.com/a.png"),
            Some(Verdict::Respond(_))
        ));
    }

    #[tokio::test]
    async fn cross_origin_resource_namespaced_when_allowed() {
        let browser = Arc::new(FakeBrowser::new(&["https://cdn.other.com/a.png"]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    page("<img src=\"https://cdn.other.com/a.png\">"),
                )
                .serve("https://cdn.other.com/a.png", 200, "image/png", PNG),
        );

        let results = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        assert!(results.get("ext/cdn.other.com/a.png").is_some());
        assert!(entry_html(&results).contains("<img src=\"ext/cdn.other.com/a.png\">"));
    }

    #[tokio::test]
    async fn anonymized_paths_are_numeric_ids() {
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/a.png",
            "https://example.com/game/sfx/b.ogg",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    page("<img src=\"a.png\"><audio src=\"sfx/b.ogg\"></audio>"),
                )
                .serve("https://example.com/game/a.png", 200, "image/png", PNG)
                .serve("https://example.com/game/sfx/b.ogg", 200, "audio/ogg", "OggS"),
        );

        let options = DumpOptions {
            naming: NamingPolicy::Anonymize,
            ..fast_options()
        };
        let results = dumper(browser, fetcher)
            .capture(TARGET, &options)
            .await
            .unwrap();

        let image = results.identities["https://example.com/game/a.png"].clone();
        let audio = results.identities["https://example.com/game/sfx/b.ogg"].clone();
        assert_ne!(image, audio);

        for (path, extension) in [(&image, ".png"), (&audio, ".ogg")] {
            let id = path
                .strip_prefix("r/")
                .and_then(|rest| rest.strip_suffix(extension))
                .unwrap_or_else(|| panic!("unexpected path {path}"));
            assert!(!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
            assert!(results.get(path).is_some());
        }

        let html = entry_html(&results);
        assert!(html.contains(&format!("<img src=\"{image}\">")));
        assert!(html.contains(&format!("<audio src=\"{audio}\">")));
        assert!(html.contains(&format!("\"https://example.com/game/a.png\": \"{image}\"")));
    }

    #[tokio::test]
    async fn stylesheet_imports_are_inlined_in_place() {
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/style.css",
            "https://example.com/game/fonts.css",
            "https://example.com/game/font.woff2",
            "https://example.com/game/bg.png",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    "<html><head><link rel=\"stylesheet\" href=\"style.css\"></head>\
                     <body></body></html>",
                )
                .serve(
                    "https://example.com/game/style.css",
                    200,
                    "text/css",
                    "@import \"fonts.css\";\nbody { background: url(bg.png) }",
                )
                .serve(
                    "https://example.com/game/fonts.css",
                    200,
                    "text/css; charset=utf-8",
                    "@font-face { font-family: Game; src: url(font.woff2) }",
                )
                .serve("https://example.com/game/font.woff2", 200, "font/woff2", "wOF2")
                .serve("https://example.com/game/bg.png", 200, "image/png", PNG),
        );

        let results = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let html = entry_html(&results);
        assert!(!html.contains("@import"));
        assert!(!html.contains("<link"));
        assert!(html.contains("<style type=\"text/css\">"));

        let font_face = html.find("@font-face").unwrap();
        let body_rule = html.find("body {").unwrap();
        assert!(font_face < body_rule);
        assert!(html.contains("url(\"font.woff2\")"));
        assert!(html.contains("url(\"bg.png\")"));
        assert_eq!(results.title, "Page (Captured by pagedump)");
    }

    #[tokio::test]
    async fn stylesheet_references_resolve_against_the_stylesheet() {
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/css/style.css",
            "https://example.com/game/img.png",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    "<html><head><link rel=\"stylesheet\" href=\"css/style.css\"></head>\
                     <body><img src=\"img.png\"></body></html>",
                )
                .serve(
                    "https://example.com/game/css/style.css",
                    200,
                    "text/css",
                    ".hero { background: url(img.png) }",
                )
                .serve("https://example.com/game/img.png", 200, "image/png", PNG),
        );

        let results = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let html = entry_html(&results);
        assert!(html.contains("<img src=\"img.png\">"));
        assert!(html.contains("url(\"\")"));
        assert!(!html.contains("url(img.png)"));
        assert!(!html.contains("url(\"img.png\")"));
    }

    #[tokio::test]
    async fn blocklisted_hosts_are_aborted() {
        let browser = Arc::new(FakeBrowser::new(&["https://ads.tracker.com/pixel.gif"]));
        let fetcher = Arc::new(MemoryFetcher::new().serve(
            TARGET,
            200,
            "text/html",
            page("<img src=\"https://ads.tracker.com/pixel.gif\">"),
        ));

        let blocklist = Blocklist::from_hosts_file("# ads\n0.0.0.0 ads.tracker.com\n");
        let results = dumper_with_blocklist(browser.clone(), fetcher.clone(), blocklist)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        assert_eq!(
            browser.verdict_for("https://ads.tracker.com/pixel.gif"),
            Some(Verdict::Abort(AbortReason::BlockedByClient))
        );
        assert_eq!(fetcher.calls("https://ads.tracker.com/pixel.gif"), 0);
        assert!(!entry_html(&results).contains("<img"));
    }

    #[tokio::test]
    async fn failed_fetches_fall_through_to_the_page() {
        let browser = Arc::new(FakeBrowser::new(&[
            "https://example.com/game/flaky.png",
            "data:text/plain,hello",
        ]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(TARGET, 200, "text/html", page("<img src=\"flaky.png\">"))
                .break_url("https://example.com/game/flaky.png"),
        );

        let results = dumper(browser.clone(), fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        assert_eq!(
            browser.verdict_for("https://example.com/game/flaky.png"),
            Some(Verdict::Continue)
        );
        assert_eq!(
            browser.verdict_for("data:text/plain,hello"),
            Some(Verdict::Continue)
        );
        assert!(results.get("flaky.png").is_none());
        assert!(!entry_html(&results).contains("flaky.png\">"));
    }

    #[tokio::test]
    async fn final_location_is_recorded() {
        let mut browser = FakeBrowser::new(&[]);
        browser.location = Some("https://example.com/game/play.html#level-2".to_string());
        let fetcher = Arc::new(MemoryFetcher::new().serve(TARGET, 200, "text/html", page("")));

        let results = dumper(Arc::new(browser), fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap();

        let html = entry_html(&results);
        assert!(html.contains("<!-- Captured from https://example.com/game/play.html at "));
        assert!(html.contains("<script id=\"pagedump-shim\""));
    }

    #[tokio::test]
    async fn sessions_run_concurrently() {
        let browser = Arc::new(FakeBrowser::new(&["https://example.com/game/img.png"]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(TARGET, 200, "text/html", page("<img src=\"img.png\">"))
                .serve("https://example.com/game/img.png", 200, "image/png", PNG),
        );
        let dumper = dumper(browser.clone(), fetcher);
        let options = fast_options();

        let (first, second) = tokio::join!(
            dumper.capture(TARGET, &options),
            dumper.capture(TARGET, &options)
        );

        assert_eq!(first.unwrap().len(), 2);
        assert_eq!(second.unwrap().len(), 2);
        assert_eq!(browser.pages_opened.load(Ordering::SeqCst), 2);
        assert_eq!(browser.pages_closed.load(Ordering::SeqCst), 2);
    }
}

//  ███████╗ █████╗ ██╗██╗     ██╗███╗   ██╗ ██████╗
//  ██╔════╝██╔══██╗██║██║     ██║████╗  ██║██╔════╝
//  █████╗  ███████║██║██║     ██║██╔██╗ ██║██║  ███╗
//  ██╔══╝  ██╔══██║██║██║     ██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║██║███████╗██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚═╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

#[cfg(test)]
mod failing {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use pagedump::DumpError;

    use crate::common::{dumper, fast_options, FakeBrowser, MemoryFetcher, TARGET};

    #[tokio::test]
    async fn not_found_page_is_a_navigation_error() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let fetcher = Arc::new(MemoryFetcher::new().serve(TARGET, 404, "text/html", "gone"));

        let error = dumper(browser.clone(), fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::Navigation(_)));
        assert!(error.is_page_load_failure());
        assert_eq!(browser.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_without_response_is_a_navigation_error() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let fetcher = Arc::new(MemoryFetcher::new().break_url(TARGET));

        let error = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::Navigation(_)));
    }

    #[tokio::test]
    async fn unsupported_scheme_never_opens_a_page() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let error = dumper(browser.clone(), Arc::new(MemoryFetcher::new()))
            .capture("file:///etc/passwd", &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::Protocol(_)));
        assert!(error.is_page_load_failure());
        assert_eq!(browser.pages_opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let error = dumper(browser, Arc::new(MemoryFetcher::new()))
            .capture("example.com/game", &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn missing_stylesheet_aborts_the_dump() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let fetcher = Arc::new(MemoryFetcher::new().serve(
            TARGET,
            200,
            "text/html",
            "<html><head><link rel=\"stylesheet\" href=\"missing.css\"></head></html>",
        ));

        let error = dumper(browser.clone(), fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::StylesheetFetch { .. }));
        assert!(!error.is_page_load_failure());
        assert_eq!(browser.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn imported_stylesheet_with_wrong_type_aborts_the_dump() {
        let browser = Arc::new(FakeBrowser::new(&[]));
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .serve(
                    TARGET,
                    200,
                    "text/html",
                    "<html><head><style>@import url(theme.css);</style></head></html>",
                )
                .serve("https://example.com/game/theme.css", 200, "text/plain", "p {}"),
        );

        let error = dumper(browser, fetcher)
            .capture(TARGET, &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(error, DumpError::StylesheetFetch { .. }));
    }
}
