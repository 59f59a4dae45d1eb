use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use watcher_core::{
    ChannelResult, CodeHit, CodeScanner, NotificationBatch, RunReport, Source, SourceResult,
};
use watcher_engine::{
    AtomicFileWriter, Channel, CodeStore, FetchSettings, Notifier, NotifyError, NullSink,
    ProgressSink, ReqwestFetcher, StoreError, VisibleTextExtractor, WatchEvent, Watcher,
    WebhookChannel, WebhookSettings,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROMO_PAGE: &str = "<html><head><title>Weekly keys</title></head><body>\
    <p>Redeem code SHIFT-ABCD-1234-EFGH for Golden Keys</p>\
    <script>const decoy = 'QQQQQ-WWWWW-EEEEE';</script>\
    </body></html>";

fn watcher(notifier: Notifier) -> Watcher {
    engine_logging::initialize_for_tests();
    Watcher::new(
        Arc::new(ReqwestFetcher::new(FetchSettings::default())),
        Arc::new(VisibleTextExtractor::default()),
        CodeScanner::default(),
        notifier,
    )
}

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) -> String {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
    format!("{}{}", server.uri(), route)
}

fn codes(report: &RunReport) -> Vec<&str> {
    report.new_codes.iter().map(|hit| hit.code.as_str()).collect()
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<WatchEvent>>,
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: WatchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct CountingChannel {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Channel for CountingChannel {
    fn name(&self) -> &str {
        "counting"
    }

    async fn deliver(&self, _batch: &NotificationBatch) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn second_run_against_unchanged_source_finds_nothing_new() {
    let server = MockServer::start().await;
    let url = serve(
        &server,
        "/promo",
        ResponseTemplate::new(200).set_body_raw(PROMO_PAGE, "text/html; charset=utf-8"),
    )
    .await;
    let sources = vec![Source::html(url)];
    let store = CodeStore::open_in_memory().unwrap();
    let watcher = watcher(Notifier::default());

    let first = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert!(codes(&first).contains(&"SHIFT-ABCD-1234-EFGH"));
    assert!(!codes(&first).iter().any(|code| code.contains("QQQQQ")));
    assert_eq!(first.sources_scanned(), 1);
    assert_eq!(first.candidates, first.new_codes.len());

    let second = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert!(second.new_codes.is_empty());
    assert_eq!(second.candidates, first.candidates);
    assert_eq!(store.count().unwrap(), first.new_codes.len());
}

#[tokio::test]
async fn failing_source_does_not_hide_other_sources() {
    let server = MockServer::start().await;
    let broken = serve(&server, "/broken", ResponseTemplate::new(500)).await;
    let healthy = serve(
        &server,
        "/healthy.txt",
        ResponseTemplate::new(200).set_body_string("code: ABCDE-FGHIJ"),
    )
    .await;
    let sources = vec![Source::html(broken.clone()), Source::text(healthy.clone())];
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher(Notifier::default())
        .run_once(&sources, &store, &NullSink)
        .await
        .unwrap();

    assert_eq!(report.sources_failed(), 1);
    assert_eq!(report.sources[0].url, broken);
    assert!(matches!(
        report.sources[0].result,
        SourceResult::Failed { ref reason } if reason.contains("500")
    ));
    assert_eq!(report.new_codes, vec![CodeHit::new("ABCDE-FGHIJ", healthy)]);
}

#[tokio::test]
async fn unreadable_markup_only_skips_that_source() {
    let server = MockServer::start().await;
    let binary = serve(
        &server,
        "/binary",
        ResponseTemplate::new(200).set_body_raw("\u{0}\u{0}KLMNO-PQRST", "text/html; charset=utf-8"),
    )
    .await;
    let plain = serve(
        &server,
        "/plain.txt",
        ResponseTemplate::new(200).set_body_string("key: UVWXY-ZABCD"),
    )
    .await;
    let sources = vec![Source::html(binary), Source::text(plain)];
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher(Notifier::default())
        .run_once(&sources, &store, &NullSink)
        .await
        .unwrap();

    assert!(matches!(
        report.sources[0].result,
        SourceResult::Failed { ref reason } if reason.contains("extraction")
    ));
    assert_eq!(codes(&report), vec!["UVWXY-ZABCD"]);
}

#[tokio::test]
async fn earlier_source_wins_attribution_even_when_slower() {
    let server = MockServer::start().await;
    let first = serve(
        &server,
        "/first.txt",
        ResponseTemplate::new(200)
            .set_delay(Duration::from_millis(150))
            .set_body_string("first: KLMNO-PQRST"),
    )
    .await;
    let second = serve(
        &server,
        "/second.txt",
        ResponseTemplate::new(200).set_body_string("also: KLMNO-PQRST; and: UVWXY-ZABCD"),
    )
    .await;
    let sources = vec![Source::text(first.clone()), Source::text(second.clone())];
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher(Notifier::default())
        .run_once(&sources, &store, &NullSink)
        .await
        .unwrap();

    assert_eq!(
        report.new_codes,
        vec![
            CodeHit::new("KLMNO-PQRST", first.clone()),
            CodeHit::new("UVWXY-ZABCD", second),
        ]
    );
    assert_eq!(store.get("KLMNO-PQRST").unwrap().unwrap().source, first);
}

#[tokio::test]
async fn three_new_codes_make_one_webhook_call() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/feed.txt",
        ResponseTemplate::new(200).set_body_string("Codes: AAAAA-11111, BBBBB-22222, CCCCC-33333"),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let webhook =
        WebhookChannel::new(WebhookSettings::new(format!("{}/hook", server.uri()))).unwrap();
    let watcher = watcher(Notifier::new(vec![Box::new(webhook)]));
    let sources = vec![Source::text(feed)];
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert_eq!(codes(&report), vec!["AAAAA-11111", "BBBBB-22222", "CCCCC-33333"]);
    assert_eq!(report.channels.len(), 1);
    assert_eq!(report.channels[0].result, ChannelResult::Delivered);

    let hooks: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/hook")
        .collect();
    assert_eq!(hooks.len(), 1);
    let payload: serde_json::Value = serde_json::from_slice(&hooks[0].body).unwrap();
    let content = payload["content"].as_str().unwrap();
    for code in ["AAAAA-11111", "BBBBB-22222", "CCCCC-33333"] {
        assert!(content.contains(code));
    }

    // Nothing new on the next run, so no second webhook call.
    let again = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert!(again.new_codes.is_empty());
    assert!(again.channels.is_empty());
}

#[tokio::test]
async fn failed_delivery_keeps_codes_stored_and_does_not_resurface_them() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/feed.txt",
        ResponseTemplate::new(200).set_body_string("today: ABCDE-FGHIJ"),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let webhook =
        WebhookChannel::new(WebhookSettings::new(format!("{}/hook", server.uri()))).unwrap();
    let watcher = watcher(Notifier::new(vec![Box::new(webhook)]));
    let sources = vec![Source::text(feed)];
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert_eq!(report.channels_failed(), 1);
    assert!(store.contains("ABCDE-FGHIJ").unwrap());

    let again = watcher.run_once(&sources, &store, &NullSink).await.unwrap();
    assert!(again.new_codes.is_empty());
}

#[tokio::test]
async fn events_cover_every_source() {
    let server = MockServer::start().await;
    let ok = serve(
        &server,
        "/ok.txt",
        ResponseTemplate::new(200).set_body_string("code: ABCDE-FGHIJ"),
    )
    .await;
    let missing = serve(&server, "/missing", ResponseTemplate::new(404)).await;
    let sources = vec![Source::text(ok), Source::html(missing)];
    let store = CodeStore::open_in_memory().unwrap();
    let sink = RecordingSink::default();

    watcher(Notifier::default())
        .with_max_in_flight(1)
        .run_once(&sources, &store, &sink)
        .await
        .unwrap();

    let completed: Vec<_> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            WatchEvent::SourceCompleted(outcome) => Some(outcome.url.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![sources[0].url.clone(), sources[1].url.clone()]);
}

#[tokio::test]
async fn run_report_round_trips_through_atomic_writer() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/feed.txt",
        ResponseTemplate::new(200).set_body_string("code: ABCDE-FGHIJ"),
    )
    .await;
    let store = CodeStore::open_in_memory().unwrap();
    let report = watcher(Notifier::default())
        .run_once(&[Source::text(feed)], &store, &NullSink)
        .await
        .unwrap();

    let temp = TempDir::new().unwrap();
    let target = temp.path().join("reports").join("last_run.json");
    let written = AtomicFileWriter::for_path(&target)
        .write_json("last_run.json", &report)
        .unwrap();
    assert_eq!(written, target);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(json["new_codes"][0]["code"], "ABCDE-FGHIJ");
    assert_eq!(json["sources"][0]["status"], "scanned");
}

#[tokio::test]
async fn malformed_bytes_do_not_cost_the_source_its_codes() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/mixed.txt",
        ResponseTemplate::new(200)
            .set_body_raw(b"code: ABCDE-FGHIJ caf\xE9".to_vec(), "text/plain; charset=utf-8"),
    )
    .await;
    let store = CodeStore::open_in_memory().unwrap();

    let report = watcher(Notifier::default())
        .run_once(&[Source::text(feed)], &store, &NullSink)
        .await
        .unwrap();

    assert_eq!(report.sources[0].result, SourceResult::Scanned { candidates: 1 });
    assert_eq!(codes(&report), vec!["ABCDE-FGHIJ"]);
}

#[tokio::test]
async fn broken_store_aborts_before_any_notification() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/feed.txt",
        ResponseTemplate::new(200).set_body_string("code: ABCDE-FGHIJ"),
    )
    .await;
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("codes.db");
    let store = CodeStore::open(&db_path).unwrap();
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch("DROP TABLE codes")
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let watcher = watcher(Notifier::new(vec![Box::new(CountingChannel {
        calls: calls.clone(),
    })]));
    let result = watcher
        .run_once(&[Source::text(feed)], &store, &NullSink)
        .await;

    assert!(matches!(result, Err(StoreError::Sqlite(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn busy_store_does_not_stall_other_tasks() {
    let server = MockServer::start().await;
    let feed = serve(
        &server,
        "/feed.txt",
        ResponseTemplate::new(200).set_body_string("code: ABCDE-FGHIJ"),
    )
    .await;
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("codes.db");
    let store = CodeStore::open(&db_path).unwrap();

    // Another process holds the write lock for a while.
    let holder = rusqlite::Connection::open(&db_path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE").unwrap();
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(400));
        holder.execute_batch("COMMIT").unwrap();
    });

    let ticker = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Instant::now()
    });
    let report = watcher(Notifier::default())
        .run_once(&[Source::text(feed)], &store, &NullSink)
        .await
        .unwrap();
    let finished = Instant::now();
    let ticked = ticker.await.unwrap();
    release.join().unwrap();

    assert_eq!(codes(&report), vec!["ABCDE-FGHIJ"]);
    assert!(ticked < finished, "timer task only ran after the store wait");
}
