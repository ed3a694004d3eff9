use super::*;
use crate::catalog::{self, ImportSummary, ItemError};
use crate::error::CatalogError;
use crate::scrapers::pap;
use crate::scrapers::search_page::{PageTiming, SearchPageAttempt};
use crate::scrapers::testing::{FixturePage, FixtureProvider};
use crate::scrapers::traits::{BrowserAttempt, DirectAttempt};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn profile(id: i64, platforms: &[&str]) -> SearchProfile {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "city": "Saint-Étienne",
        "max_budget": 800,
        "platforms": platforms,
    }))
    .unwrap()
}

fn listing(platform: Platform, id: &str, title: &str) -> Listing {
    Listing::new(platform, id, title, 650, format!("https://example.fr/{}", id))
}

/// Returns a fixed outcome and counts its calls
struct Fixed {
    name: &'static str,
    outcome: ExtractionOutcome,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(name: &'static str, outcome: ExtractionOutcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DirectAttempt for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, _http: &Client, _profile: &SearchProfile) -> ExtractionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Yields one listing per call, titled after the call number
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl DirectAttempt for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn run(&self, _http: &Client, _profile: &SearchProfile) -> ExtractionOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        ExtractionOutcome::Success(vec![listing(Platform::Pap, "99", &format!("call {}", n))])
    }
}

/// Holds the page longer than any test timeout
struct Stalled;

impl BrowserAttempt for Stalled {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn run(&self, _page: &dyn RenderedPage, _profile: &SearchProfile) -> ExtractionOutcome {
        std::thread::sleep(Duration::from_millis(300));
        ExtractionOutcome::Empty
    }
}

/// Fails the way a parser bug would
struct Panicking;

#[async_trait]
impl DirectAttempt for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn run(&self, _http: &Client, _profile: &SearchProfile) -> ExtractionOutcome {
        let records: Vec<Listing> = Vec::new();
        ExtractionOutcome::Success(vec![records[0].clone()])
    }
}

#[derive(Default)]
struct FakeCatalog {
    pending: Vec<SearchProfile>,
    active: Vec<SearchProfile>,
    unreachable: bool,
    batches: Mutex<Vec<Vec<String>>>,
    acknowledged: Mutex<Vec<i64>>,
    /// Batch numbers (0-based) answered with an HTTP failure
    failing_batches: Vec<usize>,
    /// Batch numbers (0-based) answered with one item rejection
    rejecting_batches: Vec<usize>,
}

#[async_trait]
impl ProfileSource for FakeCatalog {
    async fn pending_profiles(&self) -> catalog::Result<Vec<SearchProfile>> {
        if self.unreachable {
            return Err(CatalogError::Api {
                status: 502,
                message: "bad gateway".into(),
            });
        }
        Ok(self.pending.clone())
    }

    async fn active_profiles(&self) -> catalog::Result<Vec<SearchProfile>> {
        Ok(self.active.clone())
    }

    async fn acknowledge(&self, profile_id: i64) -> catalog::Result<()> {
        self.acknowledged.lock().unwrap().push(profile_id);
        Ok(())
    }
}

#[async_trait]
impl ListingSink for FakeCatalog {
    async fn import_batch(&self, listings: &[Listing]) -> catalog::Result<ImportSummary> {
        let mut batches = self.batches.lock().unwrap();
        let idx = batches.len();
        batches.push(listings.iter().map(|l| l.external_id.clone()).collect());

        if self.failing_batches.contains(&idx) {
            return Err(CatalogError::Api {
                status: 500,
                message: "boom".into(),
            });
        }
        let mut summary = ImportSummary {
            created: listings.len() as u64,
            ..ImportSummary::default()
        };
        if self.rejecting_batches.contains(&idx) {
            summary.created -= 1;
            summary.errors.push(ItemError {
                external_id: listings[0].external_id.clone(),
                errors: vec!["Title can't be blank".into()],
            });
        }
        Ok(summary)
    }
}

fn config() -> CrawlConfig {
    CrawlConfig {
        delay: Duration::ZERO,
        jitter: Duration::ZERO,
        batch_size: 50,
        task_timeout: Duration::from_secs(5),
        snapshot_dir: None,
        dry_run: false,
        acknowledge: true,
    }
}

fn crawler(
    config: CrawlConfig,
    registry: StrategyRegistry,
    catalog: Arc<FakeCatalog>,
    pages: Arc<FixtureProvider>,
) -> Crawler {
    Crawler::new(config, registry, catalog.clone(), catalog, pages).unwrap()
}

fn direct(platform: Platform, attempts: Vec<Arc<dyn DirectAttempt>>) -> PlatformStrategy {
    PlatformStrategy::new(
        platform,
        SessionMode::Ephemeral,
        attempts.into_iter().map(Attempt::Direct).collect(),
    )
}

fn pap_page_strategy() -> PlatformStrategy {
    let page = SearchPageAttempt::new(
        "pap-search-page",
        Platform::Pap,
        pap::search_url,
        pap::card_rules().unwrap(),
        PageTiming {
            card_wait: Duration::from_millis(1),
            ..PageTiming::default()
        },
    )
    .unwrap();
    PlatformStrategy::new(Platform::Pap, SessionMode::Ephemeral, vec![Attempt::Browser(Arc::new(page))])
}

#[test]
fn plan_puts_pending_first_without_repeats() {
    let registry = StrategyRegistry::new()
        .with(direct(Platform::Pap, vec![]))
        .with(direct(Platform::Seloger, vec![]));
    let plan = plan_tasks(
        vec![profile(2, &["pap"]), profile(2, &["pap"]), profile(5, &["seloger", "unknown"])],
        vec![profile(1, &["pap", "seloger"]), profile(2, &["pap"]), profile(3, &["bienici"])],
        &registry,
    );

    let order: Vec<(i64, Platform)> = plan.tasks.iter().map(|t| (t.profile.id, t.platform)).collect();
    assert_eq!(
        order,
        vec![
            (2, Platform::Pap),
            (5, Platform::Seloger),
            (1, Platform::Pap),
            (1, Platform::Seloger),
        ]
    );
    assert_eq!(plan.pending_ids, vec![2, 5]);
    assert_eq!(plan.profiles, 4);
}

#[tokio::test]
async fn duplicate_listing_keeps_first_seen() {
    let catalog = Arc::new(FakeCatalog {
        active: vec![profile(1, &["pap"]), profile(2, &["pap"])],
        ..FakeCatalog::default()
    });
    let registry = StrategyRegistry::new().with(PlatformStrategy::new(
        Platform::Pap,
        SessionMode::Ephemeral,
        vec![Attempt::Direct(Arc::new(Counting {
            calls: AtomicUsize::new(0),
        }))],
    ));

    let report = crawler(config(), registry, catalog.clone(), Arc::new(FixtureProvider::new(vec![])))
        .run()
        .await
        .unwrap();

    assert_eq!(report.extracted, 2);
    assert_eq!(report.unique_listings, 1);
    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(*catalog.batches.lock().unwrap(), vec![vec!["99".to_string()]]);
}

#[tokio::test]
async fn fallback_reaches_browser_after_empty_api() {
    let api = Fixed::new("api", ExtractionOutcome::Empty);
    let page = SearchPageAttempt::new(
        "pap-search-page",
        Platform::Pap,
        pap::search_url,
        pap::card_rules().unwrap(),
        PageTiming::default(),
    )
    .unwrap();
    let strategy = PlatformStrategy::new(
        Platform::Pap,
        SessionMode::Persistent,
        vec![Attempt::Direct(api.clone()), Attempt::Browser(Arc::new(page))],
    );
    let html = r#"<html><body><div class="search-list-item">
        <a class="item-title" href="/annonces/appartement-r1">Saint-Étienne (42000)</a>
        <span class="item-price">500 €</span></div></body></html>"#;
    let provider = Arc::new(FixtureProvider::new(vec![FixturePage::single("PAP", html)]));
    let pages: Arc<dyn PageProvider> = provider.clone();

    let slot = PageSlot::new();
    let outcome = run_strategy(&strategy, &Client::new(), &pages, Arc::new(profile(1, &["pap"])), &slot).await;

    assert_eq!(outcome.listing_count(), 1);
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    assert!(slot.current().is_some());
    assert_eq!(*provider.acquired.lock().unwrap(), vec![SessionMode::Persistent]);
}

#[tokio::test]
async fn success_stops_the_chain_before_the_browser() {
    let api = Fixed::new("api", ExtractionOutcome::Success(vec![listing(Platform::Bienici, "7", "T")]));
    let later = Fixed::new("later", ExtractionOutcome::Empty);
    let strategy = direct(Platform::Bienici, vec![api, later.clone()]);
    let pages: Arc<dyn PageProvider> = Arc::new(FixtureProvider::new(vec![]));

    let slot = PageSlot::new();
    let outcome = run_strategy(&strategy, &Client::new(), &pages, Arc::new(profile(1, &["bienici"])), &slot).await;

    assert_eq!(outcome.listing_count(), 1);
    assert_eq!(later.calls.load(Ordering::SeqCst), 0);
    assert!(slot.current().is_none());
}

#[tokio::test]
async fn exhausted_chain_reports_last_failure() {
    let strategy = direct(
        Platform::Seloger,
        vec![
            Fixed::new("a", ExtractionOutcome::transient("timeout")),
            Fixed::new("b", ExtractionOutcome::blocked("akamai")),
            Fixed::new("c", ExtractionOutcome::Empty),
        ],
    );
    let pages: Arc<dyn PageProvider> = Arc::new(FixtureProvider::new(vec![]));
    let outcome = run_strategy(&strategy, &Client::new(), &pages, Arc::new(profile(1, &["seloger"])), &PageSlot::new()).await;
    assert_eq!(outcome, ExtractionOutcome::blocked("akamai"));
}

#[tokio::test]
async fn unavailable_browser_is_transient() {
    let pages: Arc<dyn PageProvider> = Arc::new(FixtureProvider::new(vec![]));
    let outcome = run_strategy(&pap_page_strategy(), &Client::new(), &pages, Arc::new(profile(1, &["pap"])), &PageSlot::new()).await;
    assert!(matches!(outcome, ExtractionOutcome::TransientError(cause) if cause.contains("browser unavailable")));
}

#[tokio::test]
async fn blocked_platform_does_not_stop_the_run() {
    let catalog = Arc::new(FakeCatalog {
        pending: vec![profile(1, &["pap", "bienici"])],
        ..FakeCatalog::default()
    });
    let bienici = Fixed::new("api", ExtractionOutcome::Success(vec![listing(Platform::Bienici, "b1", "T")]));
    let registry = StrategyRegistry::new()
        .with(pap_page_strategy())
        .with(direct(Platform::Bienici, vec![bienici.clone()]));
    let pages = Arc::new(FixtureProvider::new(vec![FixturePage::single(
        "Access Denied",
        "<html><body>Reference #18.2f</body></html>",
    )]));

    let report = crawler(config(), registry, catalog.clone(), pages.clone()).run().await.unwrap();

    assert!(!report.is_healthy(Platform::Pap));
    assert_eq!(report.platform(Platform::Pap).unwrap().blocked, 1);
    assert!(report.is_healthy(Platform::Bienici));
    assert_eq!(bienici.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.unique_listings, 1);
    assert_eq!(pages.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_attempt_does_not_stop_the_run() {
    let catalog = Arc::new(FakeCatalog {
        pending: vec![profile(1, &["seloger", "bienici"])],
        ..FakeCatalog::default()
    });
    let bienici = Fixed::new("api", ExtractionOutcome::Success(vec![listing(Platform::Bienici, "b1", "T")]));
    let registry = StrategyRegistry::new()
        .with(direct(Platform::Seloger, vec![Arc::new(Panicking)]))
        .with(direct(Platform::Bienici, vec![bienici.clone()]));

    let report = crawler(config(), registry, catalog.clone(), Arc::new(FixtureProvider::new(vec![])))
        .run()
        .await
        .unwrap();

    assert_eq!(report.platform(Platform::Seloger).unwrap().failed, 1);
    assert!(report.is_healthy(Platform::Bienici));
    assert_eq!(report.unique_listings, 1);
    assert_eq!(*catalog.batches.lock().unwrap(), vec![vec!["b1".to_string()]]);
    assert_eq!(*catalog.acknowledged.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn panic_is_reported_as_transient() {
    let strategy = direct(Platform::Seloger, vec![Arc::new(Panicking)]);
    let pages: Arc<dyn PageProvider> = Arc::new(FixtureProvider::new(vec![]));
    let outcome = run_strategy(&strategy, &Client::new(), &pages, Arc::new(profile(1, &["seloger"])), &PageSlot::new()).await;
    assert!(matches!(outcome, ExtractionOutcome::TransientError(cause) if cause.contains("panicked")));
}

#[tokio::test]
async fn no_results_page_is_empty_and_profile_is_acknowledged() {
    let catalog = Arc::new(FakeCatalog {
        pending: vec![profile(8, &["pap"])],
        ..FakeCatalog::default()
    });
    let pages = Arc::new(FixtureProvider::new(vec![FixturePage::single(
        "PAP",
        "<html><body><h2>Aucune annonce ne correspond à votre recherche</h2></body></html>",
    )]));
    let registry = StrategyRegistry::new().with(pap_page_strategy());

    let report = crawler(config(), registry, catalog.clone(), pages).run().await.unwrap();

    assert_eq!(report.platform(Platform::Pap).unwrap().empty, 1);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(*catalog.acknowledged.lock().unwrap(), vec![8]);
    assert!(catalog.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn timed_out_task_is_transient_and_snapshotted() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FakeCatalog::default());
    let registry = StrategyRegistry::new().with(PlatformStrategy::new(
        Platform::Pap,
        SessionMode::Ephemeral,
        vec![Attempt::Browser(Arc::new(Stalled))],
    ));
    let pages = Arc::new(FixtureProvider::new(vec![FixturePage::single("PAP", "<html><body></body></html>")]));
    let crawler = crawler(
        CrawlConfig {
            task_timeout: Duration::from_millis(50),
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..config()
        },
        registry,
        catalog,
        pages.clone(),
    );

    let mut task = CrawlTask::new(Arc::new(profile(1, &["pap"])), Platform::Pap);
    let outcome = crawler.execute(&mut task).await;

    assert!(matches!(outcome, ExtractionOutcome::TransientError(cause) if cause.contains("exceeded")));
    assert_eq!(task.outcome, Some(OutcomeKind::TransientError));
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("pap-") && names[0].ends_with(".html"));
    assert!(names[1].ends_with(".png"));
    assert_eq!(pages.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_items_and_failed_batches_do_not_stop_ingestion() {
    let catalog = FakeCatalog {
        failing_batches: vec![1],
        rejecting_batches: vec![0],
        ..FakeCatalog::default()
    };
    let listings: Vec<Listing> = (1..=5)
        .map(|i| listing(Platform::Pap, &i.to_string(), "T"))
        .collect();
    let mut report = RunReport::default();

    ingest(&catalog, &listings, 2, &mut report).await;

    assert_eq!(catalog.batches.lock().unwrap().len(), 3);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.import.created, 2);
    assert_eq!(report.import.errors.len(), 1);
    assert_eq!(report.import.errors[0].external_id, "1");
}

#[tokio::test]
async fn dry_run_skips_import_and_acknowledgement() {
    let catalog = Arc::new(FakeCatalog {
        pending: vec![profile(4, &["bienici"])],
        ..FakeCatalog::default()
    });
    let registry = StrategyRegistry::new().with(direct(
        Platform::Bienici,
        vec![Fixed::new("api", ExtractionOutcome::Success(vec![listing(Platform::Bienici, "x", "T")]))],
    ));
    let report = crawler(
        CrawlConfig {
            dry_run: true,
            acknowledge: false,
            ..config()
        },
        registry,
        catalog.clone(),
        Arc::new(FixtureProvider::new(vec![])),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.unique_listings, 1);
    assert!(catalog.batches.lock().unwrap().is_empty());
    assert!(catalog.acknowledged.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_catalog_is_fatal() {
    let catalog = Arc::new(FakeCatalog {
        unreachable: true,
        ..FakeCatalog::default()
    });
    let result = crawler(config(), StrategyRegistry::new(), catalog, Arc::new(FixtureProvider::new(vec![])))
        .run()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn page_opened_after_timeout_is_released() {
    let pages = Arc::new(FixtureProvider::slow(
        vec![FixturePage::single("PAP", "<html><body></body></html>")],
        Duration::from_millis(200),
    ));
    let crawler = crawler(
        CrawlConfig {
            task_timeout: Duration::from_millis(50),
            ..config()
        },
        StrategyRegistry::new().with(pap_page_strategy()),
        Arc::new(FakeCatalog::default()),
        pages.clone(),
    );

    let mut task = CrawlTask::new(Arc::new(profile(1, &["pap"])), Platform::Pap);
    let outcome = crawler.execute(&mut task).await;
    assert!(matches!(outcome, ExtractionOutcome::TransientError(cause) if cause.contains("exceeded")));
    assert_eq!(pages.released.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pages.released.load(Ordering::SeqCst), 1);
}
