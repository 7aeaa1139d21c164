//! Integration tests for the crawler
//!
//! These tests use wiremock to serve listing and advertisement pages and run
//! the full crawl cycle end-to-end with the HTTP strategy and a file-backed
//! database.

use ria_harvest::config::{
    Config, CrawlerConfig, DelayConfig, OutputConfig, ProxyConfig, StrategyKind,
};
use ria_harvest::crawler::run_crawl;
use ria_harvest::extract::extract_listing_items;
use ria_harvest::state::CrawlPhase;
use ria_harvest::storage::{RunStatus, SqliteStorage, Storage};
use serde_json::json;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling the mock server
fn create_test_config(base_url: &str, db_path: &Path, max_items: u32) -> Config {
    Config {
        crawler: CrawlerConfig {
            start_url: format!("{}/uk/car/used/?page=1", base_url),
            max_pages: 5,
            max_items,
            concurrency: 2,
            strategy: StrategyKind::Http,
            test_mode: false,
            test_item_cap: 3,
            min_content_length: 50,
            request_timeout_secs: 5,
        },
        delay: DelayConfig {
            request_delay_ms: 1,
            jitter: 0.0,
            page_delay_multiplier: 1.0,
            retry_attempts: 2,
            retry_backoff_ms: 10,
            blocked_backoff_multiplier: 2,
        },
        proxy: ProxyConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
        },
    }
}

fn listing_page(ids: &[u32], next_page: Option<u32>) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<section class="ticket-item">
                     <div class="ticket-photo"><a href="/uk/auto_volkswagen_passat_{id}.html">
                       <img src="/photos/{id}.jpg"></a></div>
                     <a class="address" href="/uk/auto_volkswagen_passat_{id}.html">Volkswagen Passat</a>
                     <div class="price-ticket"><span class="bold" data-currency="USD">12 {id}00</span></div>
                     <li class="item-char js-race">{id}0 тис. км</li>
                   </section>"#,
                id = id
            )
        })
        .collect();

    let pager = next_page
        .map(|n| {
            format!(
                r#"<div class="pagination"><span class="next"><a href="/uk/car/used/?page={}">Наступна</a></span></div>"#,
                n
            )
        })
        .unwrap_or_default();

    format!(
        "<html><head><title>Вживані авто</title></head><body><div class=\"search-result\">{}</div>{}</body></html>",
        items, pager
    )
}

fn detail_page(id: u32, with_phone: bool) -> String {
    let phone = if with_phone {
        r#"<span class="phone" data-phone-number="(067) 111 22 33">(067) 111 22 33</span>"#
    } else {
        ""
    };

    format!(
        r#"<html><head><meta property="og:title" content="Volkswagen Passat"></head><body>
           <h1 class="head">Volkswagen Passat 2015</h1>
           <div class="price_value"><strong>12 {id}00 $</strong></div>
           <div class="base-information"><span class="size18">{id}5</span> тис. км пробіг</div>
           <div class="seller_info_name">Олександр</div>
           <span class="state-num">AA 1234 BB<span class="popup">Перевірений номер</span></span>
           <span class="label-vin"><svg></svg>WVWZZZ3CZFE00000{id}<span class="popup">VIN перевірено</span></span>
           {phone}
           </body></html>"#,
        id = id,
        phone = phone
    )
}

/// Mounts a two-page site: ids 1-3 on page 1, ids 4-5 on page 2
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/uk/car/used/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[1, 2, 3], Some(2))))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/uk/car/used/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[4, 5], None)))
        .mount(server)
        .await;

    for id in 1..=5 {
        Mock::given(method("GET"))
            .and(path(format!("/uk/auto_volkswagen_passat_{}.html", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(id, id != 2)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/users/phones/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"formattedPhoneNumber": "(050) 765 43 21"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_two_pages() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.db");
    let config = create_test_config(&server.uri(), &db_path, 100);

    let report = run_crawl(&config, "test-hash", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.pages_processed, 2);
    assert_eq!(report.items_processed, 5);
    assert_eq!(report.records_saved, 5);
    assert_eq!(report.items_failed, 0);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_records().unwrap(), 5);
    assert_eq!(storage.count_records_with_phone().unwrap(), 5);
    assert_eq!(storage.count_records_with_vin().unwrap(), 5);

    let url = format!("{}/uk/auto_volkswagen_passat_3.html", server.uri());
    let record = storage.get_record(&url).unwrap().unwrap();
    assert_eq!(record.title, "Volkswagen Passat 2015");
    assert_eq!(record.price_usd, Some(12300.0));
    assert_eq!(record.odometer, Some(35_000));
    assert_eq!(record.username.as_deref(), Some("Олександр"));
    assert_eq!(record.phone_number.as_deref(), Some("+380671112233"));
    assert_eq!(record.car_number.as_deref(), Some("AA 1234 BB"));
    assert_eq!(record.car_vin.as_deref(), Some("WVWZZZ3CZFE000003"));

    // Phone for id 2 only comes from the phone endpoint
    let url = format!("{}/uk/auto_volkswagen_passat_2.html", server.uri());
    let record = storage.get_record(&url).unwrap().unwrap();
    assert_eq!(record.phone_number.as_deref(), Some("+380507654321"));

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.records_saved, 5);
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.db");
    let config = create_test_config(&server.uri(), &db_path, 100);

    let first = run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .unwrap();
    let second = run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.records_saved, 5);
    assert_eq!(second.records_saved, 0);
    assert_eq!(second.items_processed, 5);
    assert_eq!(second.pages_processed, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_records().unwrap(), 5);
    assert_eq!(storage.count_runs_by_status(RunStatus::Completed).unwrap(), 2);
}

#[tokio::test]
async fn test_item_quota_override() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.db");
    let config = create_test_config(&server.uri(), &db_path, 100);

    let report = run_crawl(&config, "hash", Some(4), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.items_processed, 4);
    assert_eq!(report.records_saved, 4);
    assert_eq!(report.pages_processed, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_records().unwrap(), 4);
}

#[tokio::test]
async fn test_blocked_listing_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uk/car/used/"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.db");
    let config = create_test_config(&server.uri(), &db_path, 100);

    let report = run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Aborted);
    assert_eq!(report.pages_processed, 0);
    assert!(report.abort_reason.is_some());

    let storage = SqliteStorage::new(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
    assert!(run.abort_reason.is_some());
    assert_eq!(storage.count_records().unwrap(), 0);
}

#[tokio::test]
async fn test_failed_detail_is_counted_and_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uk/car/used/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[7, 8], None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uk/auto_volkswagen_passat_7.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(7, true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uk/auto_volkswagen_passat_8.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.db");
    let config = create_test_config(&server.uri(), &db_path, 100);

    let report = run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.items_processed, 2);
    assert_eq!(report.records_saved, 1);
    assert_eq!(report.items_failed, 1);
}

#[tokio::test]
async fn test_import_saved_listing_page() {
    let html = listing_page(&[10, 11, 12], None);
    let records = extract_listing_items(&html, "https://auto.ria.com");
    assert_eq!(records.len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let mut storage = SqliteStorage::new(&dir.path().join("cars.db")).unwrap();
    for record in &records {
        assert!(storage.upsert_record(record).unwrap());
    }
    for record in &records {
        assert!(!storage.upsert_record(record).unwrap());
    }

    let record = storage
        .get_record("https://auto.ria.com/uk/auto_volkswagen_passat_11.html")
        .unwrap()
        .unwrap();
    assert_eq!(record.price_usd, Some(121100.0));
    assert_eq!(record.odometer, Some(110_000));
    assert_eq!(record.phone_number, None);
    assert_eq!(
        record.image_url.as_deref(),
        Some("https://auto.ria.com/photos/11.jpg")
    );
}
