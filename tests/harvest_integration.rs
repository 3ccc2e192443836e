//! Integration tests for the full harvest flow against a mock broker site.

mod support;

use std::path::Path;

use harvester_core::{EntryStatus, Harvester, Manifest, Settings};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_A: &[u8] = b"%PDF-1.4 circular 2025";
const PDF_TABLE: &[u8] = b"%PDF-1.4 price table";

fn settings_in(dir: &Path) -> Settings {
    Settings {
        sources: dir.join("sources.txt"),
        output_dir: dir.join("raw"),
        manifest: dir.join("manifest.json"),
        rate_limit_ms: 0,
        max_retries: 0,
        ..Settings::default()
    }
}

fn pdf(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/pdf")
        .set_body_bytes(body.to_vec())
}

/// A broker page linking documents from several years plus one off-site copy.
async fn mount_broker_site(server: &MockServer) {
    let port = server.address().port();
    let page = format!(
        r#"<html><body>
            <a href="/2025/circular.pdf">Circular 2025</a>
            <a href="/2023/old.pdf">Old circular</a>
            <a href="/docs/tabela-25.pdf">Tabela</a>
            <a href="/2025/news.html">News</a>
            <a href="http://localhost:{port}/2025/mirror.pdf">Mirror</a>
        </body></html>"#
    );
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(page),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2025/circular.pdf"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2025/circular.pdf"))
        .respond_with(pdf(PDF_A).insert_header("etag", "\"v1\""))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/tabela-25.pdf"))
        .respond_with(pdf(PDF_TABLE))
        .mount(server)
        .await;

    for never in ["/2023/old.pdf", "/2025/mirror.pdf", "/2025/report.docx", "/2025/news.html"] {
        Mock::given(method("GET"))
            .and(path(never))
            .respond_with(pdf(b"%PDF-1.4 should not be fetched"))
            .expect(0)
            .mount(server)
            .await;
    }
}

fn filtered_settings(dir: &Path, server: &MockServer) -> Settings {
    let settings = Settings {
        only_years: true,
        years: vec!["2025".to_string()],
        allowed_domains: vec!["127.0.0.1".to_string()],
        ..settings_in(dir)
    };
    std::fs::write(
        &settings.sources,
        format!(
            "# broker pages\ncrawl {0}/produtos\nlink {0}/2025/report.docx\n",
            server.uri()
        ),
    )
    .unwrap();
    settings
}

#[tokio::test]
async fn test_manifest_contains_exactly_the_filtered_pdfs() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_broker_site(&server).await;
    let dir = TempDir::new().unwrap();
    let settings = filtered_settings(dir.path(), &server);

    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.discovered(), 2);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed, 0);

    let manifest = Manifest::load(&settings.manifest).await;
    let mut urls: Vec<&str> = manifest.entries().map(|e| e.url.as_str()).collect();
    urls.sort_unstable();
    assert_eq!(
        urls,
        vec![
            format!("{}/2025/circular.pdf", server.uri()),
            format!("{}/docs/tabela-25.pdf", server.uri()),
        ]
    );

    let circular = manifest.get("circular.pdf").unwrap();
    assert_eq!(circular.title.as_deref(), Some("Circular 2025"));
    assert_eq!(circular.etag.as_deref(), Some("\"v1\""));
    assert_eq!(circular.size, PDF_A.len() as u64);
    assert_eq!(circular.status, EntryStatus::Downloaded);

    assert_eq!(
        std::fs::read(settings.output_dir.join("circular.pdf")).unwrap(),
        PDF_A
    );
    assert_eq!(
        std::fs::read(settings.output_dir.join("tabela-25.pdf")).unwrap(),
        PDF_TABLE
    );
}

#[tokio::test]
async fn test_rerun_with_unchanged_content_rewrites_nothing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_broker_site(&server).await;
    let dir = TempDir::new().unwrap();
    let settings = filtered_settings(dir.path(), &server);

    Harvester::new(settings.clone()).unwrap().run().await.unwrap();
    let first = Manifest::load(&settings.manifest).await;
    let circular_mtime = std::fs::metadata(settings.output_dir.join("circular.pdf"))
        .unwrap()
        .modified()
        .unwrap();
    let table_mtime = std::fs::metadata(settings.output_dir.join("tabela-25.pdf"))
        .unwrap()
        .modified()
        .unwrap();

    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.not_modified, 1, "ETag match answers 304");
    assert_eq!(summary.unchanged, 1, "hash match without validators");

    let second = Manifest::load(&settings.manifest).await;
    for entry in first.entries() {
        let again = second.get(&entry.name).unwrap();
        assert_eq!(again.sha256, entry.sha256);
        assert_eq!(again.updated_at, entry.updated_at);
    }
    assert_eq!(
        std::fs::metadata(settings.output_dir.join("circular.pdf"))
            .unwrap()
            .modified()
            .unwrap(),
        circular_mtime
    );
    assert_eq!(
        std::fs::metadata(settings.output_dir.join("tabela-25.pdf"))
            .unwrap()
            .modified()
            .unwrap(),
        table_mtime
    );

    let leftovers: Vec<_> = std::fs::read_dir(&settings.output_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".downloading"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_non_pdf_link_seed_is_never_requested() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/files/price-list.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = settings_in(dir.path());
    std::fs::write(
        &settings.sources,
        format!("link {}/files/price-list.xlsx\n", server.uri()),
    )
    .unwrap();

    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.discovered(), 0);
    assert!(Manifest::load(&settings.manifest).await.is_empty());
}

#[tokio::test]
async fn test_changed_document_is_downloaded_again() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let settings = settings_in(dir.path());
    std::fs::write(
        &settings.sources,
        format!("link {}/2025/rates.pdf\n", server.uri()),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/2025/rates.pdf"))
        .respond_with(pdf(b"%PDF-1.4 march"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Harvester::new(settings.clone()).unwrap().run().await.unwrap();
    let before = Manifest::load(&settings.manifest).await;

    Mock::given(method("GET"))
        .and(path("/2025/rates.pdf"))
        .respond_with(pdf(b"%PDF-1.4 april, revised"))
        .mount(&server)
        .await;
    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.downloaded, 1);
    let after = Manifest::load(&settings.manifest).await;
    assert_ne!(
        after.get("rates.pdf").unwrap().sha256,
        before.get("rates.pdf").unwrap().sha256
    );
    assert_eq!(
        std::fs::read(settings.output_dir.join("rates.pdf")).unwrap(),
        b"%PDF-1.4 april, revised"
    );
}

#[tokio::test]
async fn test_missing_seed_file_yields_empty_manifest() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(dir.path());

    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.discovered(), 0);
    let text = std::fs::read_to_string(&settings.manifest).unwrap();
    assert_eq!(text.trim(), "{}");
}

#[tokio::test]
async fn test_malformed_seed_file_yields_empty_manifest() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(dir.path());
    std::fs::write(
        &settings.sources,
        b"fetch everything please\nlink\ncrawl ftp://example.com/\n\xff\xfe garbage\n",
    )
    .unwrap();

    let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    assert_eq!(summary.discovered(), 0);
    assert_eq!(summary.skipped_seed_lines, 4);
    assert!(Manifest::load(&settings.manifest).await.is_empty());
}

#[tokio::test]
async fn test_corrupt_manifest_is_replaced() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(dir.path());
    std::fs::write(&settings.manifest, b"{ not json").unwrap();

    Harvester::new(settings.clone()).unwrap().run().await.unwrap();

    let text = std::fs::read_to_string(&settings.manifest).unwrap();
    assert_eq!(text.trim(), "{}");
}
