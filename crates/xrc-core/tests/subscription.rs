use base64::engine::general_purpose;
use base64::Engine;
use test_log::test;
use tracing::Span;
use xrc_core::{Error, Fetcher};

fn payload(lines: &[&str]) -> String {
    general_purpose::STANDARD.encode(lines.join("\n"))
}

fn fetcher(dir: &tempfile::TempDir) -> Fetcher {
    Fetcher::new(dir.path().join("xrc_subscription.tmp"), Span::none()).unwrap()
}

#[test(tokio::test)]
async fn resubscribe_concatenates_urls_and_writes_cache() {
    let mut server = mockito::Server::new_async().await;
    let first = payload(&["trojan://a@one.example.com:443#one", "bogus://line"]);
    // 省略 padding 并带换行
    let second = format!("{}\n", payload(&["trojan://b@two.example.com:443#two"]).trim_end_matches('='));
    server.mock("GET", "/a").with_status(200).with_body(&first).create_async().await;
    server.mock("GET", "/b").with_status(200).with_body(&second).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(&dir);
    let urls = vec![format!("{}/a", server.url()), format!("{}/b", server.url())];
    let nodes = f.resubscribe(&urls).await.unwrap();

    let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["one", "two"]);

    let cache = std::fs::read_to_string(f.cache_path()).unwrap();
    let lines: Vec<_> = cache.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], first);
}

#[test(tokio::test)]
async fn http_500_aborts_without_cache() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/sub").with_status(500).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(&dir);
    let url = format!("{}/sub", server.url());

    match f.fetch_cached(&[url.clone()]).await {
        Err(Error::Network { url: failed, .. }) => assert_eq!(failed, url),
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(!f.cache_path().exists());
}

#[test(tokio::test)]
async fn one_failing_url_fails_the_whole_batch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/good")
        .with_status(200)
        .with_body(payload(&["trojan://a@one.example.com:443#one"]))
        .create_async()
        .await;
    server.mock("GET", "/gone").with_status(404).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(&dir);
    let bad = format!("{}/gone", server.url());
    let urls = vec![format!("{}/good", server.url()), bad.clone()];

    assert!(matches!(f.resubscribe(&urls).await, Err(Error::Network { url, .. }) if url == bad));
    assert!(!f.cache_path().exists());
}

#[test(tokio::test)]
async fn fetch_cached_prefers_cache_over_network() {
    let mut server = mockito::Server::new_async().await;
    let remote = server
        .mock("GET", "/sub")
        .with_status(200)
        .with_body(payload(&["trojan://a@remote.example.com:443#remote"]))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(&dir);
    let urls = vec![format!("{}/sub", server.url())];

    let first = f.fetch_cached(&urls).await.unwrap();
    let second = f.fetch_cached(&urls).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second[0].name, "remote");
    remote.assert_async().await;
}

#[test(tokio::test)]
async fn empty_subscription_is_not_cached() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/empty")
        .with_status(200)
        .with_body(payload(&["ss://unsupported"]))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(&dir);
    let nodes = f.resubscribe(&[format!("{}/empty", server.url())]).await.unwrap();
    assert!(nodes.is_empty());
    assert!(!f.cache_path().exists());
}

#[test(tokio::test)]
async fn no_urls() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(fetcher(&dir).resubscribe(&[]).await, Err(Error::NoSubscriptionUrls)));
}
