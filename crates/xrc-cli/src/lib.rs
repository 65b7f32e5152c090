//! xrc CLI - Command Line Interface for xrc
//!
//! 解析命令行参数并调用核心库提供的操作。

mod args;
mod reporter;

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use xrc_core::{AppPaths, Controller, ListenProtocol, Node, Settings, XrayEngine};

pub use args::{Cli, Command};
pub use reporter::{render_table, PlainReporter, Reporter};

/// 读取配置并执行命令行指定的操作
pub async fn run(cli: Cli, reporter: Arc<dyn Reporter>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_default(&paths.settings)?;
    let engine = Arc::new(XrayEngine::new(settings.core.clone()));
    let mut controller = Controller::new(settings, paths, engine, cli.verbose).with_observer({
        let reporter = Arc::clone(&reporter);
        Arc::new(move |node: &Node, done: usize, total: usize| reporter.probe_progress(node, done, total))
    });

    execute(&cli, &mut controller, reporter.as_ref(), shutdown_signal()).await
}

/// 按顺序执行：修改并保存配置、查看/删除、刷新订阅、测速、启动代理
pub async fn execute<F>(
    cli: &Cli,
    controller: &mut Controller,
    reporter: &dyn Reporter,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let mut sub = cli.sub;
    apply_settings(cli, controller, &mut sub);
    controller.save_settings()?;

    match &cli.command {
        Some(Command::Ls) => {
            print_overview(controller, reporter).await;
            return Ok(());
        }
        Some(Command::Rmu { index }) => {
            let url = controller.remove_subscription(*index)?;
            reporter.success(&format!("removed subscription: {}", url));
            return Ok(());
        }
        Some(Command::Rmf { index }) => {
            let filter = controller.remove_filter(*index)?;
            reporter.success(&format!("removed filter '{}': {}", filter.tag, filter.selector));
            return Ok(());
        }
        Some(Command::Start) | None => {}
    }

    if sub {
        reporter.info("fetching subscriptions");
        let count = controller.refresh_subscriptions().await?;
        if count == 0 {
            reporter.warning("no subscription found");
        } else {
            reporter.success(&format!("fetch subscription success, {} nodes", count));
        }
    }

    if cli.ping {
        reporter.info("measuring delay");
        let selected = controller.remeasure().await;
        reporter.probe_finished();
        print_fastest(&selected?, reporter);
    }

    if cli.command == Some(Command::Start) {
        // 刚刷新过订阅但没有重新测速时，已保存的节点可能已经失效
        let refresh = sub && !cli.ping;
        let result = controller
            .start_session(refresh, started_notice(reporter, shutdown))
            .await;
        reporter.probe_finished();
        result?;
        reporter.success("stop service successfully");
    }

    Ok(())
}

/// 会话进入运行状态后 shutdown future 才会被轮询
async fn started_notice<F>(reporter: &dyn Reporter, shutdown: F)
where
    F: std::future::Future<Output = ()>,
{
    reporter.probe_finished();
    reporter.success("start service successfully");
    shutdown.await;
}

fn apply_settings(cli: &Cli, controller: &mut Controller, sub: &mut bool) {
    if let Some(url) = &cli.url {
        if controller.add_url(url) {
            debug!("新的订阅地址: {}", url);
            *sub = true;
        }
    }
    if let Some(selector) = &cli.filter {
        if let Some(filter) = controller.add_filter(selector) {
            debug!("新的过滤器 '{}': {}", filter.tag, filter.selector);
        }
    }
    if let Some(port) = cli.http {
        controller.set_listen(ListenProtocol::Http, port);
    }
    if let Some(port) = cli.socks {
        controller.set_listen(ListenProtocol::Socks, port);
    }
}

async fn print_overview(controller: &Controller, reporter: &dyn Reporter) {
    let overview = controller.overview().await;

    let version = overview.core_version.unwrap_or_else(|e| format!("unavailable ({})", e));
    reporter.table(&["core", "version"], &[vec![controller.settings().core.clone(), version]]);

    let subs: Vec<Vec<String>> = overview
        .urls
        .iter()
        .enumerate()
        .map(|(i, u)| vec![i.to_string(), u.clone()])
        .collect();
    reporter.table(&["tag", "subscription"], &subs);

    let nodes: Vec<Vec<String>> = overview
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| vec![i.to_string(), n.name.clone(), n.address.clone(), n.delay.to_string()])
        .collect();
    reporter.table(&["tag", "name", "addr", "ping"], &nodes);

    let filters: Vec<Vec<String>> = overview
        .filters
        .iter()
        .enumerate()
        .map(|(i, f)| vec![i.to_string(), f.tag.clone(), f.selector.clone()])
        .collect();
    reporter.table(&["index", "tag", "selector"], &filters);

    let listens: Vec<Vec<String>> = overview
        .listens
        .iter()
        .map(|l| vec![l.protocol.to_string(), format!("127.0.0.1:{}", l.port)])
        .collect();
    reporter.table(&["protocol", "listen"], &listens);
}

fn print_fastest(nodes: &[Node], reporter: &dyn Reporter) {
    match nodes {
        [node] if node.tag.is_none() => reporter.success(&format!(
            "the fastest server is '{}', latency: {}ms",
            node.name, node.delay
        )),
        _ => {
            for node in nodes {
                reporter.success(&format!(
                    "selected proxy: '{}', the fastest server is '{}', latency: {}ms",
                    node.outbound_tag(),
                    node.name,
                    node.delay
                ));
            }
        }
    }
}

/// Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Reporter for Recorder {
        fn info(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("info: {msg}"));
        }
        fn success(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("ok: {msg}"));
        }
        fn warning(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("warn: {msg}"));
        }
        fn error(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("err: {msg}"));
        }
        fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
            self.lines.lock().unwrap().push(render_table(headers, rows));
        }
    }

    fn controller(dir: &tempfile::TempDir) -> Controller {
        let paths = AppPaths::under(dir.path().join(".xrc"), dir.path());
        let engine = Arc::new(XrayEngine::new("xrc-test-missing-binary").with_config_dir(dir.path()));
        Controller::new(Settings::default(), paths, engine, false)
    }

    fn parse(args: &[&str]) -> Cli {
        use clap::Parser;
        Cli::try_parse_from(std::iter::once("xrc").chain(args.iter().copied())).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn flags_are_saved_before_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let cli = parse(&["-f", "HK", "--http", "1099", "--socks", "1088"]);

        execute(&cli, &mut c, &Recorder::default(), async {}).await.unwrap();

        let saved = Settings::from_file(&c.paths().settings).unwrap();
        assert_eq!(saved.filters.len(), 1);
        assert_eq!(saved.filters[0].selector, "HK");
        let ports: Vec<_> = saved.listens.iter().map(|l| (l.protocol, l.port)).collect();
        assert_eq!(ports, [(ListenProtocol::Socks, 1088), (ListenProtocol::Http, 1099)]);
    }

    #[test_log::test(tokio::test)]
    async fn remove_subscription_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        c.add_url("https://a.example.com");
        c.add_url("https://b.example.com");
        let recorder = Recorder::default();

        execute(&parse(&["rmu", "0"]), &mut c, &recorder, async {}).await.unwrap();

        assert_eq!(c.settings().urls, vec!["https://b.example.com".to_string()]);
        let saved = Settings::from_file(&c.paths().settings).unwrap();
        assert_eq!(saved.urls, vec!["https://b.example.com".to_string()]);
        assert_eq!(recorder.lines(), ["ok: removed subscription: https://a.example.com"]);
    }

    #[test_log::test(tokio::test)]
    async fn remove_filter_out_of_range_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        assert!(execute(&parse(&["rmf", "3"]), &mut c, &Recorder::default(), async {})
            .await
            .is_err());
    }

    #[test_log::test(tokio::test)]
    async fn ls_prints_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let recorder = Recorder::default();

        execute(&parse(&["--url", "https://a.example.com", "ls"]), &mut c, &recorder, async {})
            .await
            .unwrap();

        let lines = recorder.lines();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("unavailable"));
        assert!(lines[1].contains("https://a.example.com"));
    }

    #[test_log::test(tokio::test)]
    async fn sub_without_urls_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir);
        let err = execute(&parse(&["--sub"]), &mut c, &Recorder::default(), async {})
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<xrc_core::Error>(),
            Some(xrc_core::Error::NoSubscriptionUrls)
        ));
    }

    #[test]
    fn fastest_line_depends_on_tags() {
        let recorder = Recorder::default();
        let mut node = xrc_core::parse_link("trojan://pw@hk.example.com:443#HK").unwrap();
        node.delay = 88;
        print_fastest(std::slice::from_ref(&node), &recorder);
        node.tag = Some("1a2b3c4d".to_string());
        print_fastest(&[node], &recorder);
        assert_eq!(
            recorder.lines(),
            [
                "ok: the fastest server is 'HK', latency: 88ms",
                "ok: selected proxy: '1a2b3c4d', the fastest server is 'HK', latency: 88ms",
            ]
        );
    }
}
