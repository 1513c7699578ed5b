use std::io::Write;
use std::time::Duration;
use log::{info, warn, debug};
use crate::error::Result;
use crate::models::{FaultPolicy, MigrationConfig, SiteId};
use crate::store::{CouchStore, DocumentStore};

/// 等待能力，用于在两个文档之间限速。
///
/// 任何 `FnMut(Duration)` 闭包都实现了该 trait，测试中可以只记录而不真的等待。
pub trait Delay {
    fn sleep(&mut self, duration: Duration);
}

/// 直接调用 `std::thread::sleep`，阻塞整个进程。
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<F: FnMut(Duration)> Delay for F {
    fn sleep(&mut self, duration: Duration) {
        self(duration)
    }
}

/// 一次运行的统计信息。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 已经发起查询的站点数（包括失败的）。
    pub sites_attempted: usize,
    /// 已打印的文档总数。
    pub documents_printed: usize,
    /// 失败的站点及错误信息，只在 `FaultPolicy::Continue` 下出现。
    pub failed_sites: Vec<(SiteId, String)>,
}

/// 迁移器：逐个站点查询文档库，打印每个文档并在其后等待。
///
/// 完全串行：一次一个查询，一次一个文档，按站点列表顺序执行。
pub struct Migrator<S, D, W> {
    config: MigrationConfig,
    store: S,
    delay: D,
    out: W,
}

impl Migrator<CouchStore, ThreadSleep, std::io::Stdout> {
    /// 使用 HTTP 文档库、真实等待和标准输出创建迁移器。
    pub fn open(config: MigrationConfig) -> Result<Self> {
        let store = CouchStore::new(&config.store_url, config.credential.as_ref())?;
        info!("Target store: {}", store.base_url());
        Migrator::new(config, store, ThreadSleep, std::io::stdout())
    }
}

impl<S: DocumentStore, D: Delay, W: Write> Migrator<S, D, W> {
    /// 使用注入的文档库、等待能力和输出创建迁移器。
    pub fn new(config: MigrationConfig, store: S, delay: D, out: W) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            delay,
            out,
        })
    }

    /// 处理单个站点，返回打印的文档数。
    ///
    /// 每个文档打印后都会等待一次，包括最后一个。
    pub fn run_site(&mut self, site: &SiteId) -> Result<usize> {
        let start_key = site.start_key();
        let end_key = site.end_key();
        debug!("Querying site {}: start_key={:?}, end_key={:?}", site, start_key, end_key);

        let docs = self.store.fetch_range(start_key, &end_key)?;
        let count = docs.len();

        for doc in docs {
            serde_json::to_writer(&mut self.out, &doc)?;
            self.out.write_all(b"\n")?;
            self.out.flush()?;
            self.delay.sleep(self.config.delay);
        }

        info!("Site {}: {} documents", site, count);
        Ok(count)
    }

    /// 按顺序处理所有站点。
    ///
    /// `FaultPolicy::Abort` 下第一个错误直接返回，之后的站点不会被查询；
    /// 已打印的内容保持不变。
    pub fn run(&mut self) -> Result<RunSummary> {
        let sites = self.config.sites.clone();
        let policy = self.config.fault_policy;
        info!("Starting migration: {} sites, delay={:?}, policy={:?}",
              sites.len(), self.config.delay, policy);

        let mut summary = RunSummary::default();
        for site in &sites {
            summary.sites_attempted += 1;
            match self.run_site(site) {
                Ok(count) => summary.documents_printed += count,
                Err(e) => match policy {
                    FaultPolicy::Abort => return Err(e),
                    FaultPolicy::Continue => {
                        warn!("Site {} failed: {}", site, e);
                        summary.failed_sites.push((site.clone(), e.to_string()));
                    }
                },
            }
        }

        info!("Migration finished: {} sites, {} documents, {} failed",
              summary.sites_attempted, summary.documents_printed, summary.failed_sites.len());
        Ok(summary)
    }

    /// 取回输出端，测试中用来检查打印内容。
    pub fn into_output(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// 内存文档库：按起始键返回预设结果，并记录收到的查询。
    #[derive(Default)]
    struct FakeStore {
        results: HashMap<String, Vec<Value>>,
        failing: Vec<String>,
        queries: Vec<(String, String)>,
    }

    impl FakeStore {
        fn with(mut self, site: &str, docs: Vec<Value>) -> Self {
            self.results.insert(site.to_string(), docs);
            self
        }

        fn failing(mut self, site: &str) -> Self {
            self.failing.push(site.to_string());
            self
        }
    }

    impl DocumentStore for &mut FakeStore {
        fn fetch_range(&mut self, start_key: &str, end_key: &str) -> Result<Vec<Value>> {
            self.queries.push((start_key.to_string(), end_key.to_string()));
            if self.failing.iter().any(|s| s == start_key) {
                return Err(MigrateError::Http { status: 500, body: "boom".into() });
            }
            Ok(self.results.get(start_key).cloned().unwrap_or_default())
        }
    }

    fn sites(ids: &[&str]) -> Vec<SiteId> {
        ids.iter().map(|s| SiteId::new(*s).unwrap()).collect()
    }

    fn config(ids: &[&str]) -> MigrationConfig {
        MigrationConfig::new("http://localhost:5984/db").with_sites(sites(ids))
    }

    fn lines(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn prints_each_document_in_order_with_a_delay_after_each() {
        let _ = env_logger::builder().is_test(true).try_init();
        let doc1 = json!({"_id": "abc1-1", "v": 1});
        let doc2 = json!({"_id": "abc1-2", "v": 2});
        let mut store = FakeStore::default().with("abc1", vec![doc1.clone(), doc2.clone()]);
        let mut delays = Vec::new();

        let out = {
            let mut migrator = Migrator::new(
                config(&["abc1"]),
                &mut store,
                |d: Duration| delays.push(d),
                Vec::new(),
            )
            .unwrap();
            let summary = migrator.run().unwrap();
            assert_eq!(summary.sites_attempted, 1);
            assert_eq!(summary.documents_printed, 2);
            assert!(summary.failed_sites.is_empty());
            migrator.into_output()
        };

        assert_eq!(lines(out), vec![doc1, doc2]);
        assert_eq!(delays, vec![Duration::from_secs(1); 2]);
        assert_eq!(store.queries, vec![("abc1".to_string(), "abc1~".to_string())]);
    }

    #[test]
    fn empty_site_prints_nothing_and_does_not_wait() {
        let doc = json!({"_id": "y-1"});
        let mut store = FakeStore::default()
            .with("x", vec![])
            .with("y", vec![doc.clone()]);
        let mut delays = 0;

        let out = {
            let mut migrator = Migrator::new(
                config(&["x", "y"]),
                &mut store,
                |_: Duration| delays += 1,
                Vec::new(),
            )
            .unwrap();
            migrator.run().unwrap();
            migrator.into_output()
        };

        assert_eq!(lines(out), vec![doc]);
        assert_eq!(delays, 1);
        assert_eq!(
            store.queries,
            vec![
                ("x".to_string(), "x~".to_string()),
                ("y".to_string(), "y~".to_string()),
            ]
        );
    }

    #[test]
    fn abort_policy_stops_at_first_failing_site() {
        let mut store = FakeStore::default()
            .with("aa", vec![json!({"_id": "aa-1"})])
            .failing("bb")
            .with("cc", vec![json!({"_id": "cc-1"})]);

        let out = {
            let mut migrator = Migrator::new(
                config(&["aa", "bb", "cc"]),
                &mut store,
                |_: Duration| {},
                Vec::new(),
            )
            .unwrap();
            let err = migrator.run().unwrap_err();
            assert!(matches!(err, MigrateError::Http { status: 500, .. }));
            migrator.into_output()
        };

        // 失败前已打印的内容保留，之后的站点没有被查询
        assert_eq!(lines(out), vec![json!({"_id": "aa-1"})]);
        let queried: Vec<&str> = store.queries.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(queried, vec!["aa", "bb"]);
    }

    #[test]
    fn continue_policy_records_failure_and_moves_on() {
        let mut store = FakeStore::default()
            .failing("aa")
            .with("bb", vec![json!({"_id": "bb-1"}), json!({"_id": "bb-2"})]);

        let mut migrator = Migrator::new(
            config(&["aa", "bb"]).with_fault_policy(FaultPolicy::Continue),
            &mut store,
            |_: Duration| {},
            Vec::new(),
        )
        .unwrap();
        let summary = migrator.run().unwrap();

        assert_eq!(summary.sites_attempted, 2);
        assert_eq!(summary.documents_printed, 2);
        assert_eq!(summary.failed_sites.len(), 1);
        assert_eq!(summary.failed_sites[0].0.as_str(), "aa");
        assert!(summary.failed_sites[0].1.contains("500"));
    }

    #[test]
    fn repeated_runs_print_the_same_sequence() {
        let mut store = FakeStore::default()
            .with("abc1", vec![json!({"_id": "abc1-1"}), json!({"_id": "abc1-2"})]);

        let run_once = |store: &mut FakeStore| {
            let mut migrator =
                Migrator::new(config(&["abc1"]), store, |_: Duration| {}, Vec::new()).unwrap();
            migrator.run().unwrap();
            migrator.into_output()
        };

        let first = run_once(&mut store);
        let second = run_once(&mut store);
        assert_eq!(first, second);
    }

    #[test]
    fn run_site_uses_configured_delay() {
        let mut store = FakeStore::default().with("abc1", vec![json!(1), json!(2), json!(3)]);
        let mut delays = Vec::new();
        let mut migrator = Migrator::new(
            config(&["abc1"]).with_delay(Duration::from_millis(5)),
            &mut store,
            |d: Duration| delays.push(d),
            Vec::new(),
        )
        .unwrap();

        let site = SiteId::new("abc1").unwrap();
        assert_eq!(migrator.run_site(&site).unwrap(), 3);
        drop(migrator);
        assert_eq!(delays, vec![Duration::from_millis(5); 3]);
    }

    #[test]
    fn rejects_empty_site_list() {
        let mut store = FakeStore::default();
        let res = Migrator::new(
            MigrationConfig::new("http://localhost:5984/db"),
            &mut store,
            ThreadSleep,
            Vec::new(),
        );
        assert!(matches!(res, Err(MigrateError::ConfigError(_))));
    }

    #[test]
    fn open_still_validates_config() {
        let res = Migrator::open(MigrationConfig::new("http://localhost:5984/db"));
        assert!(matches!(res, Err(MigrateError::ConfigError(_))));
    }
}
