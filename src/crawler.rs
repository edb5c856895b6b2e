use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use flume::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::{
    requester::DEFAULT_TIMEOUT, CrawlTarget, FetchOutcome, Frontier, LinkParser, PageReference,
    Requester, Result,
};

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Number of pages fetched and parsed at the same time.
    pub workers: usize,
    pub fetch_timeout: Duration,
    /// Upper bound on a whole crawl. When it runs out no new work is started,
    /// in-flight fetches finish and a partial result is returned.
    pub crawl_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            fetch_timeout: DEFAULT_TIMEOUT,
            crawl_timeout: None,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub pages_not_html: usize,
    /// In-scope links found on parsed pages, counted once per page.
    pub links_discovered: usize,
    pub links_admitted: usize,
}

#[derive(Debug, Default)]
struct Counters {
    pages_fetched: AtomicUsize,
    pages_failed: AtomicUsize,
    pages_not_html: AtomicUsize,
    links_discovered: AtomicUsize,
    links_admitted: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn stats(&self) -> CrawlStats {
        CrawlStats {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            pages_not_html: self.pages_not_html.load(Ordering::Relaxed),
            links_discovered: self.links_discovered.load(Ordering::Relaxed),
            links_admitted: self.links_admitted.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one crawl, built once the crawl is quiescent or was cut short.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub target: CrawlTarget,
    /// Every admitted page with the depth it was first found at, sorted by
    /// depth then URL.
    pub pages: Vec<PageReference>,
    pub elapsed: Duration,
    pub stats: CrawlStats,
    /// Set when cancellation or the crawl timeout stopped the crawl early.
    pub cancelled: bool,
}

impl CrawlResult {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.url.as_str())
    }
}

/// Runs crawls on a fixed pool of workers sharing one HTTP client.
pub struct Crawler {
    config: CrawlerConfig,
    requester: Arc<Requester>,
    parser: Arc<LinkParser>,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        if config.workers == 0 {
            eyre::bail!("at least one crawl worker is required");
        }
        let requester = Requester::new(config.fetch_timeout, &config.user_agent)?;
        Ok(Self {
            config,
            requester: Arc::new(requester),
            parser: Arc::new(LinkParser::new()?),
        })
    }

    pub async fn crawl(&self, target: &CrawlTarget) -> CrawlResult {
        self.crawl_until(target, CancellationToken::new()).await
    }

    /// Crawls `target` until nothing is left to do or `cancel` fires.
    ///
    /// Cancelling stops workers from taking new pages and from admitting new
    /// links. Fetches already underway run to completion or time out first.
    pub async fn crawl_until(&self, target: &CrawlTarget, cancel: CancellationToken) -> CrawlResult {
        let started = Instant::now();
        log::info!("Crawling {}", target);

        let frontier = Frontier::new(target.max_depth());
        let counters = Arc::new(Counters::default());
        let outstanding = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = flume::unbounded();

        let seed = PageReference::new(target.seed().clone(), 1);
        if frontier.try_admit(&seed).await {
            outstanding.fetch_add(1, Ordering::SeqCst);
            // Cannot fail, `rx` is still alive.
            let _ = tx.send(seed);
        } else {
            log::warn!("Max depth {} excludes the seed {}", target.max_depth(), target.seed());
        }

        // Cancelled by the caller, by the crawl timeout, or by the worker that
        // finishes the last outstanding page.
        let stop = cancel.child_token();
        let done = stop.child_token();
        let mut timed_out = false;

        if outstanding.load(Ordering::SeqCst) > 0 {
            let worker = Arc::new(Worker {
                target: target.clone(),
                frontier: frontier.clone(),
                requester: Arc::clone(&self.requester),
                parser: Arc::clone(&self.parser),
                counters: Arc::clone(&counters),
                outstanding: Arc::clone(&outstanding),
                done: done.clone(),
                rx,
                tx,
            });

            let handles = (0..self.config.workers).map(|id| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.run(id).await })
            });
            let workers = futures::future::join_all(handles);
            tokio::pin!(workers);

            let results = match self.config.crawl_timeout {
                Some(limit) => tokio::select! {
                    results = &mut workers => results,
                    _ = tokio::time::sleep(limit) => {
                        log::warn!("Crawl of {} hit the {:?} time limit", target.seed(), limit);
                        timed_out = true;
                        stop.cancel();
                        workers.as_mut().await
                    }
                },
                None => workers.as_mut().await,
            };
            for result in results {
                if let Err(e) = result {
                    log::error!("Crawl worker failed: {}", e);
                }
            }
        }

        let cancelled = timed_out || cancel.is_cancelled();
        let result = CrawlResult {
            target: target.clone(),
            pages: frontier.snapshot().await,
            elapsed: started.elapsed(),
            stats: counters.stats(),
            cancelled,
        };
        log::info!(
            "Finished {} in {:.2?}: {} pages, {} fetched, {} failed, {} not HTML{}",
            target.seed(),
            result.elapsed,
            result.page_count(),
            result.stats.pages_fetched,
            result.stats.pages_failed,
            result.stats.pages_not_html,
            if cancelled { " (cancelled)" } else { "" }
        );
        result
    }
}

struct Worker {
    target: CrawlTarget,
    frontier: Frontier,
    requester: Arc<Requester>,
    parser: Arc<LinkParser>,
    counters: Arc<Counters>,
    /// Pages admitted but not yet fully processed. Incremented before a page
    /// is queued and decremented only after its links have been queued, so
    /// it reaches zero only when the whole crawl is done.
    outstanding: Arc<AtomicUsize>,
    done: CancellationToken,
    rx: Receiver<PageReference>,
    tx: Sender<PageReference>,
}

impl Worker {
    async fn run(&self, id: usize) {
        loop {
            let page = tokio::select! {
                biased;
                _ = self.done.cancelled() => break,
                page = self.rx.recv_async() => match page {
                    Ok(page) => page,
                    Err(_) => break,
                },
            };

            let _finished = PageDone {
                outstanding: &self.outstanding,
                done: &self.done,
            };
            self.visit(id, page).await;
        }
    }

    async fn visit(&self, id: usize, page: PageReference) {
        log::info!("[worker {}] Crawling (depth {}) {}", id, page.depth, page.url);

        let (page_url, html) = match self.requester.fetch(&page.url).await {
            FetchOutcome::Page { url, html } => {
                Counters::bump(&self.counters.pages_fetched, 1);
                (url, html)
            }
            FetchOutcome::NotHtml { content_type } => {
                Counters::bump(&self.counters.pages_not_html, 1);
                log::debug!("Skipping {} with content type {:?}", page.url, content_type);
                return;
            }
            FetchOutcome::Failed(e) => {
                Counters::bump(&self.counters.pages_failed, 1);
                log::warn!("Failed to fetch {}: {}", page.url, e);
                return;
            }
        };

        if page.depth >= self.frontier.max_depth() {
            return;
        }
        if !self.target.in_scope(&page_url) {
            log::debug!("{} redirected off site to {}", page.url, page_url);
            return;
        }

        let links = self
            .parser
            .extract_links(&html, &page_url, self.target.base());
        Counters::bump(&self.counters.links_discovered, links.len());

        for url in links {
            if self.done.is_cancelled() {
                log::debug!("Crawl stopped, dropping remaining links of {}", page.url);
                break;
            }
            let child = page.child(url);
            if !self.frontier.try_admit(&child).await {
                continue;
            }
            Counters::bump(&self.counters.links_admitted, 1);
            log::debug!("Admitted (depth {}) {}", child.depth, child.url);

            self.outstanding.fetch_add(1, Ordering::SeqCst);
            if self.tx.send_async(child).await.is_err() {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Retires one outstanding page when dropped, so a visit that unwinds still
/// counts as finished.
struct PageDone<'a> {
    outstanding: &'a AtomicUsize,
    done: &'a CancellationToken,
}

impl Drop for PageDone<'_> {
    fn drop(&mut self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            log::debug!("Last outstanding page finished");
            self.done.cancel();
        }
    }
}
