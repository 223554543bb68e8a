//! 分页集合控制器
//!
//! 患者列表与诊断列表共用的分页 + 过滤协议：
//! - 页码、每页条数、过滤条件的任何变化都只触发一次重新获取
//! - 过滤条件或每页条数变化时先把页码重置为 1
//! - 每次获取带有递增序号，非最新序号的响应直接丢弃
//! - 增删改之后整页重新获取，不在本地修补列表

use async_trait::async_trait;
use cxr_core::utils::{clamp_page, total_pages};
use cxr_core::{messages, CxrError, ListResponse, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 一次获取得到的服务端数据
#[derive(Debug, Clone)]
pub struct PageData<T> {
    pub items: Vec<T>,
    pub total: u64,
    /// 服务端回报的页码（诊断接口不返回）
    pub page: Option<u32>,
}

impl<T> From<ListResponse<T>> for PageData<T> {
    fn from(response: ListResponse<T>) -> Self {
        Self {
            items: response.data,
            total: response.total,
            page: response.page,
        }
    }
}

/// 集合数据源
#[async_trait]
pub trait CollectionSource: Send + Sync {
    type Item: Clone + Send + Sync;
    type Filter: Clone + Default + PartialEq + Send + Sync;

    async fn fetch(&self, page: u32, per_page: u32, filter: &Self::Filter) -> Result<PageData<Self::Item>>;
}

/// 一次获取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 响应已写入当前状态
    Applied,
    /// 期间发出了更新的请求，此响应被丢弃
    Discarded,
    /// 状态没有变化，未发出请求
    Unchanged,
}

/// 当前页的物化视图
#[derive(Debug, Clone)]
pub struct CollectionPage<T, F> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub filter: F,
    pub total_count: u64,
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
    fetched: bool,
}

impl<T, F: Default> CollectionPage<T, F> {
    fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            page_size,
            filter: F::default(),
            total_count: 0,
            total_pages: 0,
            loading: false,
            error: None,
            fetched: false,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// 是否至少成功获取过一次
    pub fn is_fetched(&self) -> bool {
        self.fetched
    }
}

/// 分页集合控制器
pub struct CollectionController<S: CollectionSource> {
    name: &'static str,
    source: S,
    page_sizes: Vec<u32>,
    state: RwLock<CollectionPage<S::Item, S::Filter>>,
    seq: AtomicU64,
}

impl<S: CollectionSource> CollectionController<S> {
    /// `page_sizes` 为允许的每页条数；只有一个取值时每页条数固定
    pub fn new(name: &'static str, source: S, page_size: u32, page_sizes: Vec<u32>) -> Result<Self> {
        if page_size == 0 || !page_sizes.contains(&page_size) {
            return Err(CxrError::validation(messages::PAGE_SIZE_INVALID));
        }
        Ok(Self {
            name,
            source,
            page_sizes,
            state: RwLock::new(CollectionPage::new(page_size)),
            seq: AtomicU64::new(0),
        })
    }

    /// 每页条数固定的控制器
    pub fn fixed(name: &'static str, source: S, page_size: u32) -> Result<Self> {
        Self::new(name, source, page_size, vec![page_size])
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_sizes(&self) -> &[u32] {
        &self.page_sizes
    }

    pub async fn snapshot(&self) -> CollectionPage<S::Item, S::Filter> {
        self.state.read().await.clone()
    }

    pub async fn items(&self) -> Vec<S::Item> {
        self.state.read().await.items.clone()
    }

    pub async fn filter(&self) -> S::Filter {
        self.state.read().await.filter.clone()
    }

    pub async fn page(&self) -> u32 {
        self.state.read().await.page
    }

    /// 按当前页码与过滤条件重新获取
    pub async fn refresh(&self) -> Result<FetchOutcome> {
        self.fetch().await
    }

    /// 跳转到指定页（限制在 `[1, total_pages]` 内）
    pub async fn set_page(&self, page: u32) -> Result<FetchOutcome> {
        {
            let mut state = self.state.write().await;
            let target = if state.fetched {
                clamp_page(page, state.total_pages)
            } else {
                page.max(1)
            };
            if target == state.page {
                return Ok(FetchOutcome::Unchanged);
            }
            state.page = target;
        }
        self.fetch().await
    }

    pub async fn next_page(&self) -> Result<FetchOutcome> {
        let page = self.state.read().await.page;
        self.set_page(page.saturating_add(1)).await
    }

    pub async fn previous_page(&self) -> Result<FetchOutcome> {
        let page = self.state.read().await.page;
        self.set_page(page.saturating_sub(1)).await
    }

    /// 修改每页条数，页码重置为 1
    pub async fn set_page_size(&self, page_size: u32) -> Result<FetchOutcome> {
        if !self.page_sizes.contains(&page_size) {
            return Err(CxrError::validation(messages::PAGE_SIZE_INVALID));
        }
        {
            let mut state = self.state.write().await;
            if state.page_size == page_size {
                return Ok(FetchOutcome::Unchanged);
            }
            state.page_size = page_size;
            state.page = 1;
        }
        self.fetch().await
    }

    /// 替换过滤条件，页码重置为 1
    pub async fn set_filter(&self, filter: S::Filter) -> Result<FetchOutcome> {
        {
            let mut state = self.state.write().await;
            if state.filter == filter {
                return Ok(FetchOutcome::Unchanged);
            }
            state.filter = filter;
            state.page = 1;
        }
        self.fetch().await
    }

    /// 修改过滤条件中的部分字段
    pub async fn update_filter<F>(&self, update: F) -> Result<FetchOutcome>
    where
        F: FnOnce(&mut S::Filter) + Send,
    {
        let mut filter = self.filter().await;
        update(&mut filter);
        self.set_filter(filter).await
    }

    /// 增删改之后的整页刷新
    ///
    /// 当前页超出新的总页数时（例如删除了最后一页的唯一一条），
    /// 由 `fetch` 限制页码后再获取一次。
    pub async fn refresh_after_mutation(&self) -> Result<FetchOutcome> {
        self.fetch().await
    }

    /// 获取当前页；请求的页码超出服务端给出的总页数时，限制后重新获取一次
    async fn fetch(&self) -> Result<FetchOutcome> {
        let (outcome, out_of_range) = self.fetch_once().await?;
        if !out_of_range {
            return Ok(outcome);
        }
        let page = self.page().await;
        debug!(collection = self.name, page, "Requested page fell out of range, fetching clamped page");
        let (outcome, _) = self.fetch_once().await?;
        Ok(outcome)
    }

    async fn fetch_once(&self) -> Result<(FetchOutcome, bool)> {
        let (seq, page, page_size, filter) = {
            let mut state = self.state.write().await;
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            (seq, state.page, state.page_size, state.filter.clone())
        };
        debug!(collection = self.name, seq, page, page_size, "Fetching page");

        let result = self.source.fetch(page, page_size, &filter).await;

        let mut state = self.state.write().await;
        if self.seq.load(Ordering::SeqCst) != seq {
            debug!(collection = self.name, seq, "Discarding stale response");
            return Ok((FetchOutcome::Discarded, false));
        }

        state.loading = false;
        match result {
            Ok(data) => {
                state.total_count = data.total;
                state.total_pages = total_pages(data.total, page_size);
                let out_of_range = page > state.total_pages.max(1);
                if out_of_range {
                    state.page = clamp_page(page, state.total_pages);
                } else if let Some(reported) = data.page {
                    state.page = clamp_page(reported, state.total_pages);
                }
                state.items = data.items;
                state.error = None;
                state.fetched = true;
                info!(
                    collection = self.name,
                    seq,
                    page = state.page,
                    total = state.total_count,
                    "Page applied"
                );
                Ok((FetchOutcome::Applied, out_of_range))
            }
            Err(e) => {
                state.error = e.user_message();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    /// 生成 `total` 条数字的内存数据源，可选地挂起某次请求
    #[derive(Default)]
    struct NumberSource {
        total: Mutex<u64>,
        calls: AtomicUsize,
        requests: Mutex<Vec<(u32, u32, Option<u64>)>>,
        gates: Mutex<Vec<(usize, oneshot::Receiver<()>)>>,
        report_page: bool,
    }

    impl NumberSource {
        fn with_total(total: u64) -> Self {
            Self {
                total: Mutex::new(total),
                ..Default::default()
            }
        }

        fn hold_call(&self, call: usize) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push((call, rx));
            tx
        }
    }

    #[async_trait]
    impl CollectionSource for Arc<NumberSource> {
        type Item = u64;
        type Filter = Option<u64>;

        async fn fetch(&self, page: u32, per_page: u32, filter: &Option<u64>) -> Result<PageData<u64>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push((page, per_page, *filter));

            let gate = {
                let mut gates = self.gates.lock().unwrap();
                gates
                    .iter()
                    .position(|(n, _)| *n == call)
                    .map(|i| gates.remove(i).1)
            };
            if let Some(gate) = gate {
                let _ = gate.await;
            }

            let total = *self.total.lock().unwrap();
            let start = u64::from(page - 1) * u64::from(per_page);
            let items = (start..total.min(start + u64::from(per_page)))
                .filter(|n| filter.map_or(true, |f| n % f == 0))
                .collect();
            Ok(PageData {
                items,
                total,
                page: self.report_page.then_some(page),
            })
        }
    }

    fn controller(source: &Arc<NumberSource>) -> CollectionController<Arc<NumberSource>> {
        CollectionController::new("numbers", source.clone(), 10, vec![5, 10, 20, 50]).unwrap()
    }

    #[tokio::test]
    async fn test_page_size_change_resets_page_and_recomputes_pages() {
        let source = Arc::new(NumberSource::with_total(101));
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        controller.set_page(4).await.unwrap();
        assert_eq!(controller.page().await, 4);

        controller.set_page_size(20).await.unwrap();
        let page = controller.snapshot().await;
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 6);
        assert_eq!(source.requests.lock().unwrap().last(), Some(&(1, 20, None)));
    }

    #[tokio::test]
    async fn test_filter_change_always_lands_on_first_page() {
        let source = Arc::new(NumberSource::with_total(40));
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        controller.set_page(3).await.unwrap();
        controller.set_filter(Some(2)).await.unwrap();

        assert_eq!(controller.page().await, 1);
        assert_eq!(source.requests.lock().unwrap().last(), Some(&(1, 10, Some(2))));
    }

    #[tokio::test]
    async fn test_each_change_fetches_exactly_once() {
        let source = Arc::new(NumberSource::with_total(30));
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        controller.set_filter(Some(3)).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // 相同的值不会触发请求
        assert_eq!(controller.set_filter(Some(3)).await.unwrap(), FetchOutcome::Unchanged);
        assert_eq!(controller.set_page_size(10).await.unwrap(), FetchOutcome::Unchanged);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_page_is_clamped_to_known_range() {
        let source = Arc::new(NumberSource::with_total(25));
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        controller.set_page(99).await.unwrap();
        assert_eq!(controller.page().await, 3);

        assert_eq!(controller.next_page().await.unwrap(), FetchOutcome::Unchanged);
        controller.set_page(1).await.unwrap();
        assert_eq!(controller.previous_page().await.unwrap(), FetchOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_rejects_unlisted_page_size() {
        let source = Arc::new(NumberSource::with_total(5));
        let controller = controller(&source);

        let err = controller.set_page_size(15).await.unwrap_err();
        assert_eq!(err.user_message().as_deref(), Some(messages::PAGE_SIZE_INVALID));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let source = Arc::new(NumberSource::with_total(100));
        let controller = Arc::new(controller(&source));
        let release_first = source.hold_call(1);

        let slow = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.set_filter(Some(5)).await })
        };
        while source.calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        let fast = controller.set_filter(Some(7)).await.unwrap();
        assert_eq!(fast, FetchOutcome::Applied);

        release_first.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Discarded);

        let page = controller.snapshot().await;
        assert_eq!(page.filter, Some(7));
        assert!(page.items.iter().all(|n| n % 7 == 0));
        assert!(!page.loading);
    }

    #[tokio::test]
    async fn test_refresh_after_mutation_clamps_emptied_page() {
        let source = Arc::new(NumberSource::with_total(21));
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        controller.set_page(3).await.unwrap();

        *source.total.lock().unwrap() = 20;
        controller.refresh_after_mutation().await.unwrap();

        let page = controller.snapshot().await;
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 10);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_first_navigation_beyond_range_is_clamped() {
        let source = Arc::new(NumberSource::with_total(12));
        let controller = CollectionController::fixed("numbers", source.clone(), 10).unwrap();

        assert_eq!(controller.set_page(99).await.unwrap(), FetchOutcome::Applied);

        let page = controller.snapshot().await;
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items, vec![10, 11]);
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![(99, 10, None), (2, 10, None)]
        );
    }

    #[tokio::test]
    async fn test_reported_page_does_not_mask_out_of_range_request() {
        let source = Arc::new(NumberSource {
            report_page: true,
            ..NumberSource::with_total(25)
        });
        let controller = controller(&source);

        controller.set_page(99).await.unwrap();

        let page = controller.snapshot().await;
        assert_eq!(page.page, 3);
        assert_eq!(page.items, vec![20, 21, 22, 23, 24]);
        assert!(page.page >= 1 && page.page <= page.total_pages);
    }

    #[tokio::test]
    async fn test_server_reported_page_is_clamped() {
        let source = Arc::new(NumberSource {
            report_page: true,
            ..NumberSource::with_total(0)
        });
        let controller = controller(&source);

        controller.refresh().await.unwrap();
        let page = controller.snapshot().await;
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next());
    }
}
