use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataload_engine::{
    BatchContext, BatchEnvironment, BatchFunction, BatchLoaderScheduler, DataLoader,
    DataLoaderInstrumentation, DataLoaderOptions, Dispatchable, InstrumentationContext, KeyContext,
    LoadError, Loaded, MappedBatchFunction, ScheduledBatchLoaderCall, SimpleInstrumentationContext,
    SimpleStatisticsCollector,
};
use futures::executor::block_on;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyData(String);

type Calls = Arc<Mutex<Vec<Vec<i64>>>>;

struct DummyDataLoader {
    map: HashMap<i64, String>,
    calls: Calls,
}

impl DummyDataLoader {
    fn new(entries: &[(i64, &str)]) -> (Self, Calls) {
        let calls = Calls::default();
        let map = entries.iter().map(|(k, v)| (*k, (*v).to_owned())).collect();
        (Self { map, calls: Arc::clone(&calls) }, calls)
    }
}

#[async_trait]
impl BatchFunction<i64, DummyData> for DummyDataLoader {
    async fn load(
        &self,
        keys: &[i64],
        _env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<DummyData>>, LoadError> {
        self.calls.lock().push(keys.to_vec());
        Ok(keys.iter().map(|k| Ok(self.map.get(k).cloned().map(DummyData))).collect())
    }
}

fn fish() -> [(i64, &'static str); 4] {
    [(42, "one fish"), (12, "two fish"), (5, "red fish"), (8, "blue fish")]
}

fn data(s: &str) -> Option<DummyData> {
    Some(DummyData(s.to_owned()))
}

#[tokio::test]
async fn basic_load() {
    let (batch_fn, calls) = DummyDataLoader::new(&[(42, "Foo")]);
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let foo = loader.load(42);
    assert!(!foo.is_done());
    loader.dispatch().await;

    assert_eq!(foo.await.unwrap(), data("Foo"));
    assert_eq!(*calls.lock(), vec![vec![42]]);
}

#[tokio::test]
async fn repeated_load() {
    let (batch_fn, calls) = DummyDataLoader::new(&[(42, "Foo")]);
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let first = loader.load(42);
    loader.dispatch().await;
    assert_eq!(first.await.unwrap(), data("Foo"));

    let second = loader.load(42);
    assert!(second.is_done());
    assert_eq!(loader.dispatch_depth(), 0);
    assert_eq!(second.await.unwrap(), data("Foo"));
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn basic_load_many() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let values = loader.load_many(vec![5, 12, 8]);
    loader.dispatch().await;

    assert_eq!(values.await.unwrap(), vec![data("red fish"), data("two fish"), data("blue fish")]);
    assert_eq!(*calls.lock(), vec![vec![5, 12, 8]]);
}

#[tokio::test]
async fn load_async() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let tuple = future::join4(
        loader.load(5),
        loader.load_many(vec![5, 42]),
        loader.load(99),
        loader.load(12),
    );
    loader.dispatch().await;

    let (five, many, missing, twelve) = tuple.await;
    assert_eq!(five.unwrap(), data("red fish"));
    assert_eq!(many.unwrap(), vec![data("red fish"), data("one fish")]);
    assert_eq!(missing.unwrap(), None);
    assert_eq!(twelve.unwrap(), data("two fish"));
    assert_eq!(*calls.lock(), vec![vec![5, 42, 99, 12]]);
}

#[tokio::test]
async fn coalesced_loads_share_one_handle() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let a = loader.load(8);
    let b = loader.clone().load(8);
    assert_eq!(loader.dispatch_depth(), 1);

    let results = loader.dispatch().await;
    assert_eq!(results.len(), 1);
    assert_eq!(a.await.unwrap(), b.await.unwrap());
    assert_eq!(*calls.lock(), vec![vec![8]]);
}

#[tokio::test]
async fn dispatch_reports_results_in_queue_order() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    loader.load(12);
    loader.load(7);
    loader.load(42);
    let dispatched = loader.dispatch_with_counts();
    assert!(dispatched.was_dispatched());
    assert_eq!(dispatched.keys_count(), 3);

    let results = dispatched.await.into_iter().map(Result::unwrap).collect::<Vec<_>>();
    assert_eq!(results, vec![data("two fish"), None, data("one fish")]);
}

#[tokio::test]
async fn max_batch_size_slices_in_queue_order() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new().with_max_batch_size(2));

    let values = loader.load_many(vec![1, 2, 3, 4, 5]);
    loader.dispatch().await;

    assert_eq!(values.await.unwrap(), vec![None, None, None, None, data("red fish")]);
    assert_eq!(*calls.lock(), vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn empty_dispatch_is_idempotent() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    for _ in 0..2 {
        let dispatched = loader.dispatch_with_counts();
        assert!(!dispatched.was_dispatched());
        assert_eq!(dispatched.keys_count(), 0);
        assert!(dispatched.await.is_empty());
    }
    assert!(calls.lock().is_empty());
}

#[tokio::test]
async fn prime_then_load_skips_batch_function() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    loader.prime(5, DummyData("primed".to_owned()));
    loader.prime(5, DummyData("ignored".to_owned()));
    assert_eq!(loader.load(5).await.unwrap(), data("primed"));

    loader.clear(5).prime(5, DummyData("replaced".to_owned()));
    assert_eq!(loader.load(5).await.unwrap(), data("replaced"));

    loader.prime_many(vec![(1, DummyData("a".to_owned())), (2, DummyData("b".to_owned()))]);
    assert_eq!(loader.load_many(vec![1, 2]).await.unwrap(), vec![data("a"), data("b")]);

    assert_eq!(loader.dispatch_depth(), 0);
    assert!(calls.lock().is_empty());
}

#[tokio::test]
async fn clear_forces_a_reload() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    let first = loader.load(42);
    loader.dispatch().await;
    first.await.unwrap();

    loader.clear_all();
    assert!(loader.get_if_present(&42).is_none());
    let second = loader.load(42);
    loader.dispatch().await;
    assert_eq!(second.await.unwrap(), data("one fish"));

    loader.clear_many(vec![42, 12]);
    let third = loader.load(42);
    loader.dispatch().await;
    third.await.unwrap();

    assert_eq!(*calls.lock(), vec![vec![42], vec![42], vec![42]]);
}

#[tokio::test]
async fn get_if_present_and_completed() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    assert!(loader.get_if_present(&5).is_none());
    let pending = loader.load(5);
    assert!(loader.get_if_present(&5).is_some());
    assert!(loader.get_if_completed(&5).is_none());

    loader.dispatch().await;
    pending.await.unwrap();
    let completed = loader.get_if_completed(&5).expect("completed");
    assert_eq!(completed.peek().unwrap().unwrap(), data("red fish"));
}

#[tokio::test]
async fn caching_disabled_queues_every_load() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new().with_caching(false));

    let a = loader.load(5);
    let b = loader.load(5);
    loader.dispatch().await;

    assert_eq!(a.await.unwrap(), b.await.unwrap());
    assert!(loader.get_if_present(&5).is_none());
    assert_eq!(*calls.lock(), vec![vec![5, 5]]);
}

#[tokio::test]
async fn batching_disabled_loads_immediately() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new().with_batching(false));

    assert_eq!(loader.load(5).await.unwrap(), data("red fish"));
    assert_eq!(loader.load(8).await.unwrap(), data("blue fish"));
    assert_eq!(loader.dispatch_depth(), 0);
    assert!(!loader.dispatch_with_counts().was_dispatched());
    assert_eq!(*calls.lock(), vec![vec![5], vec![8]]);
}

#[tokio::test]
async fn cache_key_fn_coalesces_equivalent_keys() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(
        batch_fn,
        DataLoaderOptions::new().with_cache_key_fn(|k: &i64| k % 100),
    );

    assert_eq!(loader.cache_key(&105), 5);
    let a = loader.load(5);
    let b = loader.load(105);
    loader.dispatch().await;

    assert_eq!(a.await.unwrap(), data("red fish"));
    assert_eq!(b.await.unwrap(), data("red fish"));
    assert_eq!(*calls.lock(), vec![vec![5]]);
}

struct ShortLoader;

#[async_trait]
impl BatchFunction<i64, i64> for ShortLoader {
    async fn load(
        &self,
        keys: &[i64],
        _env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<i64>>, LoadError> {
        Ok(keys.iter().skip(1).map(|k| Ok(Some(*k))).collect())
    }
}

#[tokio::test]
async fn list_size_mismatch_fails_every_key() {
    let loader = DataLoader::new(ShortLoader, DataLoaderOptions::new());

    let results = loader.load_many_settled(vec![1, 2, 3]);
    loader.dispatch().await;

    for result in results.await {
        assert!(matches!(result, Err(LoadError::SizeMismatch { keys: 3, values: 2 })));
    }
    assert!(loader.get_if_present(&1).is_none());
}

struct PartialMap;

#[async_trait]
impl MappedBatchFunction<i64, i64> for PartialMap {
    async fn load(
        &self,
        keys: &HashSet<i64>,
        _env: &BatchEnvironment<i64>,
    ) -> Result<HashMap<i64, Loaded<i64>>, LoadError> {
        Ok(keys.iter().filter(|k| **k != 3).map(|k| (*k, Ok(Some(k * 10)))).collect())
    }
}

#[tokio::test]
async fn map_mode_missing_key_is_none() {
    let loader = DataLoader::mapped(PartialMap, DataLoaderOptions::new());

    let values = loader.load_many(vec![1, 2, 3]);
    loader.dispatch().await;

    assert_eq!(values.await.unwrap(), vec![Some(10), Some(20), None]);
}

/// Fails odd keys, and fails the whole batch when it contains a negative key.
struct OddsFail {
    calls: Calls,
}

#[async_trait]
impl BatchFunction<i64, i64> for OddsFail {
    async fn load(
        &self,
        keys: &[i64],
        _env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<i64>>, LoadError> {
        self.calls.lock().push(keys.to_vec());
        if keys.iter().any(|k| *k < 0) {
            return Err(LoadError::msg("negative key"));
        }
        Ok(keys
            .iter()
            .map(|k| {
                if k % 2 == 1 {
                    Err(LoadError::msg(format!("odd key {}", k)))
                } else {
                    Ok(Some(*k))
                }
            })
            .collect())
    }
}

#[tokio::test]
async fn per_key_errors_are_cached_by_default() {
    let calls = Calls::default();
    let loader = DataLoader::new(OddsFail { calls: Arc::clone(&calls) }, DataLoaderOptions::new());

    let results = loader.load_many_settled(vec![1, 2]);
    loader.dispatch().await;
    let results = results.await;
    assert_eq!(results[0].as_ref().unwrap_err().to_string(), "odd key 1");
    assert_eq!(
        results[0].as_ref().unwrap_err().failure().map(|e| e.to_string()).as_deref(),
        Some("odd key 1")
    );
    assert_eq!(results[1].as_ref().unwrap(), &Some(2));

    let again = loader.load(1);
    assert!(again.is_done());
    assert!(again.await.is_err());
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn per_key_errors_are_evicted_without_error_caching() {
    let calls = Calls::default();
    let loader = DataLoader::new(
        OddsFail { calls: Arc::clone(&calls) },
        DataLoaderOptions::new().with_caching_errors(false),
    );

    let all = loader.load_many(vec![2, 3]);
    loader.dispatch().await;
    assert_eq!(all.await.unwrap_err().to_string(), "odd key 3");

    assert!(loader.get_if_present(&3).is_none());
    assert!(loader.get_if_present(&2).is_some());

    let retried = loader.load(3);
    loader.dispatch().await;
    assert!(retried.await.is_err());
    assert_eq!(*calls.lock(), vec![vec![2, 3], vec![3]]);
}

#[tokio::test]
async fn batch_failure_fails_and_evicts_every_key() {
    let calls = Calls::default();
    let statistics = Arc::new(SimpleStatisticsCollector::new());
    let loader = DataLoader::new(
        OddsFail { calls: Arc::clone(&calls) },
        DataLoaderOptions::new().with_statistics(statistics.clone()),
    );

    let results = loader.load_many_settled(vec![-2, 4]);
    loader.dispatch().await;
    for result in results.await {
        assert_eq!(result.unwrap_err().to_string(), "negative key");
    }
    assert!(loader.get_if_present(&4).is_none());

    let retried = loader.load(4);
    loader.dispatch().await;
    assert_eq!(retried.await.unwrap(), Some(4));

    let stats = loader.statistics();
    assert_eq!(stats.batch_load_exception_count, 1);
    assert_eq!(stats.batch_invoke_count, 2);
}

#[tokio::test]
async fn prime_error_is_served_from_cache() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    loader.prime_error(5, LoadError::msg("known bad"));
    assert_eq!(loader.load(5).await.unwrap_err().to_string(), "known bad");
    assert!(calls.lock().is_empty());
}

#[tokio::test]
async fn statistics_count_loads_hits_and_batches() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let statistics = Arc::new(SimpleStatisticsCollector::new());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new().with_statistics(statistics));

    loader.load(5);
    loader.load(5);
    loader.load(8);
    loader.dispatch().await;

    let stats = loader.statistics();
    assert_eq!(stats.load_count, 3);
    assert_eq!(stats.cache_hit_count, 1);
    assert_eq!(stats.batch_invoke_count, 1);
    assert_eq!(stats.batch_load_count, 2);
    assert_eq!(stats.cache_miss_count(), 2);
}

struct ContextEcho;

#[async_trait]
impl BatchFunction<i64, String> for ContextEcho {
    async fn load(
        &self,
        keys: &[i64],
        env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<String>>, LoadError> {
        let tenant = env
            .raw_context()
            .and_then(|ctx| ctx.downcast_ref::<String>())
            .cloned()
            .unwrap_or_default();
        Ok(keys
            .iter()
            .map(|k| {
                let caller = env.key_context::<&'static str>(k).copied().unwrap_or("-");
                Ok(Some(format!("{}/{}/{}", tenant, caller, k)))
            })
            .collect())
    }
}

#[tokio::test]
async fn batch_and_key_contexts_reach_the_batch_function() {
    let loader = DataLoader::new(
        ContextEcho,
        DataLoaderOptions::new()
            .with_batch_context(|| Some(Arc::new("acme".to_owned()) as BatchContext)),
    );

    let a = loader.load_with_context(1, Arc::new("alice"));
    let bob: KeyContext = Arc::new("bob");
    let many = loader.load_many_with_contexts(vec![(2, Some(bob)), (3, None)]);
    loader.dispatch().await;

    assert_eq!(a.await.unwrap().unwrap(), "acme/alice/1");
    assert_eq!(
        many.await.unwrap(),
        vec![Some("acme/bob/2".to_owned()), Some("acme/-/3".to_owned())]
    );
}

/// Records every call it is handed and runs it.
#[derive(Default)]
struct CountingScheduler {
    key_counts: Mutex<Vec<usize>>,
}

impl BatchLoaderScheduler for CountingScheduler {
    fn schedule(&self, call: ScheduledBatchLoaderCall) -> BoxFuture<'static, ()> {
        self.key_counts.lock().push(call.key_count());
        async move {
            tokio::task::yield_now().await;
            call.invoke().await;
        }
        .boxed()
    }
}

#[tokio::test]
async fn scheduler_runs_each_batch_group() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let scheduler = Arc::new(CountingScheduler::default());
    let loader = DataLoader::new(
        batch_fn,
        DataLoaderOptions::new().with_max_batch_size(2).with_scheduler(scheduler.clone()),
    );

    let values = loader.load_many(vec![5, 8, 12]);
    loader.dispatch().await;

    assert_eq!(values.await.unwrap(), vec![data("red fish"), data("blue fish"), data("two fish")]);
    assert_eq!(*scheduler.key_counts.lock(), vec![2, 1]);
    assert_eq!(calls.lock().len(), 2);
}

struct DroppingScheduler;

impl BatchLoaderScheduler for DroppingScheduler {
    fn schedule(&self, call: ScheduledBatchLoaderCall) -> BoxFuture<'static, ()> {
        drop(call);
        future::ready(()).boxed()
    }
}

#[tokio::test]
async fn dropped_scheduled_call_abandons_its_keys() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(
        batch_fn,
        DataLoaderOptions::new().with_scheduler(Arc::new(DroppingScheduler)),
    );

    let value = loader.load(5);
    loader.dispatch().await;

    assert!(matches!(value.await, Err(LoadError::Abandoned)));
    assert!(loader.get_if_present(&5).is_none());
    assert!(calls.lock().is_empty());
}

#[test]
fn abandoned_loads_are_retried_by_the_next_load() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    // Without a runtime the batch only runs inside the dispatch future.
    let value = loader.load(5);
    drop(loader.dispatch());
    assert!(matches!(block_on(value), Err(LoadError::Abandoned)));
    assert!(loader.get_if_present(&5).is_none());

    let retried = loader.load(5);
    block_on(loader.dispatch());
    assert_eq!(block_on(retried).unwrap(), data("red fish"));
    assert_eq!(*calls.lock(), vec![vec![5]]);
}

/// Doubles every key and counts how often each one reached it.
#[derive(Default)]
struct KeyCounter {
    seen: Arc<Mutex<HashMap<i64, usize>>>,
}

#[async_trait]
impl BatchFunction<i64, i64> for KeyCounter {
    async fn load(
        &self,
        keys: &[i64],
        _env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<i64>>, LoadError> {
        let mut seen = self.seen.lock();
        for key in keys {
            *seen.entry(*key).or_default() += 1;
        }
        Ok(keys.iter().map(|k| Ok(Some(k * 2))).collect())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_loads_and_dispatches_load_each_key_once() {
    const KEYS: i64 = 2000;
    let counter = KeyCounter::default();
    let seen = Arc::clone(&counter.seen);
    let loader = DataLoader::new(counter, DataLoaderOptions::new().with_max_batch_size(64));

    let workers = (0..8i64)
        .map(|worker| {
            let loader = loader.clone();
            tokio::spawn(async move {
                let mut handles = Vec::new();
                for i in 0..KEYS {
                    let key = (i * 7 + worker * 13) % KEYS;
                    handles.push((key, loader.load(key)));
                    if i % 50 == 0 {
                        let _dispatched = loader.dispatch_with_counts();
                        tokio::task::yield_now().await;
                    }
                }
                handles
            })
        })
        .collect::<Vec<_>>();

    let mut handles = Vec::new();
    for worker in future::join_all(workers).await {
        handles.extend(worker.unwrap());
    }
    loader.dispatch_and_join().await;

    for (key, handle) in handles {
        assert_eq!(handle.await.unwrap(), Some(key * 2));
    }
    let seen = seen.lock();
    assert_eq!(seen.len(), KEYS as usize);
    assert!(seen.values().all(|&count| count == 1));
}

#[derive(Default)]
struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    fn context(&self, event: String) -> Option<Box<dyn InstrumentationContext>> {
        let completed = Arc::clone(&self.events);
        self.events.lock().push(format!("begin {}", event));
        SimpleInstrumentationContext::new()
            .on_completed(move |err| {
                completed.lock().push(format!("end {} ok={}", event, err.is_none()))
            })
            .boxed()
    }
}

impl DataLoaderInstrumentation for EventLog {
    fn begin_dispatch(&self, loader: &dyn Dispatchable) -> Option<Box<dyn InstrumentationContext>> {
        self.context(format!("dispatch {}", loader.dispatch_depth()))
    }

    fn begin_batch_loader(
        &self,
        _loader: &dyn Dispatchable,
        key_count: usize,
    ) -> Option<Box<dyn InstrumentationContext>> {
        self.context(format!("batch {}", key_count))
    }
}

#[tokio::test]
async fn instrumentation_wraps_dispatch_and_batch_calls() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let log = Arc::new(EventLog::default());
    let events = Arc::clone(&log.events);
    let loader = DataLoader::new(
        batch_fn,
        DataLoaderOptions::new().with_max_batch_size(2).with_instrumentation(log),
    );

    let _values = loader.load_many(vec![5, 8, 12]);
    loader.dispatch().await;
    tokio::task::yield_now().await;

    assert_eq!(
        *events.lock(),
        vec![
            "begin dispatch 0",
            "begin batch 2",
            "end batch 2 ok=true",
            "begin batch 1",
            "end batch 1 ok=true",
            "end dispatch 0 ok=true",
        ]
    );
}

#[tokio::test]
async fn dispatch_and_join_drains_everything() {
    let (batch_fn, calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    loader.load(5);
    loader.load(8);
    let results = loader.dispatch_and_join().await;

    assert_eq!(results.len(), 2);
    assert_eq!(loader.dispatch_depth(), 0);
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn loaders_are_dispatchable() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new().with_name("fish"));
    let (other_fn, _) = DummyDataLoader::new(&fish());
    let other = DataLoader::new(other_fn, DataLoaderOptions::new());

    assert_eq!(Dispatchable::name(&loader), Some("fish"));
    assert!(loader.is_same(&loader.clone()));
    assert!(!loader.is_same(&other));

    let five = loader.load(5);
    loader.load(8);
    assert_eq!(loader.dispatch_keys(), 2);
    assert_eq!(five.await.unwrap(), data("red fish"));
}

#[tokio::test(start_paused = true)]
async fn time_since_dispatch_tracks_the_last_dispatch() {
    let (batch_fn, _calls) = DummyDataLoader::new(&fish());
    let loader = DataLoader::new(batch_fn, DataLoaderOptions::new());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(loader.time_since_dispatch() >= Duration::from_millis(50));

    loader.dispatch().await;
    assert_eq!(loader.time_since_dispatch(), Duration::ZERO);
}
