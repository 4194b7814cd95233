use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dataload_engine::{
    BatchEnvironment, BatchFunction, DataLoader, DataLoaderOptions, DispatchPredicate, LoadError,
    Loaded, ScheduledRegistry, SimpleStatisticsCollector,
};
use tracing_subscriber::EnvFilter;

// For this example, the batch function trivially loads values from a HashMap handed to it as the
// batch context.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, String> for MyBatchFn {
    async fn load(
        &self,
        keys: &[i64],
        env: &BatchEnvironment<i64>,
    ) -> Result<Vec<Loaded<String>>, LoadError> {
        let films = env
            .context::<HashMap<i64, String>>()
            .ok_or_else(|| LoadError::msg("no films"))?;
        Ok(keys.iter().map(|k| Ok(films.get(k).cloned())).collect())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut films = HashMap::new();
    films.insert(2001, "a space odyssey".to_owned());
    films.insert(7, "samurai".to_owned());
    films.insert(12, "angry men".to_owned());
    let films = Arc::new(films);

    let options = DataLoaderOptions::new()
        .with_name("films")
        .with_statistics(Arc::new(SimpleStatisticsCollector::new()))
        .with_batch_context(move || Some(films.clone() as dataload_engine::BatchContext));
    let loader = DataLoader::new(MyBatchFn, options);

    let samurai = loader.load(7);
    let missing = loader.load(15);
    loader.dispatch().await;
    assert_eq!(samurai.await.unwrap().as_deref(), Some("samurai"));
    assert_eq!(missing.await.unwrap(), None);

    // Hold dispatches back until at least three keys are queued.
    let registry = ScheduledRegistry::builder()
        .dispatch_predicate(DispatchPredicate::depth_greater_than(2))
        .register("films", loader.clone())
        .build()
        .expect("registry");

    let many = loader.load_many(vec![12, 2010]);
    registry.dispatch_all();
    let more = loader.load(2001);
    let (many, more) = futures::join!(many, more);

    assert_eq!(
        many.unwrap().iter().map(Option::as_deref).collect::<Vec<_>>(),
        vec![Some("angry men"), None]
    );
    assert_eq!(more.unwrap().as_deref(), Some("a space odyssey"));

    tracing::info!(statistics = ?loader.statistics(), "done");
}
