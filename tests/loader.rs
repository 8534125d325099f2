//! Single-flight engine initialization.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{FixtureEngine, simple_archive};
use unrar_session::engine::Engine;
use unrar_session::{EngineHandle, EngineLoader, Error, ExtractOptions, extract_bytes};

fn fixture_loader(delay: Duration) -> EngineLoader {
    EngineLoader::new(move || {
        std::thread::sleep(delay);
        Ok(Arc::new(FixtureEngine::new()) as Arc<dyn Engine>)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_loads_once() {
    let loader = Arc::new(fixture_loader(Duration::from_millis(50)));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.acquire().await })
        })
        .collect();

    let mut handles: Vec<EngineHandle> = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(loader.load_count(), 1);
    assert!(loader.is_ready());
    let first = &handles[0];
    assert!(handles.iter().all(|h| EngineHandle::ptr_eq(first, h)));
    assert!(EngineHandle::ptr_eq(first, &loader.get().unwrap()));
}

#[tokio::test]
async fn test_acquired_engine_extracts() {
    let loader = fixture_loader(Duration::ZERO);
    assert!(loader.get().is_none());

    let handle = loader.acquire().await.unwrap();
    let result = extract_bytes(&handle, &simple_archive(), &ExtractOptions::new()).unwrap();
    assert_eq!(result.entries[0].text().unwrap(), "123");
}

#[tokio::test]
async fn test_failed_load_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let loader = EngineLoader::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::EngineLoad {
                reason: "library not found".into(),
            })
        } else {
            Ok(Arc::new(FixtureEngine::new()) as Arc<dyn Engine>)
        }
    });

    let err = loader.acquire().await.unwrap_err();
    assert!(err.to_string().contains("library not found"), "{err}");
    assert!(!loader.is_ready());

    loader.acquire().await.unwrap();
    assert!(loader.is_ready());
    assert_eq!(loader.load_count(), 2);

    // Later calls reuse the engine.
    loader.acquire().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
