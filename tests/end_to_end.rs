use pixelcache::{CacheManagerConfig, CacheManager, LoadOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn sample_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(6, 6, image::Rgba([5, 6, 7, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Spawns a local server that counts requests and always returns `body` with status 200.
fn spawn_counting_server(body: Vec<u8>) -> (String, Arc<AtomicUsize>, std::thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let url = format!("http://{addr}");
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let handle = std::thread::spawn(move || {
        for request in server.incoming_requests() {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            let response = tiny_http::Response::from_data(body.clone());
            request.respond(response).ok();
        }
    });
    (url, hits, handle)
}

#[tokio::test]
async fn load_is_a_cache_hit_on_second_call() {
    let (url, hits, _server) = spawn_counting_server(sample_png());
    let dir = tempfile::tempdir().unwrap();
    let config = CacheManagerConfig::builder()
        .disk_directory(dir.path().to_path_buf())
        .build();
    let manager = CacheManager::new(config).await.unwrap();

    let first = manager.load(&url, LoadOptions::new()).await.unwrap();
    let second = manager.load(&url, LoadOptions::new()).await.unwrap();

    assert_eq!((first.width, first.height), (second.width, second.height));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fifty_concurrent_loads_trigger_one_network_fetch() {
    let (url, hits, _server) = spawn_counting_server(sample_png());
    let dir = tempfile::tempdir().unwrap();
    let config = CacheManagerConfig::builder()
        .disk_directory(dir.path().to_path_buf())
        .build();
    let manager = CacheManager::new(config).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let manager = Arc::clone(&manager);
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            manager.load(&url, LoadOptions::new()).await
        }));
    }

    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn without_cache_never_reads_or_writes_either_tier() {
    let (url, hits, _server) = spawn_counting_server(sample_png());
    let dir = tempfile::tempdir().unwrap();
    let config = CacheManagerConfig::builder()
        .disk_directory(dir.path().to_path_buf())
        .build();
    let manager = CacheManager::new(config).await.unwrap();

    manager.load(&url, LoadOptions::new().without_cache()).await.unwrap();
    manager.load(&url, LoadOptions::new().without_cache()).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(manager.get(&url).await.is_none());
}

#[tokio::test]
async fn progress_sink_reports_monotonic_values() {
    let (url, _hits, _server) = spawn_counting_server(sample_png());
    let dir = tempfile::tempdir().unwrap();
    let config = CacheManagerConfig::builder()
        .disk_directory(dir.path().to_path_buf())
        .build();
    let manager = CacheManager::new(config).await.unwrap();

    let values: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let values_clone = Arc::clone(&values);
    let sink: pixelcache::downloader::ProgressSink = Arc::new(move |p| {
        values_clone.lock().unwrap().push(p);
    });

    manager
        .load(&url, LoadOptions::new().with_progress(sink))
        .await
        .unwrap();

    let observed = values.lock().unwrap();
    let mut prev = 0.0f32;
    for &v in observed.iter() {
        assert!((0.0..=1.0).contains(&v));
        assert!(v >= prev);
        prev = v;
    }
}

#[tokio::test]
async fn prefetch_populates_cache_in_background() {
    let (url, _hits, _server) = spawn_counting_server(sample_png());
    let dir = tempfile::tempdir().unwrap();
    let config = CacheManagerConfig::builder()
        .disk_directory(dir.path().to_path_buf())
        .build();
    let manager = CacheManager::new(config).await.unwrap();

    manager.prefetch(vec![url.clone()]);

    // Give the background task a moment to complete; poll rather than sleep-and-hope.
    for _ in 0..50 {
        if manager.get(&url).await.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("prefetch did not populate the cache in time");
}
