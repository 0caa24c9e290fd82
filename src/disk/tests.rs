use super::*;
use parking_lot::RwLock as PlRwLock;
use std::time::Duration;

/// A controllable clock for deterministic TTL/eviction tests, generalizing the teacher's
/// `FakeTimeSource` pattern to this crate's async `Clock` trait.
struct FakeClock(PlRwLock<SystemTime>);

impl FakeClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(PlRwLock::new(SystemTime::now())))
    }

    fn advance(&self, dur: Duration) {
        let mut guard = self.0.write();
        *guard += dur;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.0.read()
    }
}

fn sample_image() -> DecodedImage {
    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 10, 10, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    DecodedImage::decode(&buf).unwrap()
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(DiskConfig {
        directory: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let fp = Fingerprint::new("https://example.com/a.jpg");
    let image = sample_image();
    cache.put(&fp, &image).await.unwrap();

    let fetched = cache.get(&fp).await.expect("should be a disk hit");
    assert_eq!(fetched.width, image.width);
    assert_eq!(fetched.height, image.height);
}

#[tokio::test]
async fn miss_on_unknown_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(DiskConfig {
        directory: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let fp = Fingerprint::new("https://example.com/missing.jpg");
    assert!(cache.get(&fp).await.is_none());
}

#[tokio::test]
async fn expires_entries_past_max_age() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let cache = DiskCache::with_clock(
        DiskConfig {
            directory: dir.path().to_path_buf(),
            max_age: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        clock.clone(),
    )
    .await
    .unwrap();

    let fp = Fingerprint::new("https://example.com/a.jpg");
    cache.put(&fp, &sample_image()).await.unwrap();
    assert!(cache.get(&fp).await.is_some());

    clock.advance(Duration::from_secs(61));
    assert!(cache.get(&fp).await.is_none());
}

#[tokio::test]
async fn evicts_lru_when_over_disk_budget() {
    let dir = tempfile::tempdir().unwrap();

    let img = image::RgbaImage::from_fn(400, 400, |x, y| {
        image::Rgba([(x % 255) as u8, (y % 255) as u8, 128, 255])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    let image = DecodedImage::decode(&buf).unwrap();
    let one_entry_size = image.to_jpeg_bytes(90).unwrap().len() as u64;

    // Budget room for 3 entries; inserting 6 must evict the 3 oldest-accessed ones.
    let cache = DiskCache::new(DiskConfig {
        directory: dir.path().to_path_buf(),
        max_disk_bytes: one_entry_size * 3,
        max_age: None,
        quality: 90,
    })
    .await
    .unwrap();

    let mut fps = Vec::new();
    for i in 0..6 {
        let fp = Fingerprint::new(&format!("https://example.com/{i}.jpg"));
        cache.put(&fp, &image).await.unwrap();
        fps.push(fp);
        // keep each put a distinct instant so LRU ordering is well defined
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(cache.byte_size().await <= one_entry_size * 3);
    // the earliest-inserted entries should have been evicted first
    assert!(cache.get(&fps[0]).await.is_none());
    assert!(cache.get(&fps[5]).await.is_some());
}

#[tokio::test]
async fn remove_deletes_file_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(DiskConfig {
        directory: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let fp = Fingerprint::new("https://example.com/a.jpg");
    cache.put(&fp, &sample_image()).await.unwrap();
    cache.remove(&fp).await;
    assert!(cache.get(&fp).await.is_none());
}

#[tokio::test]
async fn corrupt_metadata_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("access_times.json"), b"not json")
        .await
        .unwrap();

    let cache = DiskCache::new(DiskConfig {
        directory: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let fp = Fingerprint::new("https://example.com/a.jpg");
    assert!(cache.get(&fp).await.is_none());
    cache.put(&fp, &sample_image()).await.unwrap();
    assert!(cache.get(&fp).await.is_some());
}
