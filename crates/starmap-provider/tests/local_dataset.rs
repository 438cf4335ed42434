use starmap_core::LinkMode;
use starmap_provider::{LocalDatasetProvider, NeighborProvider, ProviderError};
use std::io::Write;
use std::sync::Arc;

fn write_dataset(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn loads_dataset_from_disk() {
    let file = write_dataset(
        r#"{
            "ocean": ["sea", "wave", "tide"],
            "sea": {"neighbors": ["ocean", "coast"], "summary": "Large body of salt water."},
            "wave": ["ocean", "surf"]
        }"#,
    );
    let provider = LocalDatasetProvider::from_file(file.path(), 16).unwrap();
    assert_eq!(provider.dataset().len(), 3);
    assert_eq!(provider.name(), "local");

    let set = provider
        .fetch_neighbor_set("Ocean", LinkMode::Outlinks)
        .await
        .unwrap();
    assert_eq!(set.center.title, "ocean");
    assert_eq!(set.neighbors, vec!["sea", "wave", "tide"]);

    let back = provider
        .fetch_neighbor_set("ocean", LinkMode::Backlinks)
        .await
        .unwrap();
    assert_eq!(back.neighbors, vec!["sea", "wave"]);
}

#[tokio::test]
async fn max_neighbors_truncates() {
    let file = write_dataset(r#"{"hub": ["a", "b", "c", "d", "e"]}"#);
    let provider = LocalDatasetProvider::from_file(file.path(), 4)
        .unwrap()
        .with_max_neighbors(2);
    let set = provider
        .fetch_neighbor_set("hub", LinkMode::Outlinks)
        .await
        .unwrap();
    assert_eq!(set.neighbors, vec!["a", "b"]);
}

#[tokio::test]
async fn usable_as_trait_object() {
    let file = write_dataset(r#"{"x": ["y"], "y": ["x"]}"#);
    let provider: Arc<dyn NeighborProvider> =
        Arc::new(LocalDatasetProvider::from_file(file.path(), 4).unwrap());

    let a = provider.clone();
    let b = provider.clone();
    let (left, right) = tokio::join!(
        a.fetch_neighbor_set("x", LinkMode::Outlinks),
        b.fetch_neighbor_set("X", LinkMode::Outlinks)
    );
    assert_eq!(left.unwrap(), right.unwrap());

    provider.clear_caches();
    assert!(provider.fetch_neighbor_set("x", LinkMode::Outlinks).await.is_ok());
}

#[test]
fn missing_file_is_io_error() {
    let err = LocalDatasetProvider::from_file("/nonexistent/starmap/dataset.json", 4)
        .err()
        .unwrap();
    assert!(matches!(err, ProviderError::Io(_)));
}
