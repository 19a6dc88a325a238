use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use xradio_proto::catalog::{self, Catalog, CatalogEntry, CatalogOrigin};

const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

fn catalog_of(entries: &[(u64, &str)]) -> Catalog {
    entries
        .iter()
        .map(|(id, title)| CatalogEntry {
            id: *id,
            title: title.to_string(),
            group: None,
        })
        .collect()
}

fn backdate(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[tokio::test]
async fn fresh_cache_is_loaded_without_remote_retrieval() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rockradio.json");
    let cached = catalog_of(&[(1, "Classic Rock"), (2, "Metal")]);
    catalog::save(&path, &cached).unwrap();
    backdate(&path, Duration::from_secs(3600));

    let fetched = Cell::new(0);
    let (catalog, origin) = catalog::load_or_refresh(&path, WEEK, false, || async {
        fetched.set(fetched.get() + 1);
        Ok::<_, std::io::Error>(catalog_of(&[(99, "Remote")]))
    })
    .await
    .unwrap();

    assert_eq!(origin, CatalogOrigin::Cache);
    assert_eq!(fetched.get(), 0);
    assert_eq!(catalog, cached);
}

#[tokio::test]
async fn expired_cache_is_regenerated_and_overwritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rockradio.json");
    catalog::save(&path, &catalog_of(&[(1, "Old")])).unwrap();
    backdate(&path, WEEK + Duration::from_secs(60));

    let remote = catalog_of(&[(3, "Punk"), (4, "Grunge")]);
    let (catalog, origin) = catalog::load_or_refresh(&path, WEEK, false, || async {
        Ok::<_, std::io::Error>(remote.clone())
    })
    .await
    .unwrap();

    assert_eq!(origin, CatalogOrigin::Remote);
    assert_eq!(catalog, remote);
    assert_eq!(catalog::load(&path).unwrap(), remote);
    assert!(!catalog::is_stale(&path, WEEK));
}

#[tokio::test]
async fn no_cache_flag_bypasses_fresh_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jazzradio.json");
    catalog::save(&path, &catalog_of(&[(1, "Bebop")])).unwrap();

    let (catalog, origin) = catalog::load_or_refresh(&path, WEEK, true, || async {
        Ok::<_, std::io::Error>(catalog_of(&[(2, "Swing")]))
    })
    .await
    .unwrap();

    assert_eq!(origin, CatalogOrigin::Remote);
    assert!(catalog.contains(2));
    assert!(!catalog.contains(1));
}

#[tokio::test]
async fn corrupt_cache_falls_back_to_remote() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zenradio.json");
    std::fs::write(&path, "{ not json").unwrap();

    let (catalog, origin) = catalog::load_or_refresh(&path, WEEK, false, || async {
        Ok::<_, std::io::Error>(catalog_of(&[(8, "Spa")]))
    })
    .await
    .unwrap();

    assert_eq!(origin, CatalogOrigin::Remote);
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn remote_failure_is_propagated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.json");

    let result = catalog::load_or_refresh(&path, WEEK, false, || async {
        Err::<Catalog, _>(std::io::Error::new(std::io::ErrorKind::Other, "offline"))
    })
    .await;

    assert!(result.is_err());
    assert!(!path.exists());
}
