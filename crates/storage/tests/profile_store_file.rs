use shared::domain::Profile;
use storage::Storage;

#[tokio::test]
async fn profiles_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!(
        "sqlite://{}",
        dir.path()
            .join("kiln.db")
            .to_string_lossy()
            .replace('\\', "/")
    );

    let profile = Profile::new("slow-bisque", [(0, 20.0), (7200, 600.0), (14400, 1000.0)]);
    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.put_profile(&profile, false).await.expect("put");
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let found = reopened
        .find_profile("slow-bisque")
        .await
        .expect("find")
        .expect("profile persisted");
    assert_eq!(found, profile);
}
