//! Integration tests for the reader content state controller.

#[cfg(test)]
mod reader_tests {
    use integrations_portal::mocks::{fixtures, MockStorageApi, SyncScript};
    use integrations_portal::techdocs::{ReaderStatus, SyncState};
    use integrations_portal::{Metrics, ReaderStateController};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn controller(storage: &MockStorageApi) -> ReaderStateController {
        ReaderStateController::new(Arc::new(storage.clone()), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_fresh_content() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new().with_page(&entity, "", "<h1>Home</h1>");
        let reader = controller(&storage);

        reader.set_input(entity.clone(), "");
        assert_eq!(reader.state().status(), ReaderStatus::Checking);

        let state = reader
            .wait_for(|state| !state.content_loading && state.sync == SyncState::UpToDate)
            .await;
        assert_eq!(state.status(), ReaderStatus::ContentFresh);
        assert_eq!(state.content(), Some("<h1>Home</h1>"));
        assert_eq!(storage.sync_calls(), vec![entity]);
    }

    #[tokio::test]
    async fn test_initial_build_then_reload() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new().with_sync(
            &entity,
            SyncScript::updated(&["Preparing docs", "Building site"]),
        );
        let sync_gate = storage.gate_sync(&entity);
        let reader = controller(&storage);

        reader.set_input(entity.clone(), "");
        let state = reader
            .wait_for(|state| state.build_log.len() == 2 && !state.content_loading)
            .await;
        assert_eq!(state.sync, SyncState::Building);
        assert_eq!(state.status(), ReaderStatus::InitialBuild);

        storage.set_page(&entity, "", "<h1>Built</h1>");
        sync_gate.notify_one();

        let state = reader.wait_for(|state| state.content().is_some()).await;
        assert_eq!(state.sync, SyncState::UpToDate);
        assert_eq!(state.status(), ReaderStatus::ContentFresh);
        assert_eq!(storage.page_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_content_with_new_build() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new()
            .with_page(&entity, "", "<h1>Old</h1>")
            .with_sync(&entity, SyncScript::updated(&["Building site"]));
        let sync_gate = storage.gate_sync(&entity);
        let reader = controller(&storage);

        reader.set_input(entity.clone(), "");
        let state = reader
            .wait_for(|state| state.content().is_some() && state.sync == SyncState::Building)
            .await;
        assert_eq!(state.status(), ReaderStatus::ContentStaleRefreshing);

        sync_gate.notify_one();
        let state = reader.wait_for(|state| state.sync == SyncState::BuildReady).await;
        assert_eq!(state.status(), ReaderStatus::ContentStaleReady);

        storage.set_page(&entity, "", "<h1>New</h1>");
        reader.refresh_content();
        let state = reader
            .wait_for(|state| state.content() == Some("<h1>New</h1>"))
            .await;
        assert_eq!(state.sync, SyncState::UpToDate);
        assert_eq!(state.status(), ReaderStatus::ContentFresh);
    }

    #[tokio::test]
    async fn test_sync_failure_with_content() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new()
            .with_page(&entity, "", "<h1>Old</h1>")
            .with_sync(&entity, SyncScript::failed(&["Building site"], "mkdocs exited with 1"));
        let reader = controller(&storage);

        reader.set_input(entity, "");
        let state = reader
            .wait_for(|state| state.content().is_some() && state.sync == SyncState::Error)
            .await;
        assert_eq!(state.status(), ReaderStatus::ContentStaleError);
        assert_eq!(state.sync_error.as_deref(), Some("mkdocs exited with 1"));
    }

    #[tokio::test]
    async fn test_missing_page() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new();
        let reader = controller(&storage);

        reader.set_input(entity, "missing/");
        let state = reader
            .wait_for(|state| !state.content_loading && state.sync == SyncState::UpToDate)
            .await;
        assert_eq!(state.status(), ReaderStatus::ContentNotFound);
        assert!(state.content_error.is_some());
    }

    #[tokio::test]
    async fn test_path_change_keeps_sync() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new()
            .with_page(&entity, "", "<h1>Home</h1>")
            .with_page(&entity, "guides/", "<h1>Guides</h1>");
        let reader = controller(&storage);

        reader.set_input(entity.clone(), "");
        reader
            .wait_for(|state| state.content().is_some() && state.sync == SyncState::UpToDate)
            .await;

        reader.set_input(entity.clone(), "guides/");
        let state = reader.state();
        assert_eq!(state.content, None);
        assert!(state.content_loading);
        assert_eq!(state.sync, SyncState::UpToDate);

        let state = reader.wait_for(|state| state.content().is_some()).await;
        assert_eq!(state.content(), Some("<h1>Guides</h1>"));
        assert_eq!(storage.sync_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_entity_change_discards_old_content() {
        let old = fixtures::entity_ref("old");
        let new = fixtures::entity_ref("new");
        let storage = MockStorageApi::new()
            .with_page(&old, "", "<p>old</p>")
            .with_page(&new, "", "<p>new</p>");
        let old_gate = storage.gate_pages(&old);
        let metrics = Arc::new(Metrics::new());
        let reader = ReaderStateController::new(Arc::new(storage.clone()), metrics.clone());

        reader.set_input(old, "");
        reader.set_input(new.clone(), "");
        let state = reader.wait_for(|state| state.content().is_some()).await;
        assert_eq!(state.content(), Some("<p>new</p>"));

        old_gate.notify_one();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while metrics.snapshot().fetches_discarded < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let state = reader.state();
        assert_eq!(state.content(), Some("<p>new</p>"));
        assert_eq!(state.input.unwrap().entity, new);
    }

    #[tokio::test]
    async fn test_same_input_is_ignored() {
        let entity = fixtures::entity_ref("svc");
        let storage = MockStorageApi::new().with_page(&entity, "", "<h1>Home</h1>");
        let reader = controller(&storage);

        reader.set_input(entity.clone(), "");
        reader.wait_for(|state| state.content().is_some()).await;
        reader.set_input(entity, "");

        assert_eq!(reader.state().content(), Some("<h1>Home</h1>"));
        assert_eq!(storage.page_calls().len(), 1);
    }
}
