//! Integration tests for the memoizing GitHub client factory.

#[cfg(test)]
mod octokit_factory_tests {
    use async_trait::async_trait;
    use integrations_portal::client::HttpTransport;
    use integrations_portal::github::{
        GraphqlClient, GraphqlWithOwnerRepo, RestClient, RestWithOwnerRepo,
    };
    use integrations_portal::mocks::{fixtures, CountingScmAuth};
    use integrations_portal::{
        AsyncState, Entity, EntityContext, GithubClientFactory, GithubOctokitApi, Metrics,
        OwnerRepo, PortalConfig, PortalError, PortalErrorKind, PortalResult, ScmCredentials,
        ScmGithubOctokitApi,
    };
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    mock! {
        pub OctokitApi {}

        #[async_trait]
        impl GithubOctokitApi for OctokitApi {
            async fn get_rest(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<RestClient>>;
            async fn get_rest_for_entity(&self, entity: &Entity, scopes: &[String]) -> PortalResult<RestWithOwnerRepo>;
            async fn get_graphql(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<GraphqlClient>>;
            async fn get_graphql_for_entity(&self, entity: &Entity, scopes: &[String]) -> PortalResult<GraphqlWithOwnerRepo>;
        }
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(&PortalConfig::default()).unwrap()
    }

    fn rest_client() -> Arc<RestClient> {
        Arc::new(RestClient::new(
            transport(),
            "https://api.github.com",
            &ScmCredentials::bearer("ghp_test"),
        ))
    }

    fn graphql_client() -> Arc<GraphqlClient> {
        Arc::new(GraphqlClient::new(
            transport(),
            "https://api.github.com/graphql",
            &ScmCredentials::bearer("ghp_test"),
        ))
    }

    fn owner_repo() -> OwnerRepo {
        OwnerRepo {
            owner: "acme".to_string(),
            repo: "svc".to_string(),
        }
    }

    fn factory(api: MockOctokitApi) -> GithubClientFactory {
        GithubClientFactory::new(Arc::new(api))
    }

    #[tokio::test]
    async fn test_equal_scope_lists_share_one_client() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest()
            .withf(|host, scopes| host == "github.com" && scopes == ["repo".to_string()])
            .times(1)
            .returning(|_, _| Ok(rest_client()));
        let factory = factory(api);

        let first = factory.rest("github.com", vec!["repo".to_string()]);
        let second = factory.rest("github.com", vec!["repo".to_string()]);
        assert!(first.same_request(&second));

        let a = first.resolve().await.unwrap();
        let b = second.resolve().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let snapshot = factory.metrics().snapshot();
        assert_eq!(snapshot.clients_constructed, 1);
        assert_eq!(snapshot.client_cache_hits, 1);
    }

    #[tokio::test]
    async fn test_scope_order_and_content_make_distinct_keys() {
        let mut api = MockOctokitApi::new();
        api.expect_get_graphql()
            .times(3)
            .returning(|_, _| Ok(graphql_client()));
        let factory = factory(api);

        let a = factory.graphql("github.com", ["repo", "user"]);
        let b = factory.graphql("github.com", ["user", "repo"]);
        let c = factory.graphql("github.com", ["repo"]);
        let d = factory.graphql("github.com", ["repo", "user"]);

        assert!(!a.same_request(&b));
        assert!(!a.same_request(&c));
        assert!(a.same_request(&d));
        for request in [a, b, c, d] {
            request.resolve().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_hosts_are_separate_keys() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest()
            .withf(|host, _| host == "github.com")
            .times(1)
            .returning(|_, _| Ok(rest_client()));
        api.expect_get_rest()
            .withf(|host, _| host == "ghe.example.net")
            .times(1)
            .returning(|_, _| Ok(rest_client()));
        let factory = factory(api);

        let public = factory.rest("github.com", ["repo"]);
        let enterprise = factory.rest("ghe.example.net", ["repo"]);
        assert!(!public.same_request(&enterprise));
        public.resolve().await.unwrap();
        enterprise.resolve().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_memoized() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest()
            .times(1)
            .returning(|_, _| Err(PortalError::authentication("Bad credentials")));
        let factory = factory(api);

        let first = factory.rest("github.com", ["repo"]).resolve().await.unwrap_err();
        let second = factory.rest("github.com", ["repo"]);
        assert_eq!(*first.kind(), PortalErrorKind::BadCredentials);

        match second.state() {
            AsyncState::Error(error) => assert!(Arc::ptr_eq(&error, &first)),
            other => panic!("expected memoized error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_forgets_requests() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest()
            .times(2)
            .returning(|_, _| Ok(rest_client()));
        let factory = factory(api);

        factory.rest("github.com", ["repo"]).resolve().await.unwrap();
        factory.clear();
        factory.rest("github.com", ["repo"]).resolve().await.unwrap();
    }

    #[tokio::test]
    async fn test_aggregated_variant_waits_for_entity() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest_for_entity().never();
        let factory = factory(api);

        assert!(factory.rest_for_entity(&EntityContext::Loading, ["repo"]).is_loading());

        let absent = factory.rest_for_entity(&EntityContext::Absent, ["repo"]);
        assert_eq!(
            *absent.error().unwrap().kind(),
            PortalErrorKind::NoCurrentEntity
        );

        let entity_error = Arc::new(PortalError::entity_not_found("no such entity"));
        let failed = factory.rest_for_entity(&EntityContext::Error(entity_error.clone()), ["repo"]);
        assert!(Arc::ptr_eq(failed.error().unwrap(), &entity_error));

        let resolved = factory
            .resolve_rest_for_entity(&EntityContext::Absent, ["repo"])
            .await
            .unwrap_err();
        assert_eq!(*resolved.kind(), PortalErrorKind::NoCurrentEntity);
    }

    #[tokio::test]
    async fn test_aggregated_variant_with_loaded_entity() {
        let mut api = MockOctokitApi::new();
        api.expect_get_graphql_for_entity()
            .withf(|entity, scopes| entity.metadata.name == "svc" && scopes.len() == 1)
            .times(1)
            .returning(|_, _| {
                Ok(GraphqlWithOwnerRepo {
                    client: graphql_client(),
                    owner_repo: owner_repo(),
                })
            });
        let factory = factory(api);
        let current = EntityContext::Loaded(fixtures::entity_with_source(
            "svc",
            "url:https://github.com/acme/svc",
        ));

        let resolved = factory
            .resolve_graphql_for_entity(&current, ["repo"])
            .await
            .unwrap();
        assert_eq!(resolved.owner_repo, owner_repo());

        match factory.graphql_for_entity(&current, ["repo"]) {
            AsyncState::Value(value) => assert!(Arc::ptr_eq(&value.client, &resolved.client)),
            other => panic!("expected value, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_custom_entity_authenticates_once() {
        let auth = Arc::new(CountingScmAuth::new("ghp_counted"));
        let api = ScmGithubOctokitApi::new(PortalConfig::default(), auth.clone()).unwrap();
        let factory = GithubClientFactory::with_metrics(Arc::new(api), Arc::new(Metrics::new()));
        let entity = fixtures::entity_with_source("svc", "url:https://github.com/acme/svc/tree/main/");

        let first = factory.rest_for_custom_entity(&entity, vec!["repo".to_string()]);
        let second = factory.rest_for_custom_entity(&entity.clone(), vec!["repo".to_string()]);

        let a = first.resolve().await.unwrap();
        let b = second.resolve().await.unwrap();

        assert_eq!(auth.calls(), 1);
        assert_eq!(auth.requests()[0].url, "https://github.com/");
        assert!(Arc::ptr_eq(&a.client, &b.client));
        assert_eq!(a.owner_repo.to_string(), "acme/svc");
    }

    #[tokio::test]
    async fn test_state_settles_without_awaiting() {
        let mut api = MockOctokitApi::new();
        api.expect_get_rest()
            .times(1)
            .returning(|_, _| Ok(rest_client()));
        let factory = factory(api);

        let request = factory.rest("github.com", ["repo"]);
        assert!(request.state().is_loading());

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while request.state().is_loading() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(request.state().value().is_some());
    }
}
