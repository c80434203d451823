//! Grant lifecycle tests
//!
//! Drive the coordinator through issue, exchange, refresh and revocation against
//! every storage backend that can run in-process.

use chrono::{Duration, Utc};
use grantkeep::errors::{GrantError, StorageError};
use grantkeep::oauth::{AuthorizationGrant, Client, GrantCoordinator, Metadata, OAuthStorage};
use grantkeep::storage::{StorageBackend, create_storage_backend};
use std::sync::Arc;

async fn backends() -> Vec<(&'static str, Arc<dyn OAuthStorage>)> {
    let mut backends: Vec<(&'static str, Arc<dyn OAuthStorage>)> = vec![(
        "memory",
        create_storage_backend(StorageBackend::Memory, 1)
            .await
            .unwrap(),
    )];

    #[cfg(feature = "sqlite")]
    backends.push((
        "sqlite",
        create_storage_backend(StorageBackend::Sqlite("sqlite::memory:".to_string()), 1)
            .await
            .unwrap(),
    ));

    backends
}

async fn coordinator(storage: Arc<dyn OAuthStorage>) -> GrantCoordinator {
    storage
        .create_client(&Client::new(
            "c1".to_string(),
            "s1".to_string(),
            "https://app/cb".to_string(),
            Metadata::empty(),
        ))
        .await
        .unwrap();
    GrantCoordinator::new(storage)
}

#[tokio::test]
async fn test_issue_and_exchange_code_once() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let before = Utc::now();
        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "xyz")
            .await
            .unwrap();
        assert_eq!(grant.state, "xyz", "{name}");
        assert_eq!(grant.scope, "read", "{name}");
        let lifetime = grant.expires_at - before;
        assert!(
            lifetime >= Duration::seconds(599) && lifetime <= Duration::seconds(601),
            "{name}: code lifetime {lifetime}"
        );

        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        assert!(!pair.access_token.is_empty(), "{name}");
        assert!(pair.refresh_token.as_deref().is_some_and(|r| !r.is_empty()), "{name}");
        assert_eq!(pair.scope, "read", "{name}");

        // The code was consumed by the exchange.
        let replay = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await;
        assert!(matches!(replay, Err(GrantError::InvalidGrant(_))), "{name}");
        assert!(matches!(
            storage.load_authorization(&grant.code).await,
            Err(StorageError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_refresh_rotates_pair() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let first = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        let r1 = first.refresh_token.clone().unwrap();

        let second = coordinator.refresh_tokens(&r1).await.unwrap();
        let r2 = second.refresh_token.clone().unwrap();
        assert_ne!(second.access_token, first.access_token, "{name}");
        assert_ne!(r2, r1, "{name}");
        assert_eq!(second.client_id, "c1", "{name}");
        assert_eq!(second.scope, first.scope, "{name}");
        assert_eq!(second.redirect_uri, first.redirect_uri, "{name}");

        assert!(matches!(
            storage.load_access(&first.access_token).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.load_by_refresh(&r1).await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(
            storage.load_access(&second.access_token).await.unwrap().access_token,
            second.access_token
        );

        // The old refresh token cannot be replayed.
        assert!(matches!(
            coordinator.refresh_tokens(&r1).await,
            Err(GrantError::InvalidGrant(_))
        ));
    }
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let now = Utc::now();
        let grant = AuthorizationGrant {
            code: "stale".to_string(),
            client_id: "c1".to_string(),
            scope: "read".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            state: String::new(),
            metadata: Metadata::empty(),
            created_at: now - Duration::seconds(601),
            expires_at: now - Duration::seconds(1),
        };
        storage.save_authorization(&grant).await.unwrap();

        assert!(
            matches!(
                storage.load_authorization("stale").await,
                Err(StorageError::Expired(_))
            ),
            "{name}"
        );
        assert!(
            matches!(
                coordinator
                    .exchange_code("stale", "c1", "https://app/cb")
                    .await,
                Err(GrantError::InvalidGrant(_))
            ),
            "{name}"
        );

        assert_eq!(coordinator.purge_expired().await.unwrap(), 1, "{name}");
        assert!(matches!(
            storage.load_authorization("stale").await,
            Err(StorageError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_redirect_binding() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        assert!(
            matches!(
                coordinator
                    .begin_authorization("c1", "https://evil/cb", "read", "")
                    .await,
                Err(GrantError::RedirectMismatch)
            ),
            "{name}"
        );
        assert!(
            matches!(
                coordinator
                    .begin_authorization("nobody", "https://app/cb", "read", "")
                    .await,
                Err(GrantError::UnknownClient(_))
            ),
            "{name}"
        );

        let grant = coordinator
            .begin_authorization("c1", "", "read", "")
            .await
            .unwrap();
        assert_eq!(grant.redirect_uri, "https://app/cb", "{name}");

        // A mismatched exchange leaves the code usable.
        assert!(matches!(
            coordinator
                .exchange_code(&grant.code, "c1", "https://app/other")
                .await,
            Err(GrantError::InvalidGrant(_))
        ));
        assert!(matches!(
            coordinator
                .exchange_code(&grant.code, "c2", "https://app/cb")
                .await,
            Err(GrantError::InvalidGrant(_))
        ));
        coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_exchange_has_one_winner() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();

        let (first, second) = futures::join!(
            coordinator.exchange_code(&grant.code, "c1", "https://app/cb"),
            coordinator.exchange_code(&grant.code, "c1", "https://app/cb"),
        );

        let winners = [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(winners, 1, "{name}");
        for result in [first, second] {
            if let Err(err) = result {
                assert!(matches!(err, GrantError::InvalidGrant(_)), "{name}");
            }
        }
    }
}

#[tokio::test]
async fn test_revocation_and_bearer_validation() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "write read", "")
            .await
            .unwrap();
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();

        let info = coordinator.validate_bearer(&pair.access_token).await.unwrap();
        assert_eq!(info.client_id, "c1", "{name}");
        assert_eq!(info.scope, "read write", "{name}");
        assert!(info.remaining_ttl > Duration::seconds(3500), "{name}");

        coordinator.revoke_access(&pair.access_token).await.unwrap();
        assert!(
            matches!(
                coordinator.validate_bearer(&pair.access_token).await,
                Err(GrantError::InvalidToken(_))
            ),
            "{name}"
        );
        // The refresh token went with its pair.
        assert!(matches!(
            coordinator
                .refresh_tokens(pair.refresh_token.as_deref().unwrap())
                .await,
            Err(GrantError::InvalidGrant(_))
        ));
        // Revoking twice is fine.
        coordinator.revoke_access(&pair.access_token).await.unwrap();

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        coordinator
            .revoke_refresh(pair.refresh_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            coordinator.validate_bearer(&pair.access_token).await,
            Err(GrantError::InvalidToken(_))
        ));
    }
}

#[tokio::test]
async fn test_removing_client_cascades() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let pending = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();

        storage.remove_client("c1").await.unwrap();

        assert!(
            matches!(
                storage.get_client("c1").await,
                Err(StorageError::NotFound(_))
            ),
            "{name}"
        );
        assert!(matches!(
            storage.load_authorization(&pending.code).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.load_access(&pair.access_token).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage
                .load_by_refresh(pair.refresh_token.as_deref().unwrap())
                .await,
            Err(StorageError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_metadata_follows_the_code() {
    for (name, storage) in backends().await {
        let coordinator = coordinator(storage.clone()).await;

        let metadata = Metadata::from(vec![0u8, 159, 146, 150]);
        let grant = coordinator
            .begin_authorization_with_metadata("c1", "https://app/cb", "read", "", metadata.clone())
            .await
            .unwrap();
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        let loaded = storage.load_access(&pair.access_token).await.unwrap();
        assert_eq!(loaded.metadata, metadata, "{name}");

        let rotated = coordinator
            .refresh_tokens(pair.refresh_token.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(rotated.metadata, metadata, "{name}");
    }
}
