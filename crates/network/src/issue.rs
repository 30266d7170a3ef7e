#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use gaspump_auth::{
    BearerError, BearerToken, EaclTable, Lifetime, PendingBearer, SessionBuilder, SessionError,
    SessionHandle, SessionToken, SignerKey, UnsignedBearer, UnsignedSession,
};
use gaspump_core::{epoch_expiry, expiry_for_duration, EpochError, NetworkInfo, OwnerId};

use crate::{NetworkClient, NetworkError};

/// How far ahead a token should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// An absolute epoch.
    Epoch(u64),
    EpochsAhead(u64),
    /// Converted with the network's current block time and epoch length.
    Duration(Duration),
}

impl Expiry {
    pub fn resolve(&self, info: &NetworkInfo) -> Result<u64, EpochError> {
        match *self {
            Self::Epoch(epoch) => Ok(epoch),
            Self::EpochsAhead(epochs) => epoch_expiry(info.current_epoch, epochs),
            Self::Duration(duration) => expiry_for_duration(info, duration),
        }
    }
}

/// Who signs the bearer token.
#[derive(Debug)]
pub enum SigningMode {
    /// The container owner's key is available locally.
    Local(SignerKey),
    /// The owner signs elsewhere; issuance stops at a pending token.
    Remote,
}

#[derive(Debug)]
pub struct BearerRequest {
    /// The principal allowed to present the token.
    pub owner: OwnerId,
    pub table: EaclTable,
    pub expiry: Expiry,
    pub signing: SigningMode,
}

#[derive(Debug)]
pub enum BearerOutcome {
    Signed(BearerToken),
    Pending(PendingBearer),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Epoch(#[from] EpochError),
    #[error(transparent)]
    Bearer(#[from] BearerError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("expiry epoch {exp} is not after current epoch {current_epoch}")]
    ExpiryNotInFuture { exp: u64, current_epoch: u64 },
    #[error("token issuance cancelled after {0:?}")]
    Cancelled(Duration),
}

/// Builds a bearer token against a fresh network clock. With
/// [`SigningMode::Remote`] the result carries the payload for the owner.
pub async fn build_bearer_token(
    client: &dyn NetworkClient,
    request: BearerRequest,
) -> Result<BearerOutcome, IssueError> {
    let info = client.network_info().await?;
    let exp = request.expiry.resolve(&info)?;
    let unsigned = UnsignedBearer::new(
        request.owner,
        request.table,
        Lifetime::starting_at(info.current_epoch, exp),
        info.current_epoch,
    )?;

    tracing::info!(
        owner = %request.owner,
        container = %unsigned.table().container_id(),
        current_epoch = info.current_epoch,
        exp,
        "building bearer token"
    );

    match request.signing {
        SigningMode::Local(key) => Ok(BearerOutcome::Signed(unsigned.sign(&key)?)),
        SigningMode::Remote => Ok(BearerOutcome::Pending(PendingBearer::new(unsigned))),
    }
}

pub async fn create_session(
    client: &dyn NetworkClient,
    expiry_epoch: u64,
) -> Result<SessionHandle, NetworkError> {
    let handle = client.create_session(expiry_epoch).await?;
    tracing::debug!(session = %handle.id, exp = expiry_epoch, "session created");
    Ok(handle)
}

/// Opens a session and signs a token for the single operation `scope`
/// selects on the builder.
pub async fn issue_session_token<S>(
    client: &dyn NetworkClient,
    key: &SignerKey,
    expiry: Expiry,
    scope: S,
) -> Result<SessionToken, IssueError>
where
    S: FnOnce(SessionBuilder) -> UnsignedSession,
{
    let info = client.network_info().await?;
    let exp = expiry.resolve(&info)?;
    if exp <= info.current_epoch {
        return Err(IssueError::ExpiryNotInFuture {
            exp,
            current_epoch: info.current_epoch,
        });
    }

    let handle = create_session(client, exp).await?;
    let builder = SessionBuilder::new(handle, exp).valid_from(info.current_epoch);
    Ok(scope(builder).sign(key)?)
}

/// Runs an issuance future under `limit`. On expiry the future is dropped
/// and nothing it built is returned.
pub async fn with_timeout<T, F>(limit: Duration, issuance: F) -> Result<T, IssueError>
where
    F: Future<Output = Result<T, IssueError>>,
{
    match tokio::time::timeout(limit, issuance).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?limit, "token issuance cancelled");
            Err(IssueError::Cancelled(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use gaspump_auth::{
        put_allow_deny_others, sign_bytes_on_behalf, OwnerSignature, SessionContext, Validity,
    };
    use gaspump_core::{Address, ContainerId};

    use super::*;
    use crate::test_support::MemoryNetwork;

    fn container() -> ContainerId {
        ContainerId::from_definition(b"issue tests")
    }

    fn request(grantee: &SignerKey, expiry: Expiry, signing: SigningMode) -> BearerRequest {
        BearerRequest {
            owner: grantee.owner_id(),
            table: put_allow_deny_others(container(), Some(&grantee.public_key_bytes())),
            expiry,
            signing,
        }
    }

    #[test]
    fn expiry_resolution() {
        let info = NetworkInfo {
            current_epoch: 1_000,
            ms_per_block: 15_000,
            epoch_duration_blocks: Some(240),
        };
        assert_eq!(Expiry::Epoch(1_234).resolve(&info), Ok(1_234));
        assert_eq!(Expiry::EpochsAhead(10).resolve(&info), Ok(1_010));
        assert_eq!(
            Expiry::Duration(Duration::from_secs(5 * 60 * 60)).resolve(&info),
            Ok(1_005)
        );

        let missing = NetworkInfo {
            epoch_duration_blocks: None,
            ..info
        };
        assert_eq!(
            Expiry::Duration(Duration::from_secs(60)).resolve(&missing),
            Err(EpochError::MissingEpochDuration)
        );
    }

    #[tokio::test]
    async fn local_signing_returns_verified_token() {
        let network = MemoryNetwork::testnet();
        let owner = SignerKey::generate();
        let grantee = SignerKey::generate();

        let outcome = build_bearer_token(
            &network,
            request(&grantee, Expiry::EpochsAhead(10), SigningMode::Local(owner.clone())),
        )
        .await
        .expect("build");

        let BearerOutcome::Signed(token) = outcome else {
            panic!("expected a signed token");
        };
        token.verify_issuer(&owner.owner_id()).expect("verify");
        assert_eq!(token.lifetime(), Lifetime::starting_at(1_000, 1_010));
        assert_eq!(token.validity_at(1_000), Validity::Valid);
    }

    #[tokio::test]
    async fn remote_signing_returns_pending_payload() {
        let network = MemoryNetwork::testnet();
        let owner = SignerKey::generate();
        let grantee = SignerKey::generate();

        let outcome = build_bearer_token(
            &network,
            request(
                &grantee,
                Expiry::Duration(Duration::from_secs(2 * 60 * 60)),
                SigningMode::Remote,
            ),
        )
        .await
        .expect("build");

        let BearerOutcome::Pending(pending) = outcome else {
            panic!("expected a pending token");
        };
        assert_eq!(pending.unsigned().lifetime().exp, 1_002);

        let response = sign_bytes_on_behalf(pending.payload(), &owner).expect("owner signs");
        let token = pending
            .complete_from(OwnerSignature::from(response), &owner.owner_id())
            .expect("complete");
        token.verify().expect("verify");
    }

    #[tokio::test]
    async fn past_expiry_fails_construction() {
        let network = MemoryNetwork::testnet();
        let grantee = SignerKey::generate();
        let result = build_bearer_token(
            &network,
            request(&grantee, Expiry::Epoch(1_000), SigningMode::Remote),
        )
        .await;

        assert!(matches!(
            result,
            Err(IssueError::Bearer(BearerError::AlreadyExpired {
                exp: 1_000,
                current_epoch: 1_000
            }))
        ));
    }

    #[tokio::test]
    async fn network_failure_propagates() {
        let network = MemoryNetwork::testnet().offline();
        let result = build_bearer_token(
            &network,
            request(&SignerKey::generate(), Expiry::EpochsAhead(1), SigningMode::Remote),
        )
        .await;
        assert!(matches!(
            result,
            Err(IssueError::Network(NetworkError::Transport(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_network_is_cancelled() {
        let network = MemoryNetwork::testnet().with_latency(Duration::from_secs(30));
        let result = with_timeout(
            Duration::from_secs(15),
            build_bearer_token(
                &network,
                request(&SignerKey::generate(), Expiry::EpochsAhead(1), SigningMode::Remote),
            ),
        )
        .await;

        assert!(matches!(
            result,
            Err(IssueError::Cancelled(limit)) if limit == Duration::from_secs(15)
        ));
    }

    #[tokio::test]
    async fn session_token_is_scoped_and_signed() {
        let network = MemoryNetwork::testnet();
        let key = SignerKey::generate();
        let address = Address::container(container());

        let token = issue_session_token(&network, &key, Expiry::EpochsAhead(5), |builder| {
            builder.object_put(address)
        })
        .await
        .expect("issue");

        token.verify().expect("verify");
        assert_eq!(token.owner(), key.owner_id());
        assert_eq!(token.lifetime(), Lifetime::starting_at(1_000, 1_005));
        assert!(token.authorizes(&SessionContext::Object {
            verb: gaspump_auth::ObjectVerb::Put,
            address,
        }));
        assert_eq!(network.sessions(), vec![(token.id(), 1_005)]);
    }

    #[tokio::test]
    async fn session_expiry_must_be_in_future() {
        let network = MemoryNetwork::testnet();
        let key = SignerKey::generate();
        let result = issue_session_token(&network, &key, Expiry::EpochsAhead(0), |builder| {
            builder.container_delete(container())
        })
        .await;

        assert_eq!(
            result.err(),
            Some(IssueError::ExpiryNotInFuture {
                exp: 1_000,
                current_epoch: 1_000
            })
        );
        assert!(network.sessions().is_empty());
    }
}
