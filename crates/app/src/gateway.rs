#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use gaspump_auth::{
    decode_public_key, owner_id_from_public_key, put_allow_deny_others, BearerToken, EaclTable,
    ObjectVerb, OwnerSignature, PendingBearer, SessionToken, SignerKey,
};
use gaspump_core::expiration::EXPIRATION_EPOCH_ATTR;
use gaspump_core::{prepare_expiration_headers, Address, ContainerId, OwnerId};
use gaspump_network::{
    await_container, build_bearer_token, issue_session_token, set_eacl_and_wait, with_timeout,
    BearerOutcome, BearerRequest, Expiry, IssueError, NetworkClient, SigningMode,
};

use crate::AppConfig;

/// Token issuance for an upload gateway: every operation reads a fresh
/// network clock and runs under the configured request timeout.
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn NetworkClient>,
    config: AppConfig,
}

impl Gateway {
    pub fn new(client: Arc<dyn NetworkClient>, config: AppConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn lifetime(&self) -> Expiry {
        Expiry::EpochsAhead(self.config.token_lifetime_epochs)
    }

    /// Issues a bearer token letting `grantee_key` put objects into
    /// `container` while everyone else is denied. With
    /// [`SigningMode::Remote`] the owner still has to sign the payload.
    pub async fn issue_upload_bearer(
        &self,
        container: ContainerId,
        grantee_key: &[u8],
        signing: SigningMode,
    ) -> anyhow::Result<BearerOutcome> {
        let grantee = decode_public_key(grantee_key).context("invalid grantee public key")?;
        let request = BearerRequest {
            owner: owner_id_from_public_key(&grantee),
            table: put_allow_deny_others(container, Some(grantee_key)),
            expiry: self.lifetime(),
            signing,
        };

        let outcome = with_timeout(
            self.config.request_timeout,
            build_bearer_token(self.client.as_ref(), request),
        )
        .await
        .with_context(|| format!("issue upload bearer for container {container}"))?;
        Ok(outcome)
    }

    /// Binds the owner's signature to a pending bearer token. The signature
    /// must come from `container_owner`.
    pub fn complete_bearer(
        &self,
        pending: PendingBearer,
        signature: OwnerSignature,
        container_owner: &OwnerId,
    ) -> anyhow::Result<BearerToken> {
        pending
            .complete_from(signature, container_owner)
            .context("owner signature rejected")
    }

    /// Submits `table` and waits for the network to return it.
    pub async fn restrict_container(&self, table: &EaclTable) -> anyhow::Result<()> {
        set_eacl_and_wait(self.client.as_ref(), table, self.config.poll_policy)
            .await
            .with_context(|| format!("set EACL for container {}", table.container_id()))
    }

    pub async fn wait_for_container(&self, container: &ContainerId) -> anyhow::Result<()> {
        await_container(self.client.as_ref(), container, self.config.poll_policy)
            .await
            .with_context(|| format!("container {container} did not appear"))
    }

    pub async fn issue_object_session(
        &self,
        key: &SignerKey,
        verb: ObjectVerb,
        address: Address,
    ) -> anyhow::Result<SessionToken> {
        let token = with_timeout(
            self.config.request_timeout,
            issue_session_token(self.client.as_ref(), key, self.lifetime(), |builder| {
                match verb {
                    ObjectVerb::Put => builder.object_put(address),
                    ObjectVerb::Get => builder.object_get(address),
                    ObjectVerb::Delete => builder.object_delete(address),
                }
            }),
        )
        .await
        .with_context(|| format!("issue {verb:?} session for {address}"))?;
        Ok(token)
    }

    pub async fn issue_container_delete_session(
        &self,
        key: &SignerKey,
        container: ContainerId,
    ) -> anyhow::Result<SessionToken> {
        let token = with_timeout(
            self.config.request_timeout,
            issue_session_token(self.client.as_ref(), key, self.lifetime(), |builder| {
                builder.container_delete(container)
            }),
        )
        .await
        .with_context(|| format!("issue delete session for container {container}"))?;
        Ok(token)
    }

    /// Replaces human-readable expiration attributes in upload headers with
    /// the expiration epoch.
    pub async fn prepare_upload_headers(
        &self,
        headers: &mut HashMap<String, String>,
    ) -> anyhow::Result<()> {
        let info = with_timeout(self.config.request_timeout, async {
            Ok::<_, IssueError>(self.client.network_info().await?)
        })
        .await
        .context("fetch network info")?;
        prepare_expiration_headers(headers, &info, SystemTime::now())
            .context("invalid expiration attributes")?;
        tracing::debug!(
            current_epoch = info.current_epoch,
            expiration = headers.get(EXPIRATION_EPOCH_ATTR).map(String::as_str),
            "upload headers prepared"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
