//! Service lifecycle: `Starting → Running → ShuttingDown → Stopped`.
//!
//! [`Service::start`] is the starting phase: it registers the ACME account
//! once, binds the HTTP responder and starts serving health and challenge
//! requests. [`Service::run`] drives the running phase until the shutdown
//! token is cancelled, then drains the responder within the configured grace
//! period. Dropping a started service without running it stops the
//! responder.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

use vaultcert_config::Config;

use crate::acme::{AcmeClient, AcmeError, CertificateIssuer, ChallengeStore};
use crate::notify::{self, Notifier, NotifyError};
use crate::orchestrator::{RenewalOrchestrator, RenewalTarget};
use crate::scheduler::RenewalScheduler;
use crate::server::ChallengeServer;
use crate::vault::{KeyVaultClient, SecretStore, VaultError};

/// Lifecycle states, published on a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// The service could not enter the running state
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to register ACME account")]
    Registration(#[source] AcmeError),

    #[error("failed to bind HTTP responder to {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create Key Vault client")]
    Vault(#[source] VaultError),

    #[error("failed to configure notifications")]
    Notifier(#[source] NotifyError),
}

/// External collaborators of the service.
///
/// `challenges` must be the store the issuer publishes into, since the HTTP
/// responder serves from it.
pub struct Collaborators {
    pub challenges: ChallengeStore,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub store: Arc<dyn SecretStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Production wiring: instant-acme, Key Vault and SMTP
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let challenges = ChallengeStore::new();
        let issuer = AcmeClient::new(
            config.acme.clone(),
            config.email.clone(),
            Arc::new(challenges.clone()),
        );
        let store = KeyVaultClient::new(&config.vault).map_err(StartupError::Vault)?;
        let notifier = notify::from_config(&config.notification).map_err(StartupError::Notifier)?;

        Ok(Self {
            challenges,
            issuer: Arc::new(issuer),
            store: Arc::new(store),
            notifier,
        })
    }
}

/// A started service, ready to run
pub struct Service {
    state: watch::Sender<LifecycleState>,
    server: JoinHandle<io::Result<()>>,
    server_shutdown: DropGuard,
    local_addr: SocketAddr,
    scheduler: RenewalScheduler,
    shutdown_grace: Duration,
}

impl Service {
    /// Starting phase: register the ACME account and bind the responder
    pub async fn start(config: &Config, collaborators: Collaborators) -> Result<Self, StartupError> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        info!(state = ?LifecycleState::Starting, "Lifecycle transition");

        let Collaborators {
            challenges,
            issuer,
            store,
            notifier,
        } = collaborators;

        issuer.register().await.map_err(StartupError::Registration)?;

        let addr = &config.server.listen_addr;
        let bind_error = |source| StartupError::Bind {
            addr: addr.clone(),
            source,
        };
        let server = ChallengeServer::bind(addr, challenges)
            .await
            .map_err(bind_error)?;
        let local_addr = server.local_addr().map_err(bind_error)?;

        let shutdown_grace = config.server.shutdown_grace;
        let server_shutdown = CancellationToken::new();
        let server = tokio::spawn(server.serve(server_shutdown.clone(), shutdown_grace));

        let orchestrator = Arc::new(RenewalOrchestrator::new(
            RenewalTarget::from(config),
            issuer,
            store,
        ));
        let scheduler = RenewalScheduler::new(orchestrator, notifier, config.renewal.check_interval);

        Ok(Self {
            state,
            server,
            server_shutdown: server_shutdown.drop_guard(),
            local_addr,
            scheduler,
            shutdown_grace,
        })
    }

    /// Address the HTTP responder is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Observe lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled, then stop cleanly
    pub async fn run(self, shutdown: CancellationToken) {
        let Service {
            state,
            mut server,
            server_shutdown,
            scheduler,
            shutdown_grace,
            ..
        } = self;
        let server_shutdown = server_shutdown.disarm();

        transition(&state, LifecycleState::Running);

        let mut scheduler = tokio::spawn(scheduler.run(shutdown.child_token()));

        let server_exited = tokio::select! {
            _ = shutdown.cancelled() => false,
            result = &mut server => {
                error!(result = ?result, "HTTP responder stopped unexpectedly");
                shutdown.cancel();
                true
            }
        };

        transition(&state, LifecycleState::ShuttingDown);
        server_shutdown.cancel();

        if !server_exited {
            // serve() bounds itself by the grace period
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "HTTP responder shut down with an error"),
                Err(e) => warn!(error = %e, "HTTP responder task failed"),
            }
        }

        if tokio::time::timeout(shutdown_grace, &mut scheduler).await.is_err() {
            warn!("Abandoning in-flight renewal cycle");
            scheduler.abort();
        }

        transition(&state, LifecycleState::Stopped);
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("state", &*self.state.borrow())
            .field("local_addr", &self.local_addr)
            .field("scheduler", &self.scheduler)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let previous = state.send_replace(next);
    info!(from = ?previous, to = ?next, "Lifecycle transition");
}
