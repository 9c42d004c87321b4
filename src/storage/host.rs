//! SSH host feed target.
//!
//! Feeds are copied with the system `scp` binary. One [`RemoteSession`] is
//! kept per environment in [`TransportClients`]; a session that dropped is
//! reconnected before the next upload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::{EnvironmentName, HostSettings};
use crate::storage::FeedTarget;

/// A connection to a remote host able to receive files.
#[async_trait]
pub trait RemoteSession: Send {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<()>;

    /// Upload `file` to the absolute remote path `remote`.
    async fn upload(&mut self, file: &Path, remote: &str) -> Result<()>;
}

/// Shared, mutex-guarded session of one environment.
pub type HostSession = Arc<tokio::sync::Mutex<Box<dyn RemoteSession>>>;

type SessionFactory = Box<dyn Fn(&HostSettings) -> Box<dyn RemoteSession> + Send + Sync>;

/// Session backed by the `ssh` and `scp` binaries.
pub struct ScpSession {
    settings: HostSettings,
    timeout: Duration,
    connected: bool,
}

impl ScpSession {
    pub fn new(settings: HostSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            connected: false,
        }
    }

    fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            self.settings.port.to_string(),
        ];
        if let Some(identity) = &self.settings.identity {
            args.push("-i".into());
            args.push(identity.display().to_string());
        }
        args.push(self.settings.destination());
        args
    }

    fn scp_args(&self, file: &Path, remote: &str) -> Vec<String> {
        let mut args = vec![
            "-q".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-P".to_string(),
            self.settings.port.to_string(),
        ];
        if let Some(identity) = &self.settings.identity {
            args.push("-i".into());
            args.push(identity.display().to_string());
        }
        args.push(file.display().to_string());
        args.push(format!("{}:{}", self.settings.destination(), remote));
        args
    }

    /// Run `program`, failing on timeout or a non-zero exit status.
    async fn run(&self, program: &str, args: &[String]) -> Result<()> {
        let destination = self.settings.destination();
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| AppError::transport(&destination, format!("{program} timed out")))??;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AppError::transport(
                destination,
                format!("{program} exited with {}: {}", output.status, stderr.trim()),
            ))
        }
    }

    async fn remote_mkdir(&self, directory: &str) -> Result<()> {
        let mut args = self.ssh_args();
        args.push(format!("mkdir -p '{}'", directory.replace('\'', "'\\''")));
        self.run("ssh", &args).await
    }
}

#[async_trait]
impl RemoteSession for ScpSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        log::info!("Connecting to {}", self.settings.destination());
        let directory = self.settings.directory.clone();
        self.remote_mkdir(&directory).await?;
        self.connected = true;
        Ok(())
    }

    async fn upload(&mut self, file: &Path, remote: &str) -> Result<()> {
        let result = async {
            if let Some((parent, _)) = remote.rsplit_once('/') {
                if !parent.is_empty() && parent != self.settings.directory.trim_end_matches('/') {
                    self.remote_mkdir(parent).await?;
                }
            }
            self.run("scp", &self.scp_args(file, remote)).await
        }
        .await;
        if result.is_err() {
            self.connected = false;
        }
        result
    }
}

/// Per-environment session cache.
pub struct TransportClients {
    sessions: Mutex<HashMap<EnvironmentName, HostSession>>,
    factory: SessionFactory,
}

impl TransportClients {
    /// Cache creating [`ScpSession`]s with the given command timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_factory(move |settings| {
            Box::new(ScpSession::new(settings.clone(), timeout)) as Box<dyn RemoteSession>
        })
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&HostSettings) -> Box<dyn RemoteSession> + Send + Sync + 'static,
    {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Session for `environment`, created on first use.
    pub fn session(&self, environment: EnvironmentName, settings: &HostSettings) -> HostSession {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry(environment)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new((self.factory)(settings))))
            .clone()
    }
}

/// Copies feeds into a directory on an SSH host.
pub struct HostTarget {
    settings: HostSettings,
    session: HostSession,
}

impl HostTarget {
    pub fn new(
        clients: &TransportClients,
        environment: EnvironmentName,
        settings: &HostSettings,
    ) -> Self {
        Self {
            settings: settings.clone(),
            session: clients.session(environment, settings),
        }
    }

    /// Absolute remote path of a feed name.
    pub fn remote_path(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.settings.directory.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl FeedTarget for HostTarget {
    fn describe(&self) -> String {
        format!(
            "{}:{}",
            self.settings.destination(),
            self.settings.directory
        )
    }

    async fn deliver(&self, file: &Path, name: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if !session.is_connected() {
            session.connect().await?;
        }
        session.upload(file, &self.remote_path(name)).await
    }
}
