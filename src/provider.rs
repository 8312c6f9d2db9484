//! Provider abstraction supplying hosts to the pipeline executor.
//!
//! The executor only needs an address, login user and SSH port for each VM.
//! Cloud specific lifecycle calls live behind [`Provider`]; the crate ships
//! [`StaticProvider`], which serves hosts declared in the pipeline file.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::info;

use crate::pipeline::{PipelineConfig, VmSpec};

/// Host details the orchestration core consumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Vm {
    /// Provider-side name.
    pub name: String,
    /// Reachable address.
    pub ip: IpAddr,
    /// Login user.
    pub username: String,
    /// SSH port.
    pub ssh_port: u16,
}

/// Errors raised by providers.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when no VM carries the requested name.
    #[error("no VM named {0}")]
    NotFound(String),
    /// Raised when a VM spec lacks information the provider needs.
    #[error("VM {name} cannot be provisioned: {message}")]
    InvalidSpec {
        /// VM name.
        name: String,
        /// What is missing.
        message: String,
    },
    /// Raised for provider-specific failures.
    #[error("provider failure: {0}")]
    Backend(String),
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// VM lifecycle operations the executor relies on.
pub trait Provider {
    /// Creates (or resolves) the VM called `name` and returns its details.
    fn deploy<'a>(&'a self, name: &'a str, spec: &'a VmSpec) -> ProviderFuture<'a, Vm>;

    /// Destroys the VM called `name`.
    fn destroy<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()>;

    /// Lists known VMs ordered by name.
    fn list(&self) -> ProviderFuture<'_, Vec<Vm>>;

    /// Looks up one VM by name.
    fn get_by_name<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Vm>;
}

/// Provider backed by addresses written into the pipeline file.
///
/// `deploy` registers the VM from its spec (or returns the existing entry),
/// so it suits hosts that already exist outside onctl's control.
#[derive(Debug, Default)]
pub struct StaticProvider {
    default_user: String,
    default_port: u16,
    inventory: Mutex<BTreeMap<String, Vm>>,
}

impl StaticProvider {
    /// Creates an empty inventory with fallbacks for user and port.
    #[must_use]
    pub fn new(default_user: impl Into<String>, default_port: u16) -> Self {
        Self {
            default_user: default_user.into(),
            default_port,
            inventory: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seeds the inventory with every target whose VM spec carries an address.
    #[must_use]
    pub fn from_pipeline(config: &PipelineConfig, default_user: &str, default_port: u16) -> Self {
        let provider = Self::new(default_user, default_port);
        for target in &config.targets {
            if let Ok(vm) = provider.vm_from_spec(target.vm_name(), &target.config.vm) {
                provider.insert(vm);
            }
        }
        provider
    }

    /// Adds or replaces a VM.
    pub fn insert(&self, vm: Vm) {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vm.name.clone(), vm);
    }

    fn vm_from_spec(&self, name: &str, spec: &VmSpec) -> Result<Vm, ProviderError> {
        let ip = spec.ip.ok_or_else(|| ProviderError::InvalidSpec {
            name: name.to_owned(),
            message: String::from("vm.ip is required for statically provisioned hosts"),
        })?;
        Ok(Vm {
            name: name.to_owned(),
            ip,
            username: spec
                .username
                .clone()
                .unwrap_or_else(|| self.default_user.clone()),
            ssh_port: spec.ssh_port.unwrap_or(self.default_port),
        })
    }

    fn lookup(&self, name: &str) -> Result<Vm, ProviderError> {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_owned()))
    }
}

impl Provider for StaticProvider {
    fn deploy<'a>(&'a self, name: &'a str, spec: &'a VmSpec) -> ProviderFuture<'a, Vm> {
        Box::pin(async move {
            if let Ok(existing) = self.lookup(name) {
                return Ok(existing);
            }
            let vm = self.vm_from_spec(name, spec)?;
            info!(vm = %vm.name, ip = %vm.ip, "registered static host");
            self.insert(vm.clone());
            Ok(vm)
        })
    }

    fn destroy<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.inventory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ProviderError::NotFound(name.to_owned()))
        })
    }

    fn list(&self) -> ProviderFuture<'_, Vec<Vm>> {
        Box::pin(async move {
            Ok(self
                .inventory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect())
        })
    }

    fn get_by_name<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Vm> {
        Box::pin(async move { self.lookup(name) })
    }
}
