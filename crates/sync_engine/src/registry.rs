//! ChannelRegistry - owned map of channel name to [`TimeStampChannel`].
//!
//! Registration, lookup and removal take a short registry-wide lock; the
//! channels themselves are independent once handed out.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    ChannelConfig, ChannelDump, ChannelName, ChannelReport, ContractError, EngineConfig,
    FifoDriver, StateCallback, TimeSource,
};
use tracing::{info, warn};

use crate::channel::TimeStampChannel;

pub struct ChannelRegistry {
    channels: Mutex<HashMap<ChannelName, Arc<TimeStampChannel>>>,
    driver: Arc<dyn FifoDriver>,
    clock: Arc<dyn TimeSource>,
    config: EngineConfig,
    callback: Option<StateCallback>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    pub fn new(
        driver: Arc<dyn FifoDriver>,
        clock: Arc<dyn TimeSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            driver,
            clock,
            config,
            callback: None,
        }
    }

    /// Consumer hook handed to every channel registered afterwards
    pub fn with_callback(mut self, callback: StateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelName, Arc<TimeStampChannel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `name` for `owner`, or return the existing channel if
    /// `owner` already holds it.
    ///
    /// # Errors
    /// - [`ContractError::ChannelNameUnavailable`] for an empty or placeholder name
    /// - [`ContractError::ChannelOwnerConflict`] when another owner holds the name
    pub fn register(
        &self,
        name: &str,
        owner: &str,
    ) -> Result<Arc<TimeStampChannel>, ContractError> {
        let key = ChannelName::parse(name)?;
        let name = key.as_str();

        let mut channels = self.lock();
        if let Some(existing) = channels.get(name) {
            if existing.owner() == owner {
                return Ok(existing.clone());
            }
            warn!(
                channel = name,
                owner = existing.owner(),
                requested_by = owner,
                "channel already registered to another owner"
            );
            return Err(ContractError::ChannelOwnerConflict {
                name: name.to_string(),
                owner: existing.owner().to_string(),
                requested_by: owner.to_string(),
            });
        }

        let mut channel = TimeStampChannel::new(
            key.clone(),
            owner,
            self.driver.clone(),
            self.clock.clone(),
            &self.config,
        );
        if let Some(callback) = &self.callback {
            channel = channel.with_callback(callback.clone());
        }
        let channel = Arc::new(channel);
        channels.insert(key.clone(), channel.clone());
        info!(channel = name, owner, "channel registered");
        Ok(channel)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<TimeStampChannel>> {
        self.lock().get(name).cloned()
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<TimeStampChannel>, ContractError> {
        let removed = self
            .lock()
            .remove(name)
            .ok_or_else(|| ContractError::channel_not_found(name))?;
        info!(channel = name, "channel unregistered");
        Ok(removed)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dump(&self, name: &str) -> Result<ChannelDump, ContractError> {
        self.lookup(name)
            .map(|channel| channel.dump())
            .ok_or_else(|| ContractError::channel_not_found(name))
    }

    /// Dumps of every channel, sorted by name
    pub fn dump_all(&self) -> Vec<ChannelDump> {
        let mut channels: Vec<_> = self.lock().values().cloned().collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels.iter().map(|channel| channel.dump()).collect()
    }

    /// Record-processing entry point: look up or create the channel, apply
    /// the inputs and return the outputs.
    pub fn process(
        &self,
        name: &str,
        owner: &str,
        config: &ChannelConfig,
    ) -> Result<ChannelReport, ContractError> {
        let channel = self.register(name, owner)?;
        Ok(channel.update(config))
    }
}
