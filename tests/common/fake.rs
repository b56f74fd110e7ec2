//! In-memory stand-in for the chat platform.
//!
//! Guild views live in a map the test mutates directly; channel
//! creations and renames feed back into the view so follow-up
//! snapshots observe them, the way the real gateway cache would.
//! Errors can be queued per operation and are consumed in order.

use async_trait::async_trait;
use dashmap::DashMap;
use mirrorcat::error::PlatformError;
use mirrorcat::platform::{ChannelKind, ChannelView, GuildView, Platform};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A successful mutating platform call, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Rename {
        channel: ChannelId,
        name: String,
    },
    CreateCategory {
        guild: GuildId,
        name: String,
    },
    CreateStatus {
        guild: GuildId,
        parent: ChannelId,
        name: String,
    },
    Delete {
        channel: ChannelId,
    },
}

pub struct FakePlatform {
    guilds: DashMap<GuildId, GuildView>,
    /// Authoritative channel names, what `fetch_channel_name` returns.
    names: DashMap<ChannelId, String>,
    calls: Mutex<Vec<Call>>,
    rename_errors: Mutex<VecDeque<PlatformError>>,
    fetch_errors: Mutex<VecDeque<PlatformError>>,
    create_errors: Mutex<VecDeque<PlatformError>>,
    /// Every fetch passes through this lock; a test holding it parks
    /// any reconciliation pass at the read step.
    fetch_gate: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

#[allow(dead_code)]
impl FakePlatform {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            guilds: DashMap::new(),
            names: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            rename_errors: Mutex::new(VecDeque::new()),
            fetch_errors: Mutex::new(VecDeque::new()),
            create_errors: Mutex::new(VecDeque::new()),
            fetch_gate: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1000),
        })
    }

    pub fn add_guild(&self, guild: GuildId) {
        self.guilds.insert(
            guild,
            GuildView {
                id: guild,
                channels: Vec::new(),
            },
        );
    }

    pub fn drop_guild(&self, guild: GuildId) {
        self.guilds.remove(&guild);
    }

    pub fn add_category(&self, guild: GuildId, id: u64, name: &str) -> ChannelId {
        self.insert_channel(guild, id, name, ChannelKind::Category, None, 0)
    }

    pub fn add_voice(
        &self,
        guild: GuildId,
        id: u64,
        name: &str,
        parent: Option<ChannelId>,
        occupancy: usize,
    ) -> ChannelId {
        self.insert_channel(guild, id, name, ChannelKind::Voice, parent, occupancy)
    }

    fn insert_channel(
        &self,
        guild: GuildId,
        id: u64,
        name: &str,
        kind: ChannelKind,
        parent: Option<ChannelId>,
        occupancy: usize,
    ) -> ChannelId {
        let channel = ChannelId::new(id);
        if let Some(mut view) = self.guilds.get_mut(&guild) {
            view.channels.push(ChannelView {
                id: channel,
                name: name.to_string(),
                kind,
                parent_id: parent,
                occupancy,
            });
        }
        self.names.insert(channel, name.to_string());
        channel
    }

    pub fn set_occupancy(&self, guild: GuildId, channel: ChannelId, occupancy: usize) {
        if let Some(mut view) = self.guilds.get_mut(&guild)
            && let Some(c) = view.channels.iter_mut().find(|c| c.id == channel)
        {
            c.occupancy = occupancy;
        }
    }

    /// Remove a channel as if a user deleted it out from under the bot.
    pub fn remove_channel(&self, guild: GuildId, channel: ChannelId) {
        if let Some(mut view) = self.guilds.get_mut(&guild) {
            view.channels.retain(|c| c.id != channel);
        }
        self.names.remove(&channel);
    }

    pub fn channel_name(&self, channel: ChannelId) -> Option<String> {
        self.names.get(&channel).map(|e| e.value().clone())
    }

    pub fn parent_of(&self, guild: GuildId, channel: ChannelId) -> Option<ChannelId> {
        self.guilds
            .get(&guild)?
            .channels
            .iter()
            .find(|c| c.id == channel)?
            .parent_id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Committed renames only, in order.
    pub fn renames(&self) -> Vec<(ChannelId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Rename { channel, name } => Some((channel, name)),
                _ => None,
            })
            .collect()
    }

    /// Ids of status channels created, in order.
    pub fn created_status_channels(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CreateStatus { .. }))
            .count()
    }

    pub fn queue_rename_error(&self, err: PlatformError) {
        self.rename_errors.lock().unwrap().push_back(err);
    }

    pub fn queue_fetch_error(&self, err: PlatformError) {
        self.fetch_errors.lock().unwrap().push_back(err);
    }

    pub fn queue_create_error(&self, err: PlatformError) {
        self.create_errors.lock().unwrap().push_back(err);
    }

    /// Park all fetches until the returned guard is dropped.
    pub async fn hold_fetches(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.fetch_gate.lock().await
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn pop_error(queue: &Mutex<VecDeque<PlatformError>>) -> Option<PlatformError> {
        queue.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn guild_view(&self, guild: GuildId) -> Result<GuildView, PlatformError> {
        self.guilds
            .get(&guild)
            .map(|v| v.value().clone())
            .ok_or(PlatformError::NotFound)
    }

    async fn fetch_channel_name(&self, channel: ChannelId) -> Result<String, PlatformError> {
        let _gate = self.fetch_gate.lock().await;
        if let Some(err) = Self::pop_error(&self.fetch_errors) {
            return Err(err);
        }
        self.names
            .get(&channel)
            .map(|e| e.value().clone())
            .ok_or(PlatformError::NotFound)
    }

    async fn rename_channel(
        &self,
        channel: ChannelId,
        name: &str,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        if let Some(err) = Self::pop_error(&self.rename_errors) {
            return Err(err);
        }
        if !self.names.contains_key(&channel) {
            return Err(PlatformError::NotFound);
        }
        self.names.insert(channel, name.to_string());
        for mut view in self.guilds.iter_mut() {
            if let Some(c) = view.channels.iter_mut().find(|c| c.id == channel) {
                c.name = name.to_string();
            }
        }
        self.record(Call::Rename {
            channel,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn create_category(
        &self,
        guild: GuildId,
        name: &str,
        _reason: &str,
    ) -> Result<ChannelId, PlatformError> {
        if let Some(err) = Self::pop_error(&self.create_errors) {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channel = self.insert_channel(guild, id, name, ChannelKind::Category, None, 0);
        self.record(Call::CreateCategory {
            guild,
            name: name.to_string(),
        });
        Ok(channel)
    }

    async fn create_status_channel(
        &self,
        guild: GuildId,
        parent: ChannelId,
        name: &str,
        _reason: &str,
    ) -> Result<ChannelId, PlatformError> {
        if let Some(err) = Self::pop_error(&self.create_errors) {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channel =
            self.insert_channel(guild, id, name, ChannelKind::Voice, Some(parent), 0);
        self.record(Call::CreateStatus {
            guild,
            parent,
            name: name.to_string(),
        });
        Ok(channel)
    }

    async fn delete_channel(&self, channel: ChannelId, _reason: &str) -> Result<(), PlatformError> {
        for mut view in self.guilds.iter_mut() {
            view.channels.retain(|c| c.id != channel);
        }
        self.names.remove(&channel);
        self.record(Call::Delete { channel });
        Ok(())
    }
}
