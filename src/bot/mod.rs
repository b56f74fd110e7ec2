//! Serenity gateway glue.
//!
//! [`Handler`] receives gateway events and forwards them to the
//! reconciler. The reconciler itself is built lazily on the first
//! event, because the HTTP and cache handles only exist once a
//! gateway context is available.

mod commands;

use crate::config::Config;
use crate::platform::discord::DiscordPlatform;
use crate::reconciler::Reconciler;
use crate::registry::Database;
use serenity::all::{
    ActivityData, ChannelType, Context, EventHandler, GatewayIntents, GuildChannel, GuildId,
    Message, Ready, VoiceState,
};
use serenity::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Gateway intents the bot needs: guild/channel topology, member and
/// voice state visibility, and message content for prefix commands.
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// The bot's event handler and owner of the reconciler.
pub struct Handler {
    config: Config,
    registry: Option<Database>,
    state: OnceLock<Arc<Reconciler>>,
    /// Background loops must only be spawned for the first session.
    started: AtomicBool,
}

impl Handler {
    pub fn new(config: Config, registry: Option<Database>) -> Self {
        Self {
            config,
            registry,
            state: OnceLock::new(),
            started: AtomicBool::new(false),
        }
    }

    /// The reconciler, built on first use from this session's handles.
    fn state(&self, ctx: &Context) -> Arc<Reconciler> {
        self.state
            .get_or_init(|| {
                let platform = Arc::new(DiscordPlatform::new(
                    Arc::clone(&ctx.http),
                    Arc::clone(&ctx.cache),
                ));
                Arc::new(Reconciler::new(
                    platform,
                    self.registry.clone(),
                    self.config.mirror.clone(),
                ))
            })
            .clone()
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Gateway session ready");
        ctx.set_activity(Some(ActivityData::watching("voice channels")));
    }

    /// Fires once the guild cache is populated, which is what startup
    /// reconciliation needs; plain `ready` arrives before the guilds do.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        info!(guilds = guilds.len(), "Cache ready, reconciling persisted state");
        let state = self.state(&ctx);
        state.startup_reconcile().await;

        if !self.started.swap(true, Ordering::SeqCst) {
            state.spawn_background_tasks();
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild) = new.guild_id else {
            return;
        };
        // Bots do not count toward occupancy, so their movement is noise.
        if let Some(member) = &new.member
            && member.user.bot
        {
            return;
        }

        let before = old.as_ref().and_then(|v| v.channel_id);
        let after = new.channel_id;
        if before == after {
            // Mute and deafen toggles, no movement.
            return;
        }

        self.state(&ctx).on_voice_event(guild, before, after).await;
    }

    async fn channel_create(&self, ctx: Context, channel: GuildChannel) {
        if channel.kind != ChannelType::Voice {
            return;
        }
        self.state(&ctx)
            .on_channel_created(channel.guild_id, channel.id)
            .await;
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.state(&ctx)
            .on_channel_deleted(channel.guild_id, channel.id)
            .await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild) = msg.guild_id else {
            return;
        };
        let Some(input) = msg.content.strip_prefix(&self.config.bot.command_prefix) else {
            return;
        };

        let state = self.state(&ctx);
        commands::dispatch(
            &ctx,
            &state,
            &self.config.bot.command_prefix,
            guild,
            &msg,
            input,
        )
        .await;
    }
}
