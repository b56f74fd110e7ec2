//! Prefix command layer.
//!
//! Three commands: `vc` toggles tracking for one voice channel, `sum`
//! toggles the guild's aggregate mirror, `help` explains them. Both
//! toggles require the Manage Channels permission and share a short
//! per-guild cooldown against accidental double-invocation. Unknown
//! subcommands are ignored so other bots can share the prefix.

use crate::error::PlatformError;
use crate::metrics;
use crate::platform::{ChannelKind, ChannelView, GuildView};
use crate::reconciler::{AggregateToggle, Reconciler, ToggleError, ToggleOutcome};
use serenity::all::{ChannelId, Context, GuildId, Message, Permissions};
use tracing::warn;

pub(crate) async fn dispatch(
    ctx: &Context,
    state: &Reconciler,
    prefix: &str,
    guild: GuildId,
    msg: &Message,
    input: &str,
) {
    let mut parts = input.trim().splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    match command.as_str() {
        "vc" => {
            metrics::record_command("vc");
            toggle_tracking(ctx, state, guild, msg, arg).await;
        }
        "sum" => {
            metrics::record_command("sum");
            toggle_aggregate(ctx, state, guild, msg).await;
        }
        "help" => {
            metrics::record_command("help");
            send_help(ctx, msg, prefix).await;
        }
        _ => {}
    }
}

async fn toggle_tracking(
    ctx: &Context,
    state: &Reconciler,
    guild: GuildId,
    msg: &Message,
    arg: &str,
) {
    if !has_manage_channels(ctx, guild, msg).await {
        reply(ctx, msg, "You need the Manage Channels permission for that.").await;
        return;
    }
    if arg.is_empty() {
        reply(ctx, msg, "Tell me which channel: a channel id or (part of) its name.").await;
        return;
    }
    if !state.toggle_allowed(guild) {
        reply(ctx, msg, "Easy there, try again in a few seconds.").await;
        return;
    }

    let view = match state.platform.guild_view(guild).await {
        Ok(view) => view,
        Err(_) => {
            reply(ctx, msg, "I can't see this server's channels right now.").await;
            return;
        }
    };
    let Some(channel) = resolve_voice_channel(&view, arg) else {
        reply(ctx, msg, "No voice channel matches that.").await;
        return;
    };
    if state.in_status_group(&view, channel) || state.is_mirror(channel) {
        reply(ctx, msg, "Status channels can't be tracked.").await;
        return;
    }

    match state.toggle_mirror(guild, channel).await {
        Ok(ToggleOutcome::Tracked) => {
            reply(ctx, msg, &format!("Now tracking <#{channel}>.")).await;
        }
        Ok(ToggleOutcome::Untracked) => {
            reply(ctx, msg, &format!("Stopped tracking <#{channel}>.")).await;
        }
        Err(ToggleError::Busy) => {
            reply(ctx, msg, "That channel is being updated, try again shortly.").await;
        }
        Err(ToggleError::Platform(PlatformError::Forbidden)) => {
            reply(ctx, msg, "I'm missing the permissions to manage channels here.").await;
        }
        Err(ToggleError::Platform(err)) => {
            warn!(channel = %channel, error = %err, "Tracking toggle failed");
            reply(ctx, msg, "That didn't work, please try again later.").await;
        }
    }
}

async fn toggle_aggregate(ctx: &Context, state: &Reconciler, guild: GuildId, msg: &Message) {
    if !has_manage_channels(ctx, guild, msg).await {
        reply(ctx, msg, "You need the Manage Channels permission for that.").await;
        return;
    }
    if !state.toggle_allowed(guild) {
        reply(ctx, msg, "Easy there, try again in a few seconds.").await;
        return;
    }

    match state.toggle_aggregate(guild).await {
        Ok(AggregateToggle::Created) => {
            reply(ctx, msg, "Server-wide occupancy channel created.").await;
        }
        Ok(AggregateToggle::Removed) => {
            reply(ctx, msg, "Server-wide occupancy channel removed.").await;
        }
        Err(ToggleError::Busy) => {
            reply(ctx, msg, "The aggregate is being updated, try again shortly.").await;
        }
        Err(ToggleError::Platform(PlatformError::Forbidden)) => {
            reply(ctx, msg, "I'm missing the permissions to manage channels here.").await;
        }
        Err(ToggleError::Platform(err)) => {
            warn!(guild = %guild, error = %err, "Aggregate toggle failed");
            reply(ctx, msg, "That didn't work, please try again later.").await;
        }
    }
}

async fn send_help(ctx: &Context, msg: &Message, prefix: &str) {
    let text = format!(
        "I mirror voice channel occupancy into read-only status channels.\n\
         `{prefix}vc <channel id or name>` - start or stop tracking a voice channel\n\
         `{prefix}sum` - toggle the server-wide occupancy channel\n\
         `{prefix}help` - this message\n\
         New voice channels are tracked automatically."
    );
    reply(ctx, msg, &text).await;
}

/// Reply in the invoking channel. A failed send is logged and dropped;
/// the toggle itself has already happened by then.
async fn reply(ctx: &Context, msg: &Message, text: &str) {
    if let Err(err) = msg.reply(&ctx.http, text).await {
        warn!(channel = %msg.channel_id, error = %err, "Failed to send command reply");
    }
}

/// Resolve a user-supplied channel reference: numeric id first, then
/// exact name, then name substring (both case-insensitive).
fn resolve_voice_channel(view: &GuildView, arg: &str) -> Option<ChannelId> {
    fn voice(c: &ChannelView) -> bool {
        c.kind == ChannelKind::Voice
    }

    if let Ok(raw) = arg.parse::<u64>()
        && raw > 0
    {
        let id = ChannelId::new(raw);
        return view.channel(id).filter(|c| voice(c)).map(|c| c.id);
    }

    let needle = arg.to_lowercase();
    if let Some(exact) = view
        .channels
        .iter()
        .find(|c| voice(c) && c.name.to_lowercase() == needle)
    {
        return Some(exact.id);
    }
    view.channels
        .iter()
        .find(|c| voice(c) && c.name.to_lowercase().contains(&needle))
        .map(|c| c.id)
}

/// Whether the message author holds Manage Channels in this guild.
async fn has_manage_channels(ctx: &Context, guild: GuildId, msg: &Message) -> bool {
    let Ok(member) = guild.member(&ctx.http, msg.author.id).await else {
        return false;
    };
    // Cache access is sync; the ref must not live across an await.
    let Some(guild_ref) = ctx.cache.guild(guild) else {
        return false;
    };
    guild_ref
        .member_permissions(&member)
        .contains(Permissions::MANAGE_CHANNELS)
}
