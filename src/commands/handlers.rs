// Command handlers. Each returns the reply text or a `BotError`.

use futures::future::join_all;

use super::args::{BanDuration, ParsedArgs};
use super::dispatcher::Dispatcher;
use super::registry::{self, CommandKind, CommandSpec, COMMANDS};
use crate::batch::run_batch;
use crate::crcon::types::Player;
use crate::crcon::ServerTarget;
use crate::error::{BotError, BotResult};
use crate::format::{self, VipRemoval};
use crate::maps;
use crate::permissions::PermissionTier;
use crate::selector::IndexSelector;

/// Broadcasts reach at most this many players.
const BROADCAST_LIMIT: usize = 100;

const DEFAULT_KILL_REASON: &str = "管理员击杀";
const DEFAULT_REASON: &str = "违反服务器规则";

pub(super) async fn run(
    d: &Dispatcher,
    spec: &'static CommandSpec,
    tier: PermissionTier,
    sender: &str,
    args: &ParsedArgs,
) -> BotResult<String> {
    let prefix = d.display_prefix.as_str();
    match spec.kind {
        CommandKind::Help => Ok(format::help(
            prefix,
            registry::visible_to(PermissionTier::None),
        )),
        CommandKind::AdminHelp => Ok(format::admin_help(
            prefix,
            COMMANDS
                .iter()
                .filter(|c| c.required_tier >= PermissionTier::Admin && c.required_tier <= tier),
        )),
        CommandKind::ServerInfo => server_info(d, args).await,
        CommandKind::ServerList => server_list(d).await,
        CommandKind::CheckVip => check_vip(d, args).await,
        CommandKind::BotStatus => Ok(format::system_status(
            d.started_at.elapsed(),
            d.config.servers.len(),
            &d.health.snapshot(),
        )),
        CommandKind::PlayerList => {
            let server = args.server();
            let roster = d.crcon.roster(server).await?;
            Ok(format::roster(&d.crcon.server_name(server), prefix, &roster))
        }
        CommandKind::Kill => {
            let reason = args.text("reason").unwrap_or(DEFAULT_KILL_REASON);
            let crcon = &d.crcon;
            let server = args.server();
            batch(d, args, "击杀", move |p| async move {
                crcon.punish(server, &p.player_id, reason).await
            })
            .await
        }
        CommandKind::Kick => {
            let reason = args.text("reason").unwrap_or(DEFAULT_REASON);
            let crcon = &d.crcon;
            let server = args.server();
            batch(d, args, "踢出", move |p| async move {
                crcon.kick(server, &p.player_id, reason).await
            })
            .await
        }
        CommandKind::Ban => ban(d, args).await,
        CommandKind::SwitchNow => {
            let crcon = &d.crcon;
            let server = args.server();
            batch(d, args, "立即调边", move |p| async move {
                crcon.switch_now(server, &p.player_id).await
            })
            .await
        }
        CommandKind::SwitchOnDeath => {
            let crcon = &d.crcon;
            let server = args.server();
            batch(d, args, "死后调边", move |p| async move {
                crcon.switch_on_death(server, &p.player_id).await
            })
            .await
        }
        CommandKind::MessagePlayer => {
            let message = required_text(args, "message")?;
            let crcon = &d.crcon;
            let server = args.server();
            batch(d, args, "私信", move |p| async move {
                crcon.message_player(server, &p.player_id, message).await
            })
            .await
        }
        CommandKind::Broadcast => broadcast(d, args).await,
        CommandKind::ChangeMap => change_map(d, args).await,
        CommandKind::MapList => {
            let server = args.server();
            let rotation = d.crcon.map_rotation(server).await?;
            Ok(format::map_rotation(&d.crcon.server_name(server), prefix, &rotation))
        }
        CommandKind::SetIdle => {
            let server = args.server();
            let minutes = required_number(args, "minutes")?;
            d.crcon.set_idle_autokick_time(server, minutes).await?;
            let name = d.crcon.server_name(server);
            Ok(if minutes == 0 {
                format!("✅ {name} 已关闭闲置自动踢出")
            } else {
                format!("✅ {name} 闲置踢出时间已设置为 {minutes} 分钟")
            })
        }
        CommandKind::ServerSettings => {
            let server = args.server();
            let settings = d.crcon.server_settings(server).await?;
            Ok(format::settings(&d.crcon.server_name(server), &settings))
        }
        CommandKind::SetAutobalance => set_autobalance(d, args).await,
        CommandKind::SetSwitchCooldown => {
            let server = args.server();
            let minutes = required_number(args, "minutes")?;
            d.crcon.set_team_switch_cooldown(server, minutes).await?;
            Ok(format!(
                "✅ {} 调边冷却时间已设置为 {minutes} 分钟",
                d.crcon.server_name(server)
            ))
        }
        CommandKind::VipQuery => {
            let server = args.server();
            let player_id = required_text(args, "player_id")?;
            let vips = d.crcon.vip_ids(server).await?;
            let found = vips.iter().find(|v| v.player_id == player_id);
            Ok(format::vip_lookup(player_id, &d.crcon.server_name(server), found))
        }
        CommandKind::AddVip => add_vip(d, sender, args).await,
        CommandKind::RemoveVip => remove_vip(d, args).await,
        CommandKind::ListAdmins => Ok(format::permission_list(&d.permissions.list(None))),
        CommandKind::PermInfo => {
            let target = args.text("target").unwrap_or(sender);
            let tier = d.permissions.get_tier(target);
            let recent: Vec<_> = d
                .permissions
                .recent_audit(50)
                .await?
                .into_iter()
                .filter(|row| row.target == target)
                .take(3)
                .collect();
            Ok(format::permission_info(target, tier, &recent))
        }
        CommandKind::AddAdmin => grant(d, sender, args, PermissionTier::Admin).await,
        CommandKind::AddSuperAdmin => grant(d, sender, args, PermissionTier::SuperAdmin).await,
        CommandKind::RemoveAdmin => {
            let target = required_text(args, "target")?;
            let removed = d.permissions.revoke(sender, target).await?;
            Ok(format::revoked(target, removed))
        }
        CommandKind::ApiTest => {
            let diagnoses = join_all(d.crcon.servers().iter().map(|s| async move {
                (s.name.clone(), d.crcon.diagnose(s.target).await)
            }))
            .await;
            Ok(format::api_test(&diagnoses))
        }
    }
}

// ── Argument helpers ─────────────────────────────────────────────────

/// Slots the schema marks as required are always present after parsing;
/// a miss here means the table and the handler disagree.
fn required_text<'a>(args: &'a ParsedArgs, name: &str) -> BotResult<&'a str> {
    args.text(name)
        .ok_or_else(|| BotError::Internal(format!("missing argument {name}")))
}

fn required_number(args: &ParsedArgs, name: &str) -> BotResult<i64> {
    args.number(name)
        .ok_or_else(|| BotError::Internal(format!("missing argument {name}")))
}

// ── Server info ──────────────────────────────────────────────────────

async fn server_info(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let server = args.server();
    let state = d.crcon.gamestate(server).await?;
    Ok(format::server_info(&d.crcon.server_name(server), &state))
}

async fn server_list(d: &Dispatcher) -> BotResult<String> {
    let entries = join_all(d.crcon.servers().iter().map(|s| async move {
        (s.clone(), d.crcon.gamestate(s.target).await)
    }))
    .await;
    Ok(format::server_list(&entries))
}

async fn check_vip(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let server = args.server();
    let query = required_text(args, "name")?;
    let needle = query.to_lowercase();
    let vips = d.crcon.vip_ids(server).await?;
    let found = vips
        .iter()
        .find(|v| v.name.to_lowercase() == needle)
        .or_else(|| vips.iter().find(|v| v.name.to_lowercase().contains(&needle)));
    Ok(format::vip_lookup(query, &d.crcon.server_name(server), found))
}

// ── Batch moderation ─────────────────────────────────────────────────

async fn batch<F, Fut>(d: &Dispatcher, args: &ParsedArgs, label: &str, action: F) -> BotResult<String>
where
    F: Fn(Player) -> Fut,
    Fut: std::future::Future<Output = BotResult<()>>,
{
    let server = args.server();
    let selector = args
        .selector("selector")
        .ok_or_else(|| BotError::Internal("missing selector".to_string()))?;
    let name = d.crcon.server_name(server);
    let roster = d.crcon.roster(server).await?;
    if roster.is_empty() {
        return Ok(format!("❌ {name} 当前没有在线玩家"));
    }
    let outcomes = run_batch(&roster, selector, d.config.batch_concurrency, action).await;
    Ok(format::batch_report(label, &name, &outcomes))
}

async fn ban(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let reason = args.text("reason").unwrap_or(DEFAULT_REASON);
    let crcon = &d.crcon;
    let server = args.server();
    match args.duration("duration") {
        Some(BanDuration::Hours(hours)) => {
            let label = format!("封禁 {hours} 小时");
            batch(d, args, &label, move |p| async move {
                crcon.temp_ban(server, &p.player_id, hours, reason).await
            })
            .await
        }
        Some(BanDuration::Permanent) => {
            batch(d, args, "永久封禁", move |p| async move {
                crcon.perma_ban(server, &p.player_id, reason).await
            })
            .await
        }
        None => Err(BotError::Internal("missing argument duration".to_string())),
    }
}

async fn broadcast(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let server = args.server();
    let message = required_text(args, "message")?;
    let name = d.crcon.server_name(server);
    let roster = d.crcon.roster(server).await?;
    if roster.is_empty() {
        return Ok(format!("❌ {name} 当前没有在线玩家"));
    }
    let selector = IndexSelector::first(roster.len().min(BROADCAST_LIMIT));
    let crcon = &d.crcon;
    let outcomes = run_batch(&roster, &selector, d.config.batch_concurrency, move |p| async move {
        crcon.message_player(server, &p.player_id, message).await
    })
    .await;
    let mut reply = format::broadcast_report(&name, &outcomes);
    if roster.len() > BROADCAST_LIMIT {
        reply.push_str(&format!(
            "\n⚠️ 在线 {} 人，仅发送给前 {BROADCAST_LIMIT} 人",
            roster.len()
        ));
    }
    Ok(reply)
}

// ── Maps and settings ────────────────────────────────────────────────

async fn change_map(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let server = args.server();
    let rotation = d.crcon.map_rotation(server).await?;
    let Some(input) = args.text("map") else {
        return Ok(format::map_rotation(
            &d.crcon.server_name(server),
            &d.display_prefix,
            &rotation,
        ));
    };
    let map_id = maps::resolve(input, &rotation).map_err(|reason| {
        BotError::invalid_args(
            &format!("{}换图 [地图编号|地图ID] [服务器编号]", d.display_prefix),
            reason,
        )
    })?;
    d.crcon.set_map(server, &map_id).await?;
    Ok(format::map_changed(&d.crcon.server_name(server), &map_id))
}

async fn set_autobalance(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let server = args.server();
    let enabled = args
        .toggle("enabled")
        .ok_or_else(|| BotError::Internal("missing argument enabled".to_string()))?;
    d.crcon.set_autobalance_enabled(server, enabled).await?;
    let mut reply = format!(
        "✅ {} 自动人数平衡已{}",
        d.crcon.server_name(server),
        if enabled { "启用" } else { "禁用" }
    );
    if let Some(threshold) = args.number("threshold") {
        match d.crcon.set_autobalance_threshold(server, threshold).await {
            Ok(()) => reply.push_str(&format!("\n📊 平衡阈值：{threshold} 人")),
            Err(e) => reply.push_str(&format!("\n❌ 阈值设置失败：{}", format::short_error(&e))),
        }
    }
    Ok(reply)
}

// ── VIP ──────────────────────────────────────────────────────────────

async fn add_vip(d: &Dispatcher, sender: &str, args: &ParsedArgs) -> BotResult<String> {
    let player_id = required_text(args, "player_id")?;
    let duration = args.duration("duration").unwrap_or(BanDuration::Permanent);
    let default_description = format!("QQ {sender} 添加");
    let description = args.text("description").unwrap_or(&default_description);
    let expiration = match duration {
        BanDuration::Hours(h) => Some(chrono::Utc::now() + chrono::Duration::hours(i64::from(h))),
        BanDuration::Permanent => None,
    };

    let results = join_all(args.servers().into_iter().map(|server| async move {
        let result = d
            .crcon
            .add_vip(server, player_id, description, expiration)
            .await;
        (d.crcon.server_name(server), result)
    }))
    .await;
    Ok(format::vip_added(player_id, duration, &results))
}

async fn remove_vip_on(d: &Dispatcher, server: ServerTarget, player_id: &str) -> VipRemoval {
    let vips = match d.crcon.vip_ids(server).await {
        Ok(vips) => vips,
        Err(e) => return VipRemoval::Failed(e),
    };
    if !vips.iter().any(|v| v.player_id == player_id) {
        return VipRemoval::NotVip;
    }
    match d.crcon.remove_vip(server, player_id).await {
        Ok(()) => VipRemoval::Removed,
        Err(e) => VipRemoval::Failed(e),
    }
}

async fn remove_vip(d: &Dispatcher, args: &ParsedArgs) -> BotResult<String> {
    let player_id = required_text(args, "player_id")?;
    let results = join_all(args.servers().into_iter().map(|server| async move {
        (
            d.crcon.server_name(server),
            remove_vip_on(d, server, player_id).await,
        )
    }))
    .await;
    Ok(format::vip_removed(player_id, &results))
}

// ── Permissions ──────────────────────────────────────────────────────

async fn grant(
    d: &Dispatcher,
    sender: &str,
    args: &ParsedArgs,
    tier: PermissionTier,
) -> BotResult<String> {
    let target = required_text(args, "target")?;
    let outcome = d.permissions.grant(sender, target, tier).await?;
    Ok(format::granted(target, tier, outcome))
}
