// Reply rendering: pure functions from results and errors to chat text.

use std::fmt::Write as _;
use std::time::Duration;

use crate::batch::{count_succeeded, BatchOutcome};
use crate::commands::args::BanDuration;
use crate::commands::registry::CommandSpec;
use crate::config::ServerConfig;
use crate::crcon::health::ServerHealth;
use crate::crcon::types::{GameState, Player, ServerSettings, Side, VipEntry};
use crate::crcon::{Diagnosis, ServerTarget};
use crate::db::AuditRow;
use crate::error::BotError;
use crate::maps;
use crate::permissions::{GrantOutcome, PermissionTier};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

pub fn server_label(servers: &[ServerConfig], target: ServerTarget) -> String {
    servers
        .iter()
        .find(|s| s.target == target)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| format!("服务器{}", target.get()))
}

pub fn usage_line(prefix: &str, spec: &CommandSpec) -> String {
    format!("{prefix}{} {}", spec.name, spec.usage)
        .trim_end()
        .to_string()
}

// ── Help ─────────────────────────────────────────────────────────────

pub fn help<'a>(prefix: &str, commands: impl Iterator<Item = &'a CommandSpec>) -> String {
    let mut out = format!("🤖 CRCON管理机器人\n{RULE}\n");
    for spec in commands {
        let _ = writeln!(out, "🔹 {}\n    {}", usage_line(prefix, spec), spec.summary);
    }
    let _ = write!(out, "💡 管理员可发送 {prefix}管理帮助 查看管理指令");
    out
}

pub fn admin_help<'a>(prefix: &str, commands: impl Iterator<Item = &'a CommandSpec>) -> String {
    let mut out = format!("🛠️ 管理指令\n{RULE}\n");
    let mut tier = None;
    for spec in commands {
        if tier != Some(spec.required_tier) {
            tier = Some(spec.required_tier);
            let _ = writeln!(out, "【{}】", spec.required_tier);
        }
        let _ = writeln!(out, "🔸 {}\n    {}", usage_line(prefix, spec), spec.summary);
    }
    let _ = write!(out, "💡 序号格式：1 或 1-5 或 1,3,5-7；服务器编号默认为1");
    out
}

// ── Server state ─────────────────────────────────────────────────────

fn map_label(id: Option<String>) -> String {
    id.map(|id| maps::localize(&id))
        .unwrap_or_else(|| "未知".to_string())
}

pub fn server_info(server: &str, state: &GameState) -> String {
    let mut out = format!("🎮 {server} 状态信息\n{RULE}\n");
    let _ = writeln!(out, "📊 当前比分：");
    let _ = writeln!(
        out,
        "  🔵 盟军：{} 分 ({} 人)",
        state.allied_score, state.allied_players
    );
    let _ = writeln!(
        out,
        "  🔴 轴心：{} 分 ({} 人)",
        state.axis_score, state.axis_players
    );
    let _ = writeln!(out, "👥 总人数：{} 人", state.player_count());
    let _ = writeln!(out, "⏰ 剩余时间：{}", state.remaining_display());
    let _ = writeln!(out, "🗺️ 当前地图：{}", map_label(state.current_map_id()));
    let _ = write!(out, "➡️ 下一张地图：{}", map_label(state.next_map_id()));
    out
}

pub fn server_list(entries: &[(ServerConfig, Result<GameState, BotError>)]) -> String {
    let mut out = format!("🖥️ 服务器列表 (共 {} 台)\n{RULE}", entries.len());
    for (server, result) in entries {
        let _ = write!(out, "\n{}. {}", server.target.get(), server.name);
        match result {
            Ok(state) => {
                let _ = write!(
                    out,
                    "\n    🟢 {} 人 | {} | 剩余 {}",
                    state.player_count(),
                    map_label(state.current_map_id()),
                    state.remaining_display()
                );
            }
            Err(e) => {
                let _ = write!(out, "\n    🔴 {}", short_error(e));
            }
        }
    }
    out
}

pub fn roster(server: &str, prefix: &str, players: &[Player]) -> String {
    if players.is_empty() {
        return format!("❌ {server} 当前没有在线玩家");
    }
    let mut out = format!("👥 {server} 在线玩家 (共 {} 人)\n{RULE}", players.len());
    let mut current: Option<Side> = None;
    for (i, player) in players.iter().enumerate() {
        let side = player.side();
        if current != Some(side) {
            current = Some(side);
            let count = players.iter().filter(|p| p.side() == side).count();
            let icon = match side {
                Side::Allies => "🔵",
                Side::Axis => "🔴",
                Side::Unassigned => "⚪",
            };
            let _ = write!(out, "\n{icon} {} ({count} 人):", side.display_name());
        }
        let _ = write!(out, "\n  {:>2}. {}", i + 1, player.name);
        if player.level > 0 {
            let _ = write!(out, " [Lv.{}]", player.level);
        }
    }
    let _ = write!(
        out,
        "\n💡 使用序号进行批量操作，如：{prefix}击杀 1-5"
    );
    out
}

pub fn batch_report(action: &str, server: &str, outcomes: &[BatchOutcome]) -> String {
    let ok = count_succeeded(outcomes);
    let mut out = format!(
        "⚔️ {action}执行结果（{server}）\n✅ 成功 {ok} / {} 人",
        outcomes.len()
    );
    if ok < outcomes.len() {
        let _ = write!(out, "，❌ 失败 {} 人", outcomes.len() - ok);
    }
    for outcome in outcomes {
        let name = outcome
            .player
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("-");
        match &outcome.result {
            Ok(()) => {
                let _ = write!(out, "\n  ✅ {}. {name}", outcome.index);
            }
            Err(e) => {
                let _ = write!(out, "\n  ❌ {}. {name}：{}", outcome.index, short_error(e));
            }
        }
    }
    out
}

/// Broadcasts only list the recipients that failed.
pub fn broadcast_report(server: &str, outcomes: &[BatchOutcome]) -> String {
    let ok = count_succeeded(outcomes);
    let mut out = format!("📢 {server} 全体私信：已送达 {ok} / {} 人", outcomes.len());
    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        let name = outcome
            .player
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("-");
        if let Err(e) = &outcome.result {
            let _ = write!(out, "\n  ❌ {name}：{}", short_error(e));
        }
    }
    out
}

pub fn map_rotation(server: &str, prefix: &str, rotation: &[String]) -> String {
    if rotation.is_empty() {
        return format!("❌ {server} 地图轮换为空");
    }
    let mut out = format!("🗺️ {server} 地图轮换 (共 {} 张)\n{RULE}", rotation.len());
    for (i, id) in rotation.iter().enumerate() {
        let _ = write!(out, "\n  {:>2}. {}", i + 1, maps::localize(id));
    }
    let _ = write!(out, "\n💡 使用 {prefix}换图 <编号> 切换地图");
    out
}

pub fn map_changed(server: &str, map_id: &str) -> String {
    format!("✅ {server} 已切换地图：{}\n🆔 {map_id}", maps::localize(map_id))
}

pub fn settings(server: &str, s: &ServerSettings) -> String {
    let mut out = format!("⚙️ {server} 服务器设置\n{RULE}\n");
    let _ = writeln!(out, "⏰ 闲置踢出时间：{} 分钟", s.idle_autokick_minutes);
    let _ = writeln!(
        out,
        "⚖️ 自动人数平衡：{}",
        if s.autobalance_enabled { "✅ 启用" } else { "❌ 禁用" }
    );
    let _ = writeln!(out, "📊 自动平衡阈值：{} 人", s.autobalance_threshold);
    let _ = write!(out, "🔄 调边冷却时间：{} 分钟", s.team_switch_cooldown_minutes);
    out
}

// ── VIP ──────────────────────────────────────────────────────────────

fn vip_details(out: &mut String, vip: &VipEntry) {
    let _ = writeln!(out, "👤 玩家名称：{}", vip.name);
    let _ = writeln!(out, "🆔 玩家ID：{}", vip.player_id);
    let _ = write!(
        out,
        "⏰ 到期时间：{}",
        vip.expiration.as_deref().filter(|e| !e.is_empty()).unwrap_or("永久")
    );
    if let Some(desc) = vip.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = write!(out, "\n📝 备注：{desc}");
    }
}

pub fn vip_lookup(query: &str, server: &str, found: Option<&VipEntry>) -> String {
    match found {
        Some(vip) => {
            let mut out = format!("✅ {server} VIP状态：有效\n{RULE}\n");
            vip_details(&mut out, vip);
            out
        }
        None => format!("❌ 在{server}未找到 {query} 的VIP信息"),
    }
}

pub fn vip_added(player_id: &str, duration: BanDuration, results: &[(String, Result<(), BotError>)]) -> String {
    let span = match duration {
        BanDuration::Hours(h) => format!("{h} 小时"),
        BanDuration::Permanent => "永久".to_string(),
    };
    let mut out = format!("💎 添加VIP：{player_id}（{span}）");
    for (server, result) in results {
        match result {
            Ok(()) => {
                let _ = write!(out, "\n  ✅ {server}");
            }
            Err(e) => {
                let _ = write!(out, "\n  ❌ {server}：{}", short_error(e));
            }
        }
    }
    out
}

/// Per-server result of removing a VIP.
#[derive(Debug)]
pub enum VipRemoval {
    Removed,
    NotVip,
    Failed(BotError),
}

pub fn vip_removed(player_id: &str, results: &[(String, VipRemoval)]) -> String {
    let mut out = format!("🗑️ 删除VIP：{player_id}");
    for (server, result) in results {
        let _ = match result {
            VipRemoval::Removed => write!(out, "\n  ✅ {server}：已删除"),
            VipRemoval::NotVip => write!(out, "\n  ⚪ {server}：不是VIP"),
            VipRemoval::Failed(e) => write!(out, "\n  ❌ {server}：{}", short_error(e)),
        };
    }
    out
}

// ── Permissions ──────────────────────────────────────────────────────

pub fn permission_list(entries: &[(String, PermissionTier)]) -> String {
    if entries.is_empty() {
        return "📋 当前没有任何管理员".to_string();
    }
    let mut out = format!("📋 管理员列表 (共 {} 人)\n{RULE}", entries.len());
    let mut tier = None;
    for (identity, t) in entries {
        if tier != Some(*t) {
            tier = Some(*t);
            let _ = write!(out, "\n【{t}】");
        }
        let _ = write!(out, "\n  • {identity}");
    }
    out
}

pub fn permission_info(identity: &str, tier: PermissionTier, recent: &[AuditRow]) -> String {
    let mut out = format!("🔑 {identity} 的权限：{tier}");
    let abilities = match tier {
        PermissionTier::None => "无管理权限",
        PermissionTier::Admin => "可使用玩家管理、地图与VIP指令",
        PermissionTier::SuperAdmin => "另可添加/删除普通管理员、测试API",
        PermissionTier::Owner => "拥有全部权限，可任命超级管理员",
    };
    let _ = write!(out, "\n📌 {abilities}");
    if !recent.is_empty() {
        let _ = write!(out, "\n🕒 最近变更：");
        for row in recent {
            let op = if row.operation == "grant" { "授予" } else { "撤销" };
            let tier_name = row
                .tier
                .parse::<PermissionTier>()
                .map(|t| t.display_name())
                .unwrap_or("未知");
            let _ = write!(
                out,
                "\n  {} {} {} {tier_name}（操作人 {}）",
                row.created_at, op, row.target, row.actor
            );
        }
    }
    out
}

pub fn granted(target: &str, tier: PermissionTier, outcome: GrantOutcome) -> String {
    match outcome {
        GrantOutcome::Unchanged => format!("ℹ️ {target} 已经是{tier}"),
        GrantOutcome::Granted {
            previous: PermissionTier::None,
        } => format!("✅ 已将 {target} 设为{tier}"),
        GrantOutcome::Granted { previous } => {
            format!("✅ 已将 {target} 从{previous}调整为{tier}")
        }
    }
}

pub fn revoked(target: &str, removed: Option<PermissionTier>) -> String {
    match removed {
        Some(tier) => format!("✅ 已撤销 {target} 的{tier}权限"),
        None => format!("ℹ️ {target} 没有任何管理权限"),
    }
}

// ── System ───────────────────────────────────────────────────────────

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, hours, minutes) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60);
    if days > 0 {
        format!("{days}天{hours}小时{minutes}分钟")
    } else if hours > 0 {
        format!("{hours}小时{minutes}分钟")
    } else {
        format!("{minutes}分钟{}秒", secs % 60)
    }
}

pub fn system_status(uptime: Duration, server_count: usize, health: &[ServerHealth]) -> String {
    let mut out = format!("🤖 机器人运行状态\n{RULE}\n");
    let _ = writeln!(out, "⏱️ 运行时间：{}", format_duration(uptime));
    let _ = write!(out, "🖥️ 已配置服务器：{server_count} 台");
    if health.is_empty() {
        let _ = write!(out, "\n⏳ 尚未完成健康检查");
        return out;
    }
    for h in health {
        let checked = h.checked_at.with_timezone(&chrono::Local).format("%H:%M:%S");
        if h.reachable {
            let _ = write!(
                out,
                "\n🟢 {}：{} 人 | {} ms | {}",
                h.name,
                h.player_count.unwrap_or(0),
                h.latency.as_millis(),
                map_label(h.current_map.clone())
            );
        } else {
            let _ = write!(
                out,
                "\n🔴 {}：{}",
                h.name,
                h.error.as_deref().unwrap_or("无法连接")
            );
        }
        let _ = write!(out, "（{checked}）");
    }
    out
}

pub fn api_test(results: &[(String, Diagnosis)]) -> String {
    let ok = results.iter().filter(|(_, d)| d.result.is_ok()).count();
    let mut out = format!("🔧 API连接测试：{ok}/{} 正常\n{RULE}", results.len());
    for (name, d) in results {
        match &d.result {
            Ok(state) => {
                let _ = write!(
                    out,
                    "\n✅ {name}：{} ms，{} 人在线",
                    d.latency.as_millis(),
                    state.player_count()
                );
            }
            Err(e) => {
                let _ = write!(out, "\n❌ {name}：{e}（{} ms）", d.latency.as_millis());
            }
        }
    }
    out
}

// ── Errors ───────────────────────────────────────────────────────────

/// One-line reason used inside batch and per-server listings.
pub fn short_error(err: &BotError) -> String {
    match err {
        BotError::IndexOutOfRange { max, .. } => format!("序号超出范围（当前共 {max} 人）"),
        BotError::ApiError { message, .. } => message.clone(),
        BotError::ApiUnreachable(_) => "无法连接".to_string(),
        e if e.is_internal() => "内部错误".to_string(),
        e => e.to_string(),
    }
}

/// The reply for a command that failed as a whole.
pub fn error_reply(err: &BotError, prefix: &str, servers: &[ServerConfig]) -> String {
    match err {
        BotError::InvalidSelector { token } => {
            format!("❌ 序号格式错误：{token}\n请使用如：1 或 1-5 或 1,3,5-7")
        }
        BotError::IndexOutOfRange { index, max } => {
            format!("❌ 序号 {index} 超出范围（当前共 {max} 人）")
        }
        BotError::UnknownCommand(name) => {
            format!("❓ 未知指令：{name}\n发送 {prefix}帮助 查看可用指令")
        }
        BotError::InsufficientPrivilege { required, actual } => {
            format!("⛔ 权限不足：需要{required}，你当前是{actual}")
        }
        BotError::InvalidArguments { usage, reason } => match reason {
            Some(reason) => format!("❌ 参数错误：{reason}\n用法：{usage}"),
            None => format!("❌ 参数错误\n用法：{usage}"),
        },
        BotError::ProtectedIdentity(identity) => {
            format!("🛡️ {identity} 是机器人主人，权限不可修改")
        }
        BotError::ApiError {
            server, message, ..
        } => format!("❌ {}操作失败：{message}", server_label(servers, *server)),
        BotError::ApiUnreachable(server) => {
            format!("📡 无法连接到{}，请稍后重试", server_label(servers, *server))
        }
        BotError::Storage(_) | BotError::Internal(_) => {
            "❌ 内部错误，请稍后重试或联系管理员".to_string()
        }
    }
}
